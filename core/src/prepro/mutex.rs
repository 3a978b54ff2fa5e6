//! Mutex discovery among soft clause selector literals.
//!
//! Every soft clause has a selector literal (`blit`) whose truth relaxes the
//! clause: for a unit soft `(l)` the selector is `~l`, larger softs get a
//! fresh variable. A *core* mutex is an at-most-one over positive selectors
//! (at most one of the softs can be falsified), a *non-core* mutex one over
//! negated selectors (at most one can be satisfied). Only selectors of softs
//! with identical weight may share a mutex.
//!
//! Discovery asks a fresh oracle, loaded with the full bi-implication
//! encoding of the formula, for the implications of each selector: if `l`
//! implies `m` then `l` and `~m` exclude each other. Implication sets are
//! cached per selector code and pruned as selectors get absorbed; a byte
//! budget caps the cache and a wall clock budget the whole search. Mutexes
//! are grown greedily from the selector with the largest exclusion set.

use std::{collections::BTreeSet, mem, time::Instant};

use crate::{
    options::SimpOptions,
    oracle::SatOracle,
    packed::PackedVecs,
    types::{FxHashMap, Lit, Weight},
    wcnf::{ScMx, Wcnf},
};

/// Marks a selector (and its negation) as absorbed into a committed mutex
const IN_MX: u8 = 1;
/// Marks a selector parked for the size-two phase
const IN_TWOS: u8 = 2;

/// The selector variables of the soft clauses
pub(crate) struct Bvars {
    /// Selector literal per soft clause; true iff the soft is relaxed
    blits: Vec<Lit>,
    /// Soft clause index per selector variable
    cls_of: Vec<Option<usize>>,
}

impl Bvars {
    /// Sets up selectors for every current soft clause, allocating fresh
    /// variables for the non-unit ones
    pub(crate) fn new(wcnf: &mut Wcnf) -> Self {
        let n = wcnf.n_softs();
        let unit_lits: Vec<Option<Lit>> = (0..n)
            .map(|i| {
                let cls = wcnf.soft(i);
                (cls.len() == 1).then(|| cls[0])
            })
            .collect();
        let mut blits = Vec::with_capacity(n);
        for unit in &unit_lits {
            match unit {
                Some(l) => blits.push(!*l),
                None => blits.push(wcnf.fresh_var().pos_lit()),
            }
        }
        let mut cls_of = vec![None; wcnf.n_vars()];
        for (i, b) in blits.iter().enumerate() {
            cls_of[b.vidx()] = Some(i);
        }
        Bvars { blits, cls_of }
    }

    fn lit_of_cls(&self, i: usize) -> Lit {
        self.blits[i]
    }

    /// The soft clause a selector literal belongs to
    fn cls_index(&self, l: Lit) -> usize {
        self.cls_of[l.vidx()].expect("literal is not a selector")
    }

    fn is_selector(&self, l: Lit) -> bool {
        self.cls_of
            .get(l.vidx())
            .is_some_and(Option::is_some)
    }

    /// True iff `l` is a selector in relaxing polarity
    fn is_core(&self, l: Lit) -> bool {
        self.is_selector(l) && self.blits[self.cls_index(l)] == l
    }

    /// True iff `~l` is a selector in relaxing polarity
    fn is_non_core(&self, l: Lit) -> bool {
        self.is_selector(l) && self.blits[self.cls_index(l)] == !l
    }
}

struct MxFinder<'a, O> {
    wcnf: &'a Wcnf,
    bvars: &'a Bvars,
    sat: O,
    /// By literal code; [`IN_MX`] / [`IN_TWOS`]
    blit_marks: Vec<u8>,
    /// Cached exclusion sets by literal code
    blit_mxes: Vec<Option<Vec<Lit>>>,
    total_mx_mem: u64,
    mem_budget: u64,
}

impl<'a, O: SatOracle> MxFinder<'a, O> {
    fn new(wcnf: &'a Wcnf, bvars: &'a Bvars, sat: O, opts: &SimpOptions) -> Self {
        MxFinder {
            wcnf,
            bvars,
            sat,
            blit_marks: vec![0; 2 * wcnf.n_vars()],
            blit_mxes: vec![None; 2 * wcnf.n_vars()],
            total_mx_mem: 0,
            mem_budget: opts.mx_mem_lim * 1024 * 1024,
        }
    }

    /// Loads the full bi-implication encoding: the hards, `c | b` for every
    /// non-unit soft `c`, and `~l | ~b` for each of its literals, so that `b`
    /// is true exactly when `c` is falsified. Returns false if the encoding
    /// is contradictory.
    fn fbeq(&mut self) -> bool {
        for cls in self.wcnf.hards() {
            self.sat.add_clause(cls);
        }
        if self.sat.theory_is_unsat() {
            return false;
        }
        for i in 0..self.wcnf.n_softs() {
            if self.wcnf.soft(i).len() <= 1 {
                continue;
            }
            let blit = self.bvars.lit_of_cls(i);
            let mut relaxed = self.wcnf.soft(i).to_vec();
            relaxed.push(blit);
            self.sat.add_clause(&relaxed);
            if self.sat.theory_is_unsat() {
                return false;
            }
            for &l in self.wcnf.soft(i) {
                self.sat.add_clause(&[!l, !blit]);
                if self.sat.theory_is_unsat() {
                    return false;
                }
            }
        }
        true
    }

    /// The unabsorbed selectors of opposite core status and identical weight
    /// that exclude `l`: if `l` implies `m`, then `l` and `~m` cannot hold
    /// together. Computed through the oracle once per literal and cached;
    /// cached sets are pruned of absorbed selectors on every read. Once the
    /// memory budget is hit, fresh lookups come back empty.
    fn mx_lits(&mut self, l: Lit) -> Vec<Lit> {
        let code = l.lidx();
        if self.blit_mxes[code].is_none() {
            let mut imps = Vec::new();
            if self.total_mx_mem >= self.mem_budget {
                self.blit_mxes[code] = Some(imps);
                return Vec::new();
            }
            let wt = self.wcnf.wt(self.bvars.cls_index(l));
            self.sat.find_implications(l, &mut imps);
            let want_core = self.bvars.is_non_core(l);
            imps.retain(|&m| {
                self.blit_marks[m.lidx()] != IN_MX
                    && if want_core {
                        self.bvars.is_core(m)
                    } else {
                        self.bvars.is_non_core(m)
                    }
                    && self.wcnf.wt(self.bvars.cls_index(m)) == wt
            });
            // implications to exclusions
            for m in &mut imps {
                *m = !*m;
            }
            self.total_mx_mem += (mem::size_of::<Lit>() * imps.len()) as u64;
            self.blit_mxes[code] = Some(imps);
        } else {
            let marks = &self.blit_marks;
            let cached = self.blit_mxes[code].as_mut().unwrap();
            cached.retain(|&m| marks[m.lidx()] != IN_MX);
        }
        self.blit_mxes[code].as_ref().unwrap().clone()
    }

    fn mx_lit_size(&mut self, l: Lit) -> usize {
        self.mx_lits(l).len()
    }

    /// Grows an at-most-one set starting from `start`. The invariant is that
    /// everything in `mx` is pairwise exclusive and every candidate excludes
    /// all of `mx`, so any candidate may be added next. Candidates are tried
    /// in descending order of how much of the candidate set they would keep
    /// alive; the order is computed once, not re-ranked per acceptance.
    fn grow_mx(&mut self, start: Lit) -> Vec<Lit> {
        let orig_cands = self.mx_lits(start);
        let mut cands: BTreeSet<Lit> = orig_cands.iter().copied().collect();
        let mut inter_size: FxHashMap<Lit, usize> = FxHashMap::default();
        for &l in &orig_cands {
            let count = self
                .mx_lits(l)
                .iter()
                .filter(|m| cands.contains(m))
                .count();
            inter_size.insert(l, count);
        }
        let mut ordered = orig_cands;
        ordered.sort_by(|a, b| inter_size[b].cmp(&inter_size[a]));

        let mut mx = vec![start];
        for l in ordered {
            if !cands.remove(&l) {
                continue;
            }
            mx.push(l);
            let l_mx: BTreeSet<Lit> = self.mx_lits(l).into_iter().collect();
            cands.retain(|c| l_mx.contains(c));
        }
        mx
    }

    /// Finds disjoint mutexes among the selectors of the requested polarity.
    /// Returns `None` if the formula was found unsatisfiable while loading
    /// the encoding.
    ///
    /// Two stages: selectors whose exclusion set currently has a single
    /// member are parked and only turned into size-two mutexes after all
    /// bigger ones have been grown, since absorbing a selector blocks it and
    /// its negation from every other mutex.
    fn find_mxs(&mut self, core: bool, opts: &SimpOptions) -> Option<Vec<Vec<Lit>>> {
        let start_time = Instant::now();
        if !self.fbeq() {
            return None;
        }

        let mut mxs: Vec<Vec<Lit>> = Vec::new();
        let mut to_process: Vec<Lit> = (0..self.wcnf.n_softs())
            .map(|i| {
                let b = self.bvars.lit_of_cls(i);
                if core {
                    b
                } else {
                    !b
                }
            })
            .collect();
        let mut twos: Vec<Lit> = Vec::new();
        let mut timed_out = false;
        let mut loops = 0u64;

        while let Some(&blit) = to_process.last() {
            loops += 1;
            if self.total_mx_mem >= self.mem_budget
                || opts
                    .mx_cpu_lim
                    .is_some_and(|lim| loops % 500 == 0 && start_time.elapsed().as_secs_f64() > lim)
            {
                timed_out = true;
                break;
            }
            if self.blit_marks[blit.lidx()] != 0 {
                to_process.pop();
                continue;
            }
            let mx = self.mx_lits(blit);
            if mx.len() <= 1 {
                if mx.len() == 1 {
                    self.blit_marks[blit.lidx()] = IN_TWOS;
                    twos.push(blit);
                }
                to_process.pop();
                continue;
            }

            // grow from the member with the largest exclusion set
            let mut start = blit;
            let mut size = mx.len();
            for &l in &mx {
                let sz = self.mx_lit_size(l);
                if sz > size {
                    size = sz;
                    start = l;
                }
            }
            let grown = self.grow_mx(start);

            // the grown set can be small and need not contain blit
            if grown.len() <= 2 {
                self.blit_marks[blit.lidx()] = IN_TWOS;
                if grown.len() == 2 {
                    twos.push(start);
                }
            } else {
                for &b in &grown {
                    self.blit_marks[b.lidx()] = IN_MX;
                    self.blit_marks[(!b).lidx()] = IN_MX;
                }
                mxs.push(grown);
            }
        }

        if !timed_out {
            while let Some(blit) = twos.pop() {
                if self.blit_marks[blit.lidx()] == IN_MX {
                    continue;
                }
                let grown = self.grow_mx(blit);
                if grown.len() > 1 {
                    for &b in &grown {
                        self.blit_marks[b.lidx()] = IN_MX;
                        self.blit_marks[(!b).lidx()] = IN_MX;
                    }
                    mxs.push(grown);
                }
            }
        }
        Some(mxs)
    }
}

impl Wcnf {
    /// Finds mutexes of the requested core status and rewrites the formula
    /// accordingly
    pub(crate) fn discover_mutexes<O, F>(
        &mut self,
        core: bool,
        opts: &SimpOptions,
        new_oracle: &mut F,
    ) where
        O: SatOracle,
        F: FnMut() -> O,
    {
        if self.unsat || self.n_softs() == 0 {
            return;
        }
        let bvars = Bvars::new(self);
        let found = {
            let mut finder = MxFinder::new(self, &bvars, new_oracle(), opts);
            finder.find_mxs(core, opts)
        };
        let Some(mxs) = found else {
            self.unsat = true;
            return;
        };
        self.process_mxs(mxs, &bvars, opts);
    }

    /// Rewrites the formula for each committed mutex and records it.
    ///
    /// Core mutex: every non-unit soft `c` in it is replaced by the hard
    /// `(c | b)` with its selector `b` and the unit soft `(~b)` of the same
    /// weight; unit softs already are their own selector. Non-core mutex: at
    /// most one of the softs is satisfied, so all but one weight is incurred
    /// up front; the softs are replaced by one hard clause over their union
    /// plus a fresh defining literal `d` and the single soft `(~d)`.
    fn process_mxs(&mut self, mxs: Vec<Vec<Lit>>, bvars: &Bvars, opts: &SimpOptions) {
        if self.unsat {
            return;
        }
        let mut del_marks = vec![false; self.n_softs()];
        let mut blits: Vec<Lit> = Vec::new();
        for mx in mxs {
            if mx.is_empty() {
                continue;
            }
            let unit_wt = self.wt(bvars.cls_index(mx[0]));
            let core = bvars.is_core(mx[0]);
            blits.clear();
            if core {
                for &l in &mx {
                    let ci = bvars.cls_index(l);
                    let sftcls = self.soft(ci).to_vec();
                    if sftcls.len() == 1 {
                        blits.push(!sftcls[0]);
                    } else {
                        let blit = self.fresh_var().pos_lit();
                        blits.push(blit);
                        let mut relaxed = sftcls;
                        relaxed.push(blit);
                        del_marks[ci] = true;
                        self.add_derived_hard(relaxed);
                        self.add_derived_soft(vec![!blit], unit_wt);
                    }
                }
                self.mutexes.push(ScMx::new(blits.clone(), true, None));
            } else {
                for &l in &mx {
                    let ci = bvars.cls_index(l);
                    blits.extend_from_slice(self.soft(ci));
                    del_marks[ci] = true;
                }
                let dlit = self.fresh_var().pos_lit();
                let mut union_cls = blits.clone();
                union_cls.push(dlit);
                self.add_derived_hard(union_cls);
                self.base_cost += unit_wt * (mx.len() - 1) as Weight;
                self.add_derived_soft(vec![!dlit], unit_wt);
                let recorded = if opts.mx_seed_originals {
                    blits.clone()
                } else {
                    Vec::new()
                };
                self.mutexes.push(ScMx::new(recorded, false, Some(dlit)));
            }
        }

        // drop the replaced softs; marks do not extend to newly added ones
        let old_cls = mem::take(&mut self.soft_cls);
        let old_wts = mem::take(&mut self.soft_clswts);
        let mut tmp = PackedVecs::new();
        let mut tmp_wts = Vec::new();
        for (i, cls) in old_cls.iter().enumerate() {
            if i >= del_marks.len() || !del_marks[i] {
                tmp.add_vec(cls);
                tmp_wts.push(old_wts[i]);
            }
        }
        self.soft_cls = tmp;
        self.soft_clswts = tmp_wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();
        self.compute_wt_info();
    }
}

#[cfg(test)]
mod tests {
    use super::Bvars;
    use crate::{types::Lit, wcnf::Wcnf};

    fn lits(ls: &[i32]) -> Vec<Lit> {
        ls.iter().map(|&l| Lit::from_dimacs(l).unwrap()).collect()
    }

    #[test]
    fn unit_softs_reuse_their_literal() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[-2]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[1, 2]), 1.0).unwrap();
        let before = wcnf.n_vars();
        let bvars = Bvars::new(&mut wcnf);
        // unit softs reuse their complement, the binary soft gets a fresh var
        assert_eq!(bvars.lit_of_cls(0), Lit::negative(0));
        assert_eq!(bvars.lit_of_cls(1), Lit::positive(1));
        assert_eq!(bvars.lit_of_cls(2).vidx(), before);
        assert_eq!(wcnf.n_vars(), before + 1);
    }

    #[test]
    fn selector_classification() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
        let bvars = Bvars::new(&mut wcnf);
        let blit = bvars.lit_of_cls(0);
        assert!(bvars.is_core(blit));
        assert!(bvars.is_non_core(!blit));
        assert!(!bvars.is_core(!blit));
        assert_eq!(bvars.cls_index(blit), 0);
        assert_eq!(bvars.cls_index(!blit), 0);
    }
}
