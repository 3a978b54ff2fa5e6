//! # Simplification Passes
//!
//! The semantics-preserving reductions run by
//! [`Wcnf::simplify`](crate::Wcnf::simplify): unit and equality collapsing
//! (this module), duplicate removal, transition-weight hardening and mutex
//! discovery among soft clause selectors (the submodules).
//!
//! Every pass refines the formula: the optimal cost of the store plus its
//! base cost is invariant, and enough bookkeeping is kept in the input
//! variable space to lift models back.

mod dedup;
mod harden;
mod mutex;
mod scc;

use crate::{
    oracle::SatOracle,
    packed::PackedVecs,
    types::{Lit, TernaryVal},
    wcnf::Wcnf,
};

impl Wcnf {
    /// Collapses hard units and binary-implication equivalences.
    ///
    /// The hard clauses are loaded into a fresh oracle and unit propagated;
    /// the forced literals become `hard_units`. With `find_eqs`, clauses with
    /// exactly two unfixed literals form the binary implication graph whose
    /// non-trivial strongly connected components are literal equivalence
    /// classes; every member is replaced by its class representative. The
    /// reduced formula is scanned once for newly exposed units and pure
    /// literals, which are fed back for a second (and final) reduction.
    pub(crate) fn sub_eqs_and_units<O, F>(&mut self, find_eqs: bool, new_oracle: &mut F)
    where
        O: SatOracle,
        F: FnMut() -> O,
    {
        if self.unsat {
            return;
        }
        let mut sat = new_oracle();
        for cls in &self.hard_cls {
            sat.add_clause(cls);
        }
        if sat.theory_is_unsat() {
            self.unsat = true;
            return;
        }
        sat.unit_propagate();
        if sat.theory_is_unsat() {
            self.unsat = true;
            return;
        }
        self.hard_units = sat.forced_lits();

        if find_eqs {
            let binaries = self.get_binaries(&sat);
            let mut edges: Vec<Vec<Lit>> = Vec::new();
            for pair in binaries.chunks_exact(2) {
                let (x, y) = (pair[0], pair[1]);
                let max_index = (x.lidx() | 1).max(y.lidx() | 1);
                if max_index >= edges.len() {
                    edges.resize(max_index + 1, Vec::new());
                }
                edges[x.lidx()].push(y);
                edges[y.lidx()].push(x);
            }
            self.all_scc = scc::binary_sccs(&edges);
        } else {
            self.all_scc.clear();
        }

        if !self.all_scc.is_empty() || !self.hard_units.is_empty() {
            self.reduce_by_eqs_and_units(false);
            self.reduce_by_eqs_and_units(true);
            if self.unsat {
                return;
            }
        }

        // scan the reduced formula for new units and pure literals
        let n_before = self.hard_units.len();
        let mut appears = vec![0u8; self.n_vars()];
        for cls in &self.hard_cls {
            if cls.len() == 1 {
                self.hard_units.push(cls[0]);
            }
            for l in cls {
                appears[l.vidx()] |= if l.is_neg() { 0b01 } else { 0b10 };
            }
        }
        for cls in &self.soft_cls {
            for l in cls {
                appears[l.vidx()] |= if l.is_neg() { 0b01 } else { 0b10 };
            }
        }
        for (v, &occ) in appears.iter().enumerate() {
            match occ {
                0b01 => self.hard_units.push(Lit::negative(v as u32)),
                0b10 => self.hard_units.push(Lit::positive(v as u32)),
                _ => (),
            }
        }

        if self.hard_units.len() > n_before {
            for &l in &self.hard_units {
                sat.add_clause(&[l]);
            }
            if sat.theory_is_unsat() {
                self.unsat = true;
                return;
            }
            sat.unit_propagate();
            if sat.theory_is_unsat() {
                self.unsat = true;
                return;
            }
            self.hard_units = sat.forced_lits();
            self.reduce_by_eqs_and_units(false);
            self.reduce_by_eqs_and_units(true);
        }
    }

    /// Collects, per hard clause with exactly two unfixed literals, those two
    /// literals. Clauses satisfied at the oracle's root level are skipped.
    fn get_binaries<O: SatOracle>(&self, sat: &O) -> Vec<Lit> {
        let mut binaries = Vec::new();
        for clause in &self.hard_cls {
            let mut nlits = 0;
            for &l in clause {
                match sat.fixed_value(l) {
                    TernaryVal::Undef => nlits += 1,
                    // satisfied clauses are treated as too big
                    TernaryVal::True => nlits = 3,
                    TernaryVal::False => (),
                }
                if nlits > 2 {
                    break;
                }
            }
            if nlits == 2 {
                for &l in clause {
                    if sat.fixed_value(l) == TernaryVal::Undef {
                        binaries.push(l);
                    }
                }
            }
        }
        binaries
    }

    /// Rewrites one clause population by the current `hard_units` and
    /// `all_scc` tables: every literal is replaced by its equivalence class
    /// representative, satisfied clauses and falsified literals are dropped.
    /// An emptied hard clause makes the store unsat; an emptied soft clause
    /// moves its weight to the base cost.
    fn reduce_by_eqs_and_units(&mut self, softs: bool) {
        if self.unsat {
            return;
        }
        let nv = self.n_vars();
        let mut truth = vec![TernaryVal::Undef; 2 * nv];
        let mut eq_lit: Vec<Lit> = (0..nv as u32)
            .flat_map(|v| [Lit::positive(v), Lit::negative(v)])
            .collect();
        for &l in &self.hard_units {
            truth[l.lidx()] = TernaryVal::True;
            truth[(!l).lidx()] = TernaryVal::False;
        }
        for scc in &self.all_scc {
            for &m in scc {
                eq_lit[m.lidx()] = scc[0];
                eq_lit[(!m).lidx()] = !scc[0];
            }
        }

        let old = if softs {
            std::mem::take(&mut self.soft_cls)
        } else {
            std::mem::take(&mut self.hard_cls)
        };
        let mut tmp = PackedVecs::new();
        let mut j = 0;
        let mut c = Vec::new();
        for (i, cls) in old.iter().enumerate() {
            c.clear();
            let mut is_sat = false;
            for &l in cls {
                let eql = eq_lit[l.lidx()];
                match truth[eql.lidx()] {
                    TernaryVal::Undef => c.push(eql),
                    TernaryVal::True => {
                        is_sat = true;
                        break;
                    }
                    TernaryVal::False => (),
                }
            }
            if is_sat {
                continue;
            }
            if c.is_empty() {
                if !softs {
                    self.unsat = true;
                    return;
                }
                self.base_cost += self.soft_clswts[i];
            } else {
                // equality replacement can produce duplicates or tautologies
                if Wcnf::prepare_clause(&mut c) {
                    tmp.add_vec(&c);
                    if softs {
                        self.soft_clswts[j] = self.soft_clswts[i];
                        j += 1;
                    }
                }
            }
        }

        if softs {
            self.soft_clswts.truncate(j);
            self.soft_cls = tmp;
            self.total_cls_wt = self.soft_clswts.iter().sum();
        } else {
            self.hard_cls = tmp;
        }
    }
}
