//! Duplicate clause removal across the two clause populations.
//!
//! Every clause gets a hash; units are hashed by variable so that `x` and
//! `~x` land in the same run and contradictory units can be resolved. Within
//! a run of equal hashes:
//!
//! - two identical hards collapse,
//! - a hard subsumes an identical soft at no cost (the hard forces the soft
//!   true),
//! - identical softs merge by adding their weights,
//! - a hard unit against the complementary soft unit falsifies the soft and
//!   moves its weight to the base cost,
//! - two complementary soft units resolve into a single soft on the
//!   higher-weight literal with the weight difference; the smaller weight is
//!   always incurred and goes to the base cost.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::{packed::PackedVecs, types::Lit, wcnf::Wcnf};

/// Per-clause record of the pass. `w < 0` marks a hard clause, `w == 0` a
/// deleted one, `w > 0` the current weight of a soft. `orig_hard` remembers
/// the arena `index` refers into, which a conversion does not change.
struct ClsData {
    index: u32,
    hash: u64,
    w: f64,
    orig_hard: bool,
}

/// Units are hashed by variable, everything else by the full literal sequence
fn clause_hash(lits: &[Lit]) -> u64 {
    let mut hasher = FxHasher::default();
    if lits.len() == 1 {
        lits[0].vidx().hash(&mut hasher);
    } else {
        for l in lits {
            l.lidx().hash(&mut hasher);
        }
    }
    hasher.finish()
}

impl Wcnf {
    fn clause_at(&self, orig_hard: bool, index: u32) -> &[Lit] {
        if orig_hard {
            &self.hard_cls[index as usize]
        } else {
            &self.soft_cls[index as usize]
        }
    }

    fn eq_clauses(&self, a: &ClsData, b: &ClsData) -> bool {
        // relies on clause preparation having sorted all stored clauses
        self.clause_at(a.orig_hard, a.index) == self.clause_at(b.orig_hard, b.index)
    }

    /// Removes duplicate clauses and resolves contradictory units; see the
    /// module docs for the merge rules
    pub(crate) fn rem_dup_cls(&mut self) {
        if self.no_dups || self.unsat {
            return;
        }
        self.no_dups = true;

        let mut cdata: Vec<ClsData> = Vec::with_capacity(self.n_hards() + self.n_softs());
        for (i, cls) in self.hard_cls.iter().enumerate() {
            cdata.push(ClsData {
                index: i as u32,
                hash: clause_hash(cls),
                w: -1.0,
                orig_hard: true,
            });
        }
        for (i, cls) in self.soft_cls.iter().enumerate() {
            cdata.push(ClsData {
                index: i as u32,
                hash: clause_hash(cls),
                w: self.soft_clswts[i],
                orig_hard: false,
            });
        }
        // hards before softs within a run keeps the pass deterministic
        cdata.sort_unstable_by(|a, b| {
            a.hash
                .cmp(&b.hash)
                .then(b.orig_hard.cmp(&a.orig_hard))
                .then(a.index.cmp(&b.index))
        });

        for i in 0..cdata.len() {
            if cdata[i].w == 0.0 {
                continue;
            }
            for j in i + 1..cdata.len() {
                if cdata[j].hash != cdata[i].hash {
                    break;
                }
                if cdata[j].w == 0.0 {
                    continue;
                }
                let ihard = cdata[i].w < 0.0;
                let jhard = cdata[j].w < 0.0;
                let ilen = self.clause_at(cdata[i].orig_hard, cdata[i].index).len();
                let jlen = self.clause_at(cdata[j].orig_hard, cdata[j].index).len();
                if ilen == 1 && jlen == 1 {
                    let li = self.clause_at(cdata[i].orig_hard, cdata[i].index)[0];
                    let lj = self.clause_at(cdata[j].orig_hard, cdata[j].index)[0];
                    if li == !lj {
                        // contradictory units
                        if ihard && jhard {
                            self.unsat = true;
                            return;
                        }
                        if ihard || jhard {
                            // the soft side is falsified by the hard unit
                            let cost = if jhard { cdata[i].w } else { cdata[j].w };
                            if jhard {
                                let (idx, oh) = (cdata[i].index, cdata[i].orig_hard);
                                let cls = if oh {
                                    self.hard_cls.get_mut(idx as usize)
                                } else {
                                    self.soft_cls.get_mut(idx as usize)
                                };
                                cls[0] = lj;
                            }
                            self.base_cost += cost;
                            cdata[j].w = 0.0;
                            cdata[i].w = -1.0;
                        } else {
                            // resolution of two soft units; the higher-weight
                            // literal survives with the residue
                            let (cost, residue) = if cdata[i].w < cdata[j].w {
                                let (idx, oh) = (cdata[i].index, cdata[i].orig_hard);
                                let cls = if oh {
                                    self.hard_cls.get_mut(idx as usize)
                                } else {
                                    self.soft_cls.get_mut(idx as usize)
                                };
                                cls[0] = lj;
                                (cdata[i].w, cdata[j].w - cdata[i].w)
                            } else {
                                (cdata[j].w, cdata[i].w - cdata[j].w)
                            };
                            self.base_cost += cost;
                            cdata[i].w = residue;
                            cdata[j].w = 0.0;
                        }
                        continue;
                    }
                }
                if self.eq_clauses(&cdata[i], &cdata[j]) {
                    if ihard || jhard {
                        // a hard copy supersedes both hard and soft duplicates
                        cdata[i].w = -1.0;
                        cdata[j].w = 0.0;
                    } else {
                        cdata[i].w += cdata[j].w;
                        cdata[j].w = 0.0;
                    }
                }
            }
        }

        // rebuild both arenas in original clause order
        cdata.sort_unstable_by_key(|cd| (cd.index, cd.orig_hard));
        let mut tmp_h = PackedVecs::new();
        let mut tmp_s = PackedVecs::new();
        let mut tmp_wts = Vec::new();
        for cd in &cdata {
            if cd.w == 0.0 {
                continue;
            }
            let cls = self.clause_at(cd.orig_hard, cd.index).to_vec();
            if cd.w < 0.0 {
                tmp_h.add_vec(&cls);
            } else {
                tmp_s.add_vec(&cls);
                tmp_wts.push(cd.w);
            }
        }
        self.hard_cls = tmp_h;
        self.soft_cls = tmp_s;
        self.soft_clswts = tmp_wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();
    }
}

#[cfg(test)]
mod tests {
    use crate::{types::Lit, wcnf::Wcnf};

    fn lits(ls: &[i32]) -> Vec<Lit> {
        ls.iter().map(|&l| Lit::from_dimacs(l).unwrap()).collect()
    }

    #[test]
    fn duplicate_hards_collapse() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1, 2]));
        wcnf.add_hard_clause(lits(&[2, 1]));
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_hards(), 1);
    }

    #[test]
    fn duplicate_softs_merge_weights() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1, 2]), 2.0).unwrap();
        wcnf.add_soft_clause(lits(&[2, 1]), 3.0).unwrap();
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.wt(0), 5.0);
        assert_eq!(wcnf.total_cls_wt(), 5.0);
    }

    #[test]
    fn hard_subsumes_identical_soft_without_cost() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1, 2]));
        wcnf.add_soft_clause(lits(&[1, 2]), 4.0).unwrap();
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.base_cost(), 0.0);
    }

    #[test]
    fn contradictory_hard_units_are_unsat() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1]));
        wcnf.add_hard_clause(lits(&[-1]));
        wcnf.rem_dup_cls();
        assert!(wcnf.is_unsat());
    }

    #[test]
    fn hard_unit_falsifies_complementary_soft() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1]));
        wcnf.add_soft_clause(lits(&[-1]), 6.0).unwrap();
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.base_cost(), 6.0);
        assert_eq!(wcnf.hard(0), &lits(&[1])[..]);
    }

    #[test]
    fn soft_units_resolve_to_residue() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1]), 3.0).unwrap();
        wcnf.add_soft_clause(lits(&[-1]), 7.0).unwrap();
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.soft(0), &lits(&[-1])[..]);
        assert_eq!(wcnf.wt(0), 4.0);
        assert_eq!(wcnf.base_cost(), 3.0);
    }

    #[test]
    fn equal_weight_soft_units_vanish() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1]), 5.0).unwrap();
        wcnf.add_soft_clause(lits(&[-1]), 5.0).unwrap();
        wcnf.rem_dup_cls();
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.base_cost(), 5.0);
        assert_eq!(wcnf.total_cls_wt(), 0.0);
    }
}
