//! Transition-weight hardening.
//!
//! A weight `w` is a transition weight when the summed weight of all softs
//! strictly lighter than `w` is strictly less than `w`: falsifying a single
//! clause at or above `w` is then worse than falsifying everything below.
//! If the hard clauses together with all softs at or above `w` are
//! satisfiable, no optimal solution ever falsifies one of them, so they can
//! be made hard.
//!
//! Tiers are tried from the heaviest transition weight downwards; each gets
//! a bounded oracle call. An inconclusive answer stops the pass, which is
//! then merely less effective.

use std::mem;

use crate::{
    oracle::SatOracle,
    packed::PackedVecs,
    types::TernaryVal,
    wcnf::Wcnf,
};

/// Propagation budget per satisfiability probe
const HARDEN_PROP_BUDGET: u64 = 1024 * 1024;

impl Wcnf {
    /// Moves every soft clause at or above the lowest satisfiable transition
    /// weight into the hard clauses
    pub(crate) fn simple_harden<O, F>(&mut self, new_oracle: &mut F)
    where
        O: SatOracle,
        F: FnMut() -> O,
    {
        if self.unsat {
            return;
        }
        self.compute_wt_info();

        let mut sat = new_oracle();
        for cls in &self.hard_cls {
            sat.add_clause(cls);
        }
        if sat.theory_is_unsat() {
            self.unsat = true;
            return;
        }

        let mut max_harden_wt = self.wt_max + 1.0;
        let mut max_wt = self.wt_max + 1.0;
        for i in (0..self.transition_wts.len()).rev() {
            let tier = self.transition_wts[i];
            for c in 0..self.soft_cls.len() {
                if self.soft_clswts[c] >= tier && self.soft_clswts[c] < max_wt {
                    sat.add_clause(&self.soft_cls[c]);
                    if sat.theory_is_unsat() {
                        break;
                    }
                }
            }
            if sat.theory_is_unsat() {
                break;
            }
            max_wt = tier;
            if sat.solve_with_prop_budget(HARDEN_PROP_BUDGET) == TernaryVal::True {
                max_harden_wt = tier;
            } else {
                break;
            }
        }

        if max_harden_wt > self.wt_max {
            return;
        }

        let old_cls = mem::take(&mut self.soft_cls);
        let old_wts = mem::take(&mut self.soft_clswts);
        let mut tmp = PackedVecs::new();
        let mut tmp_wts = Vec::new();
        for (i, cls) in old_cls.iter().enumerate() {
            if old_wts[i] >= max_harden_wt {
                self.add_derived_hard(cls.to_vec());
            } else {
                tmp.add_vec(cls);
                tmp_wts.push(old_wts[i]);
            }
        }
        self.soft_cls = tmp;
        self.soft_clswts = tmp_wts;
        self.total_cls_wt = self.soft_clswts.iter().sum();
    }
}

#[cfg(test)]
mod tests {
    use crate::{options::SimpOptions, oracle::PropSolver, types::Lit, wcnf::Wcnf};

    fn lits(ls: &[i32]) -> Vec<Lit> {
        ls.iter().map(|&l| Lit::from_dimacs(l).unwrap()).collect()
    }

    #[test]
    fn heavy_soft_is_hardened() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1, 2, 3]));
        wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[3]), 10.0).unwrap();
        let mut mk = PropSolver::new;
        wcnf.simple_harden(&mut mk);
        // 1 + 1 < 10 and {hards, (x3)} is satisfiable
        assert_eq!(wcnf.n_hards(), 2);
        assert_eq!(wcnf.n_softs(), 2);
        assert_eq!(wcnf.total_cls_wt(), 2.0);
    }

    #[test]
    fn unsatisfiable_tier_is_not_hardened() {
        let mut wcnf = Wcnf::new();
        // the two heavy softs contradict each other
        wcnf.add_soft_clause(lits(&[1]), 10.0).unwrap();
        wcnf.add_soft_clause(lits(&[-1]), 10.0).unwrap();
        wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
        let mut mk = PropSolver::new;
        wcnf.simple_harden(&mut mk);
        assert_eq!(wcnf.n_hards(), 0);
        assert_eq!(wcnf.n_softs(), 3);
    }

    #[test]
    fn harden_runs_inside_simplify() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1, 2]));
        wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[2]), 5.0).unwrap();
        let mut opts = SimpOptions::none();
        opts.harden = true;
        wcnf.simplify(&opts);
        assert!(!wcnf.is_unsat());
        // (x2) got hardened, leaving a single soft
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.total_cls_wt(), 1.0);
    }
}
