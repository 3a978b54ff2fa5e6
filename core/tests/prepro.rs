use thresher_core::{
    Assignment, Lit, MxMode, PropSolver, SatOracle, SimpOptions, TernaryVal, Wcnf,
};

fn lits(ls: &[i32]) -> Vec<Lit> {
    ls.iter().map(|&l| Lit::from_dimacs(l).unwrap()).collect()
}

#[test]
fn hard_contradiction_is_unsat() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[1]));
    wcnf.add_hard_clause(lits(&[-1]));
    wcnf.simplify(&SimpOptions::default());
    assert!(wcnf.is_unsat());
}

#[test]
fn soft_contradiction_equal_weights() {
    let mut wcnf = Wcnf::new();
    wcnf.add_soft_clause(lits(&[1]), 5.0).unwrap();
    wcnf.add_soft_clause(lits(&[-1]), 5.0).unwrap();
    wcnf.simplify(&SimpOptions::default());
    assert!(!wcnf.is_unsat());
    assert_eq!(wcnf.n_softs(), 0);
    assert_eq!(wcnf.base_cost(), 5.0);
    assert_eq!(wcnf.total_cls_wt(), 0.0);
}

#[test]
fn soft_contradiction_unequal_weights() {
    let mut wcnf = Wcnf::new();
    wcnf.add_soft_clause(lits(&[1]), 3.0).unwrap();
    wcnf.add_soft_clause(lits(&[-1]), 7.0).unwrap();
    // hardening would already upgrade the heavy unit, deduplication alone
    // must resolve the pair
    wcnf.simplify(&SimpOptions::none());
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.wt(0), 4.0);
    assert_eq!(wcnf.base_cost(), 3.0);
    // the surviving unit soft is negative, so no flip was needed
    assert_eq!(wcnf.soft(0), &[Lit::negative(0)][..]);
}

#[test]
fn scc_collapse_eliminates_the_component() {
    // x1 <=> x2 through binaries, x1 forced pure through the rest
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[-1, 2]));
    wcnf.add_hard_clause(lits(&[-2, 1]));
    wcnf.add_hard_clause(lits(&[1, 3]));
    wcnf.add_hard_clause(lits(&[-3, 1]));
    wcnf.simplify(&SimpOptions::default());
    assert!(!wcnf.is_unsat());
    assert_eq!(wcnf.n_hards(), 0);
    // the lifted model assigns the equivalence class consistently and
    // satisfies every original clause
    let ex = wcnf.rewrite_model_to_input(&Assignment::default());
    assert_eq!(ex.var_value(Lit::positive(0).var()), ex.var_value(Lit::positive(1).var()));
    for cls in [lits(&[-1, 2]), lits(&[-2, 1]), lits(&[1, 3]), lits(&[-3, 1])] {
        assert!(cls.iter().any(|&l| ex.satisfies(l)));
    }
}

#[test]
fn transition_weight_hardening() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[1, 2, 3]));
    wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[3]), 10.0).unwrap();
    let mut opts = SimpOptions::none();
    opts.harden = true;
    wcnf.simplify(&opts);
    // 1 + 1 < 10, so (x3) must never be falsified
    assert_eq!(wcnf.n_hards(), 2);
    assert_eq!(wcnf.n_softs(), 2);
    assert_eq!(wcnf.total_cls_wt(), 2.0);
    assert_eq!(wcnf.base_cost(), 0.0);
}

#[test]
fn core_mutex_is_discovered() {
    // at most one of x1, x2, x3 is false
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[1, 2]));
    wcnf.add_hard_clause(lits(&[1, 3]));
    wcnf.add_hard_clause(lits(&[2, 3]));
    wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[3]), 1.0).unwrap();
    // unit propagation would trivialize this instance through pure literals;
    // run the mutex finder on its own
    let mut opts = SimpOptions::none();
    opts.find_mxes = MxMode::Core;
    wcnf.simplify(&opts);
    assert_eq!(wcnf.n_mxes(), 1);
    let mx = &wcnf.mutexes()[0];
    assert!(mx.is_core());
    assert_eq!(mx.soft_clause_lits().len(), 3);
    assert_eq!(mx.encoding_lit(), None);
    // unit softs stay as they are, only the mutex is recorded
    assert_eq!(wcnf.n_softs(), 3);
    assert_eq!(wcnf.base_cost(), 0.0);
    // all selectors belong to distinct variables
    let mut vars: Vec<usize> = mx.soft_clause_lits().iter().map(|l| l.vidx()).collect();
    vars.sort_unstable();
    vars.dedup();
    assert_eq!(vars.len(), 3);
}

#[test]
fn non_core_mutex_rewrites_the_softs() {
    // at most one of x1, x2, x3 is true
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[-1, -2]));
    wcnf.add_hard_clause(lits(&[-1, -3]));
    wcnf.add_hard_clause(lits(&[-2, -3]));
    wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[3]), 1.0).unwrap();
    let mut opts = SimpOptions::default();
    opts.find_mxes = MxMode::NonCore;
    wcnf.simplify(&opts);
    assert_eq!(wcnf.n_mxes(), 1);
    let mx = &wcnf.mutexes()[0];
    assert!(!mx.is_core());
    assert!(mx.encoding_lit().is_some());
    assert_eq!(mx.soft_clause_lits().len(), 3);
    // at least two of the three softs are always falsified
    assert_eq!(wcnf.base_cost(), 2.0);
    // the three softs collapse into the single (~d) soft
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.wt(0), 1.0);
    assert_eq!(wcnf.n_hards(), 4);
}

#[test]
fn mutex_members_share_weight_and_status() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[-1, -2]));
    wcnf.add_hard_clause(lits(&[-1, -3]));
    wcnf.add_hard_clause(lits(&[-2, -3]));
    wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
    wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
    // the third soft has a different weight and must stay out
    wcnf.add_soft_clause(lits(&[3]), 2.0).unwrap();
    let mut opts = SimpOptions::default();
    opts.find_mxes = MxMode::NonCore;
    wcnf.simplify(&opts);
    assert_eq!(wcnf.n_mxes(), 1);
    assert_eq!(wcnf.mutexes()[0].soft_clause_lits().len(), 2);
    assert_eq!(wcnf.base_cost(), 1.0);
}

#[test]
fn flipped_unit_softs_lift_back() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[-1, 2]));
    wcnf.add_soft_clause(lits(&[1]), 3.0).unwrap();
    let mut opts = SimpOptions::none();
    opts.units = true;
    wcnf.simplify(&opts);
    // x2 is pure, which satisfies the hard; only the flipped soft variable
    // survives
    assert_eq!(wcnf.n_hards(), 0);
    assert_eq!(wcnf.n_softs(), 1);
    assert_eq!(wcnf.soft(0), &[Lit::negative(0)][..]);

    // internal x0 false <=> original x1 true (the soft is satisfied)
    let satisfied = Assignment::from(vec![TernaryVal::False]);
    let ex = wcnf.rewrite_model_to_input(&satisfied);
    assert!(ex.satisfies(Lit::positive(0)));

    let falsified = Assignment::from(vec![TernaryVal::True]);
    let ex = wcnf.rewrite_model_to_input(&falsified);
    assert!(!ex.satisfies(Lit::positive(0)));
    // the pure hard literal is reconstructed either way
    assert!(ex.satisfies(Lit::positive(1)));
}

#[test]
fn simplify_is_idempotent() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[1, 2]));
    wcnf.add_hard_clause(lits(&[-1, 3]));
    wcnf.add_soft_clause(lits(&[-3]), 2.0).unwrap();
    wcnf.add_soft_clause(lits(&[2, 3]), 4.0).unwrap();
    wcnf.simplify(&SimpOptions::default());
    let hards: Vec<Vec<Lit>> = wcnf.hards().iter().map(<[Lit]>::to_vec).collect();
    let softs: Vec<Vec<Lit>> = wcnf.softs().iter().map(<[Lit]>::to_vec).collect();
    let base = wcnf.base_cost();
    let n_vars = wcnf.n_vars();
    wcnf.simplify(&SimpOptions::default());
    let hards2: Vec<Vec<Lit>> = wcnf.hards().iter().map(<[Lit]>::to_vec).collect();
    let softs2: Vec<Vec<Lit>> = wcnf.softs().iter().map(<[Lit]>::to_vec).collect();
    assert_eq!(hards, hards2);
    assert_eq!(softs, softs2);
    assert_eq!(base, wcnf.base_cost());
    assert_eq!(n_vars, wcnf.n_vars());
}

#[test]
fn stored_literals_respect_max_var_and_map_back() {
    let mut wcnf = Wcnf::new();
    wcnf.add_hard_clause(lits(&[1, 4]));
    wcnf.add_hard_clause(lits(&[-4, 7]));
    wcnf.add_soft_clause(lits(&[1, 7]), 2.0).unwrap();
    wcnf.add_soft_clause(lits(&[4]), 1.0).unwrap();
    wcnf.simplify(&SimpOptions::default());
    let max_var = wcnf.max_var();
    let mut seen_ext = std::collections::BTreeSet::new();
    for cls in wcnf.hards().iter().chain(wcnf.softs().iter()) {
        for &l in cls {
            assert!(Some(l.var()) <= max_var);
            let ext = wcnf.input_lit(l).expect("stored literal must map back");
            seen_ext.insert((l.vidx(), ext.vidx()));
        }
    }
    // distinct internal variables map to distinct input variables
    let internals: Vec<usize> = seen_ext.iter().map(|&(i, _)| i).collect();
    let externals: Vec<usize> = seen_ext.iter().map(|&(_, e)| e).collect();
    let mut ext_dedup = externals.clone();
    ext_dedup.sort_unstable();
    ext_dedup.dedup();
    assert_eq!(internals.len(), seen_ext.len());
    assert_eq!(ext_dedup.len(), seen_ext.len());
}

#[test]
fn lifted_models_satisfy_the_input_hards() {
    let mut wcnf = Wcnf::from_dimacs_path("./data/small.wcnf").unwrap();
    assert_eq!(wcnf.dimacs_top(), 100.0);
    wcnf.simplify(&SimpOptions::default());
    assert!(!wcnf.is_unsat());
    // the contradictory (x6)/(~x6) pair went to the base cost
    assert_eq!(wcnf.base_cost(), 5.0);

    let mut solver = PropSolver::new();
    for cls in wcnf.hards() {
        solver.add_clause(cls);
    }
    assert_eq!(solver.solve_with_prop_budget(u64::MAX), TernaryVal::True);
    let model = solver.model().unwrap().clone();
    let eval = wcnf.check_model(&model).unwrap();
    assert!(eval.cost >= 0.0);
}

#[test]
fn forced_chain_collapses_and_lifts_back() {
    let mut wcnf = Wcnf::from_dimacs_path("./data/chain.wcnf").unwrap();
    wcnf.simplify(&SimpOptions::default());
    assert!(!wcnf.is_unsat());
    assert_eq!(wcnf.n_mxes(), 0);
    // hardening upgrades (~x5), after which everything is forced: x4 must be
    // true and its soft weight is provably incurred
    assert_eq!(wcnf.n_hards(), 0);
    assert_eq!(wcnf.n_softs(), 0);
    assert_eq!(wcnf.base_cost(), 2.0);
    // the forced chain is reconstructed on lift-back
    let ex = wcnf.rewrite_model_to_input(&Assignment::default());
    assert!(ex.satisfies(Lit::positive(0)));
    assert!(ex.satisfies(Lit::positive(1)));
    assert!(ex.satisfies(Lit::positive(2)));
    assert!(ex.satisfies(Lit::positive(3)));
    assert!(ex.satisfies(Lit::negative(4)));
    // evaluating against the untouched input recovers exactly the base cost
    let eval = wcnf.check_model(&Assignment::default()).unwrap();
    assert_eq!(eval.cost, 2.0);
    assert_eq!(eval.n_false_softs, 1);
}

#[test]
fn written_output_reparses() {
    let mut wcnf = Wcnf::from_dimacs_path("./data/small.wcnf").unwrap();
    wcnf.simplify(&SimpOptions::default());
    let mut out = Vec::new();
    wcnf.write_dimacs(&mut out).unwrap();
    let mut reparsed = Wcnf::new();
    thresher_core::fio::parse_dimacs(&out[..], &mut reparsed).unwrap();
    // the base cost is encoded as a contradictory weighted pair
    assert_eq!(reparsed.total_cls_wt(), wcnf.total_cls_wt() + 2.0 * wcnf.base_cost());
}

#[test]
fn check_model_rejects_hard_violations() {
    let mut wcnf = Wcnf::from_dimacs_path("./data/chain.wcnf").unwrap();
    let bogus: Assignment = (0..5).map(|_| TernaryVal::False).collect();
    // before simplification the model passes through unchanged; x1 false
    // violates the unit hard (x1)
    assert!(wcnf.check_model(&bogus).is_err());
}
