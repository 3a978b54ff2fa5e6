//! # The Weighted CNF Store
//!
//! [`Wcnf`] holds the hard and soft clause populations of a weighted partial
//! MaxSAT instance together with everything the simplification pipeline
//! accumulates: the base cost, weight statistics, the unit / equivalence /
//! flip side tables needed to lift models back to the input variable space,
//! and the discovered soft clause mutexes.
//!
//! The lifecycle is: create (empty or from a DIMACS file), populate, run
//! [`Wcnf::simplify`] once, hand the simplified clauses to a solver, then
//! translate each candidate model back with [`Wcnf::rewrite_model_to_input`]
//! and evaluate it with [`Wcnf::check_model`].

use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use itertools::Itertools;
use thiserror::Error;

use crate::{
    fio,
    options::SimpOptions,
    oracle::{PropSolver, SatOracle},
    packed::PackedVecs,
    types::{Assignment, Lit, TernaryVal, Var, Weight},
};

/// A discovered at-most-one constraint over soft clause selector literals.
///
/// The selector (`blit`) of a soft clause is true iff the clause is relaxed,
/// i.e., its cost is incurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScMx {
    blits: Vec<Lit>,
    is_core: bool,
    encoding_lit: Option<Lit>,
}

impl ScMx {
    pub(crate) fn new(blits: Vec<Lit>, is_core: bool, encoding_lit: Option<Lit>) -> Self {
        ScMx {
            blits,
            is_core,
            encoding_lit,
        }
    }

    /// The selector literals of the mutex
    #[must_use]
    pub fn soft_clause_lits(&self) -> &[Lit] {
        &self.blits
    }

    /// If true, at most one of the blits may be true (at most one of the
    /// corresponding softs falsified) and a true encoding literal implies one
    /// of them is. If false, at most one of the blits may be false (at most
    /// one of the corresponding softs satisfied) and a false encoding literal
    /// implies one of them is false.
    #[must_use]
    pub fn is_core(&self) -> bool {
        self.is_core
    }

    /// The defining literal of the mutex encoding, if one was introduced
    #[must_use]
    pub fn encoding_lit(&self) -> Option<Lit> {
        self.encoding_lit
    }

    pub(crate) fn blits_mut(&mut self) -> &mut Vec<Lit> {
        &mut self.blits
    }

    pub(crate) fn encoding_lit_mut(&mut self) -> &mut Option<Lit> {
        &mut self.encoding_lit
    }
}

impl fmt::Display for ScMx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: encoding lit = ",
            if self.is_core { "core mx" } else { "non-core mx" }
        )?;
        match self.encoding_lit {
            Some(l) => write!(f, "{l}")?,
            None => write!(f, "-")?,
        }
        write!(f, " blits = [")?;
        for (i, l) in self.blits.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{l}")?;
        }
        write!(f, "]")
    }
}

/// Comparison sense of a cardinality constraint side record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSense {
    /// At most `bound` of the literals are true
    AtMost,
    /// At least `bound` of the literals are true
    AtLeast,
    /// Exactly `bound` of the literals are true
    Eq,
}

/// A cardinality constraint stored for the outer solver; the store only
/// records these, it does not encode them into clauses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardConstr {
    pub lits: Vec<Lit>,
    pub bound: isize,
    pub sense: CardSense,
}

/// Classification of the stored instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsType {
    #[default]
    Undef,
    /// Unweighted, no hard clauses
    Ms,
    /// Unweighted with hard clauses
    Pms,
    /// Weighted, no hard clauses
    Wms,
    /// Weighted with hard clauses
    Wpms,
}

impl fmt::Display for MsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsType::Undef => write!(f, "undef"),
            MsType::Ms => write!(f, "ms"),
            MsType::Pms => write!(f, "pms"),
            MsType::Wms => write!(f, "wms"),
            MsType::Wpms => write!(f, "wpms"),
        }
    }
}

/// Result of evaluating a model against the original input formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelEval {
    /// Summed weight of the falsified soft clauses
    pub cost: Weight,
    /// Number of falsified soft clauses
    pub n_false_softs: usize,
}

/// Errors of the WCNF store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WcnfError {
    /// Soft clauses must have positive weight
    #[error("soft clause cannot have negative weight: {0}")]
    NegativeWeight(Weight),
    /// Model checking re-parses the input file, so the store must have been
    /// built from one
    #[error("cannot check a model without a recorded instance file")]
    NoInstanceFile,
    /// The lifted model falsifies a hard clause of the input formula
    #[error("model does not satisfy the hard clauses of the input formula")]
    ModelViolatesHards,
}

/// Counts and weight statistics of a [`Wcnf`], for printing by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WcnfStats {
    pub n_hards: usize,
    pub n_hard_lits: usize,
    pub n_softs: usize,
    pub n_soft_lits: usize,
    pub n_units: usize,
    pub n_vars: usize,
    pub n_mxes: usize,
    pub total_cls_wt: Weight,
    pub base_cost: Weight,
    pub n_diff_wts: usize,
    pub wt_min: Weight,
    pub wt_max: Weight,
    pub wt_mean: Weight,
    pub wt_var: Weight,
    pub unsat: bool,
}

/// A weighted CNF formula with hard and soft clause partitions
#[derive(Debug)]
pub struct Wcnf {
    pub(crate) hard_cls: PackedVecs<Lit>,
    pub(crate) soft_cls: PackedVecs<Lit>,
    pub(crate) soft_clswts: Vec<Weight>,
    /// Summed weight of the remaining soft clauses
    pub(crate) total_cls_wt: Weight,
    /// Weight of soft clauses provably falsified by preprocessing
    pub(crate) base_cost: Weight,

    /// Number of variables including ones introduced by simplification
    pub(crate) n_vars: u32,
    /// Number of variables of the input formula; new variables live strictly
    /// above this range
    pub(crate) n_orig_vars: u32,
    pub(crate) n_orig_units: usize,

    pub(crate) dimacs_nvars: u32,
    pub(crate) dimacs_nclauses: usize,
    /// Weight at or above which an input clause is hard
    pub(crate) dimacs_top: Weight,
    pub(crate) parse_time: f64,
    pub(crate) instance_file_name: Option<PathBuf>,

    /// Sticky: once the hards are found contradictory every further mutation
    /// is a no-op
    pub(crate) unsat: bool,
    pub(crate) no_dups: bool,
    pub(crate) int_wts: bool,
    pub(crate) orig_all_lits_soft: bool,
    pub(crate) simplified: bool,

    pub(crate) ms_type: MsType,
    pub(crate) wt_min: Weight,
    pub(crate) wt_max: Weight,
    pub(crate) wt_mean: Weight,
    pub(crate) wt_var: Weight,
    pub(crate) n_diff_wts: usize,
    /// Ascending weights w such that the summed weight of all softs strictly
    /// lighter than w is strictly less than w
    pub(crate) transition_wts: Vec<Weight>,

    // preprocessing side tables, all in the input (external) variable space
    pub(crate) hard_units: Vec<Lit>,
    pub(crate) all_scc: Vec<Vec<Lit>>,
    pub(crate) flipped_vars: Vec<bool>,
    pub(crate) ex2in: Vec<Option<Var>>,
    pub(crate) in2ex: Vec<Option<Var>>,

    pub(crate) mutexes: Vec<ScMx>,
    pub(crate) card_constrs: Vec<CardConstr>,
}

impl Default for Wcnf {
    fn default() -> Self {
        Wcnf {
            hard_cls: PackedVecs::new(),
            soft_cls: PackedVecs::new(),
            soft_clswts: Vec::new(),
            total_cls_wt: 0.0,
            base_cost: 0.0,
            n_vars: 0,
            n_orig_vars: 0,
            n_orig_units: 0,
            dimacs_nvars: 0,
            dimacs_nclauses: 0,
            dimacs_top: Weight::INFINITY,
            parse_time: 0.0,
            instance_file_name: None,
            unsat: false,
            no_dups: true,
            int_wts: true,
            orig_all_lits_soft: false,
            simplified: false,
            ms_type: MsType::default(),
            wt_min: 0.0,
            wt_max: 0.0,
            wt_mean: 0.0,
            wt_var: 0.0,
            n_diff_wts: 0,
            transition_wts: Vec::new(),
            hard_units: Vec::new(),
            all_scc: Vec::new(),
            flipped_vars: Vec::new(),
            ex2in: Vec::new(),
            in2ex: Vec::new(),
            mutexes: Vec::new(),
            card_constrs: Vec::new(),
        }
    }
}

impl Wcnf {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a (possibly gzipped) DIMACS WCNF file into a fresh store and
    /// computes the weight statistics
    ///
    /// # Errors
    ///
    /// On IO or parse errors.
    pub fn from_dimacs_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Wcnf> {
        let path = path.as_ref();
        let start = Instant::now();
        let mut wcnf = Wcnf::default();
        let reader = fio::open_compressed_reader(path)
            .with_context(|| format!("failed to open instance file {}", path.display()))?;
        fio::parse_dimacs(reader, &mut wcnf)
            .with_context(|| format!("failed to parse instance file {}", path.display()))?;
        wcnf.instance_file_name = Some(path.to_owned());
        wcnf.compute_wt_info();
        wcnf.parse_time = start.elapsed().as_secs_f64();
        Ok(wcnf)
    }

    /// Records the DIMACS header; `top` is the weight at or above which an
    /// input clause is hard
    pub fn set_dimacs_params(&mut self, nvars: u32, nclauses: usize, top: Weight) {
        self.dimacs_nvars = nvars;
        self.dimacs_nclauses = nclauses;
        self.dimacs_top = top;
    }

    /// Routes an input clause to the hard or soft partition depending on the
    /// recorded `top` weight
    ///
    /// # Errors
    ///
    /// [`WcnfError::NegativeWeight`] on a negative soft weight.
    pub fn add_dimacs_clause(&mut self, lits: Vec<Lit>, weight: Weight) -> Result<(), WcnfError> {
        if weight >= self.dimacs_top {
            self.add_hard_clause(lits);
            Ok(())
        } else {
            self.add_soft_clause(lits, weight)
        }
    }

    /// Adds a hard clause of the input formula
    pub fn add_hard_clause(&mut self, lits: Vec<Lit>) {
        if self.unsat {
            return;
        }
        self.update_max_orig_var(&lits);
        if lits.len() == 1 {
            self.n_orig_units += 1;
        }
        self.add_derived_hard(lits);
    }

    /// Adds a soft clause of the input formula. Zero-weight clauses are
    /// silently dropped.
    ///
    /// # Errors
    ///
    /// [`WcnfError::NegativeWeight`] on a negative weight.
    pub fn add_soft_clause(&mut self, lits: Vec<Lit>, weight: Weight) -> Result<(), WcnfError> {
        if weight < 0.0 {
            return Err(WcnfError::NegativeWeight(weight));
        }
        if self.unsat {
            return Ok(());
        }
        if weight > 0.0 {
            self.update_max_orig_var(&lits);
            self.add_derived_soft(lits, weight);
        }
        Ok(())
    }

    /// Records a cardinality constraint for the outer solver. The record is
    /// kept verbatim in the input variable space; it is not encoded into
    /// clauses and not touched by simplification.
    pub fn add_card_constr(&mut self, lits: Vec<Lit>, bound: isize, sense: CardSense) {
        if self.unsat {
            return;
        }
        self.update_max_orig_var(&lits);
        self.card_constrs.push(CardConstr { lits, bound, sense });
    }

    /// Adds a hard clause produced by simplification; does not extend the
    /// input variable range
    pub(crate) fn add_derived_hard(&mut self, mut lits: Vec<Lit>) {
        if self.unsat {
            return;
        }
        if !Self::prepare_clause(&mut lits) {
            return;
        }
        if lits.is_empty() {
            self.unsat = true;
            return;
        }
        self.update_max_var(&lits);
        self.hard_cls.add_vec(&lits);
        self.no_dups = false;
    }

    /// Adds a soft clause produced by simplification; an empty clause
    /// contributes its weight to the base cost instead of being stored
    pub(crate) fn add_derived_soft(&mut self, mut lits: Vec<Lit>, weight: Weight) {
        if self.unsat {
            return;
        }
        if !Self::prepare_clause(&mut lits) {
            return;
        }
        if lits.is_empty() {
            self.base_cost += weight;
        } else {
            if weight.fract() != 0.0 {
                self.int_wts = false;
            }
            self.update_max_var(&lits);
            self.soft_cls.add_vec(&lits);
            self.soft_clswts.push(weight);
            self.total_cls_wt += weight;
        }
        self.no_dups = false;
    }

    /// Stable-sorts the literals, drops duplicates and returns `false` iff
    /// the clause contains a complementary pair
    pub(crate) fn prepare_clause(lits: &mut Vec<Lit>) -> bool {
        if lits.len() > 1 {
            lits.sort_unstable();
            let mut cur = 1;
            for examine in 1..lits.len() {
                if lits[cur - 1] == !lits[examine] {
                    return false;
                }
                if lits[cur - 1] != lits[examine] {
                    lits[cur] = lits[examine];
                    cur += 1;
                }
            }
            lits.truncate(cur);
        }
        true
    }

    fn update_max_orig_var(&mut self, lits: &[Lit]) {
        for l in lits {
            if l.vidx32() + 1 > self.n_orig_vars {
                self.n_orig_vars = l.vidx32() + 1;
            }
        }
        if self.n_orig_vars > self.n_vars {
            self.n_vars = self.n_orig_vars;
        }
    }

    pub(crate) fn update_max_var(&mut self, lits: &[Lit]) {
        for l in lits {
            if l.vidx32() + 1 > self.n_vars {
                self.n_vars = l.vidx32() + 1;
            }
        }
    }

    /// Allocates a fresh variable above everything used so far
    pub(crate) fn fresh_var(&mut self) -> Var {
        let v = Var::new(self.n_vars);
        self.n_vars += 1;
        v
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    /// The hard clauses
    #[must_use]
    pub fn hards(&self) -> &PackedVecs<Lit> {
        &self.hard_cls
    }

    /// The soft clauses
    #[must_use]
    pub fn softs(&self) -> &PackedVecs<Lit> {
        &self.soft_cls
    }

    /// The soft clause weights, parallel to [`Wcnf::softs`]
    #[must_use]
    pub fn soft_wts(&self) -> &[Weight] {
        &self.soft_clswts
    }

    /// The i-th hard clause
    #[must_use]
    pub fn hard(&self, i: usize) -> &[Lit] {
        &self.hard_cls[i]
    }

    /// The i-th soft clause
    #[must_use]
    pub fn soft(&self, i: usize) -> &[Lit] {
        &self.soft_cls[i]
    }

    /// The weight of the i-th soft clause
    #[must_use]
    pub fn wt(&self, i: usize) -> Weight {
        self.soft_clswts[i]
    }

    #[must_use]
    pub fn n_hards(&self) -> usize {
        self.hard_cls.len()
    }

    #[must_use]
    pub fn n_softs(&self) -> usize {
        self.soft_cls.len()
    }

    /// Number of variables, including ones introduced by simplification
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.n_vars as usize
    }

    /// Number of variables of the input formula
    #[must_use]
    pub fn n_orig_vars(&self) -> usize {
        self.n_orig_vars as usize
    }

    /// The highest variable in use, if any
    #[must_use]
    pub fn max_var(&self) -> Option<Var> {
        if self.n_vars == 0 {
            None
        } else {
            Some(Var::new(self.n_vars - 1))
        }
    }

    /// Summed weight of the remaining soft clauses
    #[must_use]
    pub fn total_cls_wt(&self) -> Weight {
        self.total_cls_wt
    }

    /// Cost provably incurred by every solution
    #[must_use]
    pub fn base_cost(&self) -> Weight {
        self.base_cost
    }

    /// Base cost plus the weight of all remaining softs
    #[must_use]
    pub fn total_wt(&self) -> Weight {
        self.base_cost + self.total_cls_wt
    }

    /// Adds to the base cost
    pub fn add_to_base_cost(&mut self, weight: Weight) {
        self.base_cost += weight;
    }

    /// True iff the hard clauses have been found contradictory
    #[must_use]
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    /// True iff all soft weights seen so far are integral
    #[must_use]
    pub fn integer_wts(&self) -> bool {
        self.int_wts
    }

    /// True iff every literal of the input formula occurs in a unit soft
    #[must_use]
    pub fn orig_all_lits_are_softs(&self) -> bool {
        self.orig_all_lits_soft
    }

    #[must_use]
    pub fn ms_type(&self) -> MsType {
        self.ms_type
    }

    #[must_use]
    pub fn min_soft_wt(&self) -> Weight {
        self.wt_min
    }

    #[must_use]
    pub fn max_soft_wt(&self) -> Weight {
        self.wt_max
    }

    #[must_use]
    pub fn n_diff_wts(&self) -> usize {
        self.n_diff_wts
    }

    /// The transition weights, ascending
    #[must_use]
    pub fn transition_wts(&self) -> &[Weight] {
        &self.transition_wts
    }

    /// The discovered soft clause mutexes
    #[must_use]
    pub fn mutexes(&self) -> &[ScMx] {
        &self.mutexes
    }

    #[must_use]
    pub fn n_mxes(&self) -> usize {
        self.mutexes.len()
    }

    /// The recorded cardinality constraints
    #[must_use]
    pub fn card_constrs(&self) -> &[CardConstr] {
        &self.card_constrs
    }

    /// The instance file the store was parsed from, if any
    #[must_use]
    pub fn file_name(&self) -> Option<&Path> {
        self.instance_file_name.as_deref()
    }

    #[must_use]
    pub fn dimacs_top(&self) -> Weight {
        self.dimacs_top
    }

    #[must_use]
    pub fn dimacs_nvars(&self) -> u32 {
        self.dimacs_nvars
    }

    #[must_use]
    pub fn parse_time(&self) -> f64 {
        self.parse_time
    }

    /// Maps an internal literal back to the input variable space. `None` for
    /// variables that do not correspond to an input variable.
    #[must_use]
    pub fn input_lit(&self, l: Lit) -> Option<Lit> {
        if self.in2ex.is_empty() {
            return Some(l);
        }
        let ev = (*self.in2ex.get(l.vidx())?)?;
        let mut neg = l.is_neg();
        if self.flipped_vars.get(ev.idx()).copied().unwrap_or(false) {
            neg = !neg;
        }
        Some(ev.lit(neg))
    }

    /// Maps a sequence of internal literals back to the input variable space
    #[must_use]
    pub fn input_lits(&self, lits: &[Lit]) -> Vec<Option<Lit>> {
        lits.iter().map(|&l| self.input_lit(l)).collect()
    }

    /// Gathers counts and weight statistics
    #[must_use]
    pub fn stats(&self) -> WcnfStats {
        let n_units = if self.hard_units.is_empty() {
            self.n_orig_units
        } else {
            self.hard_units.len()
        };
        WcnfStats {
            n_hards: self.n_hards(),
            n_hard_lits: self.hard_cls.total_size(),
            n_softs: self.n_softs(),
            n_soft_lits: self.soft_cls.total_size(),
            n_units,
            n_vars: self.n_vars(),
            n_mxes: self.n_mxes(),
            total_cls_wt: self.total_cls_wt,
            base_cost: self.base_cost,
            n_diff_wts: self.n_diff_wts,
            wt_min: self.wt_min,
            wt_max: self.wt_max,
            wt_mean: self.wt_mean,
            wt_var: self.wt_var,
            unsat: self.unsat,
        }
    }

    // ------------------------------------------------------------------
    // simplification
    // ------------------------------------------------------------------

    /// Runs the simplification pipeline with the bundled SAT oracle.
    /// See [`Wcnf::simplify_with_oracle`].
    pub fn simplify(&mut self, opts: &SimpOptions) {
        self.simplify_with_oracle(opts, PropSolver::new);
    }

    /// Runs the simplification pipeline: hardening, unit and equality
    /// reduction, deduplication, mutex discovery and the final variable
    /// remap, in that order. A fresh oracle is taken from `new_oracle` for
    /// every phase that needs one.
    ///
    /// Afterwards the remaining clauses are expressed over contiguous
    /// internal variables; [`Wcnf::rewrite_model_to_input`] translates models
    /// back. A second call is a no-op.
    pub fn simplify_with_oracle<O, F>(&mut self, opts: &SimpOptions, mut new_oracle: F)
    where
        O: SatOracle,
        F: FnMut() -> O,
    {
        if self.simplified {
            return;
        }
        self.simplified = true;
        self.orig_all_lits_soft = self.test_all_lits_are_softs();
        if opts.harden {
            self.simple_harden(&mut new_oracle);
        }
        if opts.eqs || opts.units {
            self.sub_eqs_and_units(opts.eqs, &mut new_oracle);
        }
        self.rem_dup_cls();
        // non-core discovery first: it bumps the base cost
        if opts.find_mxes.find_non_cores() {
            self.discover_mutexes(false, opts, &mut new_oracle);
        }
        if opts.find_mxes.find_cores() {
            self.discover_mutexes(true, opts, &mut new_oracle);
        }
        self.compute_wt_info();
        self.remap_vars();
    }

    fn test_all_lits_are_softs(&self) -> bool {
        let mut is_soft = vec![false; self.n_vars()];
        for cls in &self.soft_cls {
            if cls.len() == 1 {
                is_soft[cls[0].vidx()] = true;
            }
        }
        for cls in &self.hard_cls {
            if cls.iter().any(|l| !is_soft[l.vidx()]) {
                return false;
            }
        }
        for cls in &self.soft_cls {
            if cls.iter().any(|l| !is_soft[l.vidx()]) {
                return false;
            }
        }
        true
    }

    /// Recomputes the weight statistics, the transition weights and the
    /// instance classification
    pub(crate) fn compute_wt_info(&mut self) {
        self.transition_wts.clear();

        if self.soft_clswts.is_empty() {
            self.wt_min = 0.0;
            self.wt_max = 0.0;
            self.wt_mean = 0.0;
            self.wt_var = 0.0;
            self.n_diff_wts = 0;
            self.ms_type = if !self.hard_cls.is_empty() {
                if self.base_cost > 0.0 {
                    MsType::Wpms
                } else {
                    MsType::Pms
                }
            } else if self.base_cost > 0.0 {
                MsType::Wms
            } else {
                MsType::Ms
            };
            return;
        }

        let mut wts = self.soft_clswts.clone();
        wts.sort_unstable_by(f64::total_cmp);
        self.wt_min = wts[0];
        self.wt_max = wts[wts.len() - 1];
        self.wt_mean = wts.iter().sum::<Weight>() / wts.len() as Weight;
        self.wt_var = if wts.len() > 1 {
            wts.iter()
                .map(|w| (w - self.wt_mean) * (w - self.wt_mean))
                .sum::<Weight>()
                / (wts.len() - 1) as Weight
        } else {
            0.0
        };

        let mut diff_wts: Vec<Weight> = Vec::new();
        let mut diff_counts: Vec<usize> = Vec::new();
        for &w in &wts {
            if diff_wts.last() == Some(&w) {
                *diff_counts.last_mut().unwrap() += 1;
            } else {
                diff_wts.push(w);
                diff_counts.push(1);
            }
        }
        let mut wt_so_far = diff_wts[0] * diff_counts[0] as Weight;
        for i in 1..diff_wts.len() {
            if diff_wts[i] > wt_so_far {
                self.transition_wts.push(diff_wts[i]);
            }
            wt_so_far += diff_wts[i] * diff_counts[i] as Weight;
        }
        self.n_diff_wts = diff_wts.len();

        self.ms_type = if !self.hard_cls.is_empty() {
            if diff_wts.len() > 1 || self.base_cost > 0.0 {
                MsType::Wpms
            } else {
                MsType::Pms
            }
        } else if diff_wts.len() > 1 || self.base_cost > 0.0 {
            MsType::Wms
        } else {
            MsType::Ms
        };
    }

    /// Assigns contiguous internal indices to the surviving variables and
    /// rewrites all clauses and mutex records to them. Unit softs are
    /// flip-normalized so that every unit soft holds a negative literal.
    pub(crate) fn remap_vars(&mut self) {
        fn map_lit(l: Lit, ex2in: &[Option<Var>], flipped: &[bool]) -> Lit {
            let v = ex2in[l.vidx()].expect("remapped variable must appear in the formula");
            v.lit(if flipped[l.vidx()] {
                !l.is_neg()
            } else {
                l.is_neg()
            })
        }

        let nv = self.n_vars();
        let mut appears = vec![false; nv];
        for cls in &self.hard_cls {
            for l in cls {
                appears[l.vidx()] = true;
            }
        }
        self.flipped_vars = vec![false; nv];
        for cls in &self.soft_cls {
            for l in cls {
                appears[l.vidx()] = true;
            }
            // normalize unit softs to a negative literal: making the selector
            // (the complement) true incurs the cost
            if cls.len() == 1 && cls[0].is_pos() {
                self.flipped_vars[cls[0].vidx()] = true;
            }
        }

        self.ex2in = vec![None; nv];
        self.in2ex = vec![None; nv];
        let mut nxt = 0u32;
        for v in 0..nv {
            if appears[v] {
                self.in2ex[nxt as usize] = Some(Var::new(v as u32));
                self.ex2in[v] = Some(Var::new(nxt));
                nxt += 1;
            }
        }
        self.n_vars = nxt;

        let mut tmp = PackedVecs::new();
        let mut c = Vec::new();
        for cls in &self.hard_cls {
            c.clear();
            c.extend(
                cls.iter()
                    .map(|&l| map_lit(l, &self.ex2in, &self.flipped_vars)),
            );
            tmp.add_vec(&c);
        }
        self.hard_cls = tmp;

        let mut tmp = PackedVecs::new();
        for cls in &self.soft_cls {
            c.clear();
            c.extend(
                cls.iter()
                    .map(|&l| map_lit(l, &self.ex2in, &self.flipped_vars)),
            );
            tmp.add_vec(&c);
        }
        self.soft_cls = tmp;

        for mx in &mut self.mutexes {
            for l in mx.blits_mut() {
                *l = map_lit(*l, &self.ex2in, &self.flipped_vars);
            }
            if let Some(el) = mx.encoding_lit_mut() {
                *el = map_lit(*el, &self.ex2in, &self.flipped_vars);
            }
        }
    }

    // ------------------------------------------------------------------
    // model lift-back and checking
    // ------------------------------------------------------------------

    /// Translates a model over the simplified formula's internal variables
    /// into a model of the input formula, reconstructing the values of
    /// variables eliminated by units, equivalences and flips
    #[must_use]
    pub fn rewrite_model_to_input(&self, model: &Assignment) -> Assignment {
        let n_orig = self.n_orig_vars();
        let mut ex = vec![TernaryVal::True; n_orig];

        if self.in2ex.is_empty() {
            for (v, val) in ex.iter_mut().enumerate() {
                match model.var_value(Var::new(v as u32)) {
                    TernaryVal::Undef => (),
                    assigned => *val = assigned,
                }
            }
        } else {
            for (i, ev) in self.in2ex.iter().enumerate() {
                let Some(ev) = ev else { continue };
                if ev.idx() >= n_orig {
                    continue;
                }
                let mut val = model.var_value(Var::new(i as u32));
                if self.flipped_vars.get(ev.idx()).copied().unwrap_or(false) {
                    val = !val;
                }
                if val != TernaryVal::Undef {
                    ex[ev.idx()] = val;
                }
            }
        }

        for &l in &self.hard_units {
            if l.vidx() < n_orig {
                ex[l.vidx()] = TernaryVal::from(l.is_pos());
            }
        }
        for scc in &self.all_scc {
            let rep = scc[0];
            for &x in &scc[1..] {
                ex[x.vidx()] = if x.is_neg() == rep.is_neg() {
                    ex[rep.vidx()]
                } else {
                    !ex[rep.vidx()]
                };
            }
        }
        Assignment::from(ex)
    }

    /// Checks a model of the simplified formula against an untouched copy of
    /// the input formula: every hard clause must be satisfied and the weight
    /// of falsified softs is summed
    ///
    /// # Errors
    ///
    /// [`WcnfError::NoInstanceFile`] if the store was not built from a file,
    /// [`WcnfError::ModelViolatesHards`] if a hard clause is falsified, and
    /// parse errors from re-reading the file.
    pub fn check_model(&mut self, model: &Assignment) -> anyhow::Result<ModelEval> {
        self.check_model_impl(model, false)
    }

    /// Like [`Wcnf::check_model`] but releases the simplified clause arenas
    /// first to reclaim memory; the store is unusable afterwards, so only
    /// call this when about to terminate
    pub fn check_model_final(&mut self, model: &Assignment) -> anyhow::Result<ModelEval> {
        self.check_model_impl(model, true)
    }

    fn check_model_impl(&mut self, model: &Assignment, release: bool) -> anyhow::Result<ModelEval> {
        let path = self
            .instance_file_name
            .clone()
            .ok_or(WcnfError::NoInstanceFile)?;
        if release {
            self.hard_cls.clear();
            self.soft_cls.clear();
        }
        let fresh = Wcnf::from_dimacs_path(&path)?;
        let ex_model = self.rewrite_model_to_input(model);
        for hc in &fresh.hard_cls {
            if !hc.iter().any(|&l| ex_model.satisfies(l)) {
                anyhow::bail!(WcnfError::ModelViolatesHards);
            }
        }
        let mut cost = 0.0;
        let mut n_false_softs = 0;
        for (i, sc) in fresh.soft_cls.iter().enumerate() {
            if !sc.iter().any(|&l| ex_model.satisfies(l)) {
                cost += fresh.soft_clswts[i];
                n_false_softs += 1;
            }
        }
        Ok(ModelEval { cost, n_false_softs })
    }

    // ------------------------------------------------------------------
    // output
    // ------------------------------------------------------------------

    /// Writes the simplified formula as a DIMACS WCNF file over the input
    /// variable space. Hard units and variable equivalences captured during
    /// preprocessing are emitted as clauses and the accumulated base cost is
    /// encoded as a pair of contradictory weighted units, so the written
    /// formula has the same optimal cost as the input.
    ///
    /// # Errors
    ///
    /// IO errors from the writer.
    pub fn write_dimacs<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        if self.unsat {
            writeln!(writer, "c hard clauses are unsatisfiable")?;
            writeln!(writer, "p cnf 1 2")?;
            writeln!(writer, "1 0")?;
            writeln!(writer, "-1 0")?;
            return Ok(());
        }

        let fmt_wt = |w: Weight| -> String {
            if w.fract() == 0.0 && w.abs() < 9e15 {
                format!("{}", w as i64)
            } else {
                format!("{w}")
            }
        };
        let ext = |l: Lit| self.input_lit(l).expect("stored literal must map back");

        let mut max_ext: u32 = if self.base_cost > 0.0 { 1 } else { 0 };
        let mut track = |l: Lit| {
            if l.vidx32() + 1 > max_ext {
                max_ext = l.vidx32() + 1;
            }
        };
        let mut n_cls = self.n_hards() + self.n_softs() + self.hard_units.len();
        for cls in &self.hard_cls {
            cls.iter().for_each(|&l| track(ext(l)));
        }
        for cls in &self.soft_cls {
            cls.iter().for_each(|&l| track(ext(l)));
        }
        self.hard_units.iter().for_each(|&l| track(l));
        for scc in &self.all_scc {
            scc.iter().for_each(|&l| track(l));
            n_cls += (scc.len() - 1) * 2;
        }
        if self.base_cost > 0.0 {
            n_cls += 2;
        }

        let top = self.total_wt() + 1.0;
        writeln!(writer, "c simplified wcnf, input vars: {}", self.n_orig_vars)?;
        writeln!(writer, "p wcnf {} {} {}", max_ext.max(1), n_cls, fmt_wt(top))?;

        if self.base_cost > 0.0 {
            writeln!(writer, "{} 1 0", fmt_wt(self.base_cost))?;
            writeln!(writer, "{} -1 0", fmt_wt(self.base_cost))?;
        }
        for (i, cls) in self.soft_cls.iter().enumerate() {
            writeln!(
                writer,
                "{} {} 0",
                fmt_wt(self.soft_clswts[i]),
                cls.iter().map(|&l| ext(l).to_dimacs()).join(" ")
            )?;
        }
        for &l in &self.hard_units {
            writeln!(writer, "{} {} 0", fmt_wt(top), l.to_dimacs())?;
        }
        for scc in &self.all_scc {
            let rep = scc[0];
            for &x in &scc[1..] {
                writeln!(
                    writer,
                    "{} {} {} 0",
                    fmt_wt(top),
                    (!rep).to_dimacs(),
                    x.to_dimacs()
                )?;
                writeln!(
                    writer,
                    "{} {} {} 0",
                    fmt_wt(top),
                    (!x).to_dimacs(),
                    rep.to_dimacs()
                )?;
            }
        }
        for cls in &self.hard_cls {
            writeln!(
                writer,
                "{} {} 0",
                fmt_wt(top),
                cls.iter().map(|&l| ext(l).to_dimacs()).join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CardSense, MsType, Wcnf, WcnfError};
    use crate::types::Lit;

    fn lits(ls: &[i32]) -> Vec<Lit> {
        ls.iter().map(|&l| Lit::from_dimacs(l).unwrap()).collect()
    }

    #[test]
    fn tautologies_are_rejected() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[1, -1, 2]));
        assert_eq!(wcnf.n_hards(), 0);
        // the variables still count as seen
        assert_eq!(wcnf.n_vars(), 2);
    }

    #[test]
    fn duplicate_lits_are_dropped() {
        let mut wcnf = Wcnf::new();
        wcnf.add_hard_clause(lits(&[2, 1, 2, 1]));
        assert_eq!(wcnf.hard(0), &lits(&[1, 2])[..]);
    }

    #[test]
    fn soft_weight_rules() {
        let mut wcnf = Wcnf::new();
        assert!(matches!(
            wcnf.add_soft_clause(lits(&[1]), -1.0),
            Err(WcnfError::NegativeWeight(_))
        ));
        wcnf.add_soft_clause(lits(&[1]), 0.0).unwrap();
        assert_eq!(wcnf.n_softs(), 0);
        wcnf.add_soft_clause(lits(&[1]), 2.5).unwrap();
        assert_eq!(wcnf.n_softs(), 1);
        assert!(!wcnf.integer_wts());
        assert_eq!(wcnf.total_cls_wt(), 2.5);
    }

    #[test]
    fn empty_soft_goes_to_base_cost() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(vec![], 3.0).unwrap();
        assert_eq!(wcnf.n_softs(), 0);
        assert_eq!(wcnf.base_cost(), 3.0);
    }

    #[test]
    fn dimacs_routing_by_top() {
        let mut wcnf = Wcnf::new();
        wcnf.set_dimacs_params(3, 2, 10.0);
        wcnf.add_dimacs_clause(lits(&[1, 2]), 10.0).unwrap();
        wcnf.add_dimacs_clause(lits(&[2, 3]), 4.0).unwrap();
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.n_softs(), 1);
    }

    #[test]
    fn transition_weights() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
        wcnf.add_soft_clause(lits(&[3]), 10.0).unwrap();
        wcnf.add_soft_clause(lits(&[4]), 20.0).unwrap();
        wcnf.compute_wt_info();
        // 1 + 1 < 10 but 1 + 1 + 10 = 12 < 20
        assert_eq!(wcnf.transition_wts(), &[10.0, 20.0]);
        assert_eq!(wcnf.n_diff_wts(), 3);
        assert_eq!(wcnf.min_soft_wt(), 1.0);
        assert_eq!(wcnf.max_soft_wt(), 20.0);
    }

    #[test]
    fn no_transition_weight_when_light_softs_dominate() {
        let mut wcnf = Wcnf::new();
        for v in 1..=5 {
            wcnf.add_soft_clause(lits(&[v]), 2.0).unwrap();
        }
        wcnf.add_soft_clause(lits(&[6]), 3.0).unwrap();
        wcnf.compute_wt_info();
        // 5 * 2 = 10 >= 3
        assert!(wcnf.transition_wts().is_empty());
    }

    #[test]
    fn ms_type_classification() {
        let mut wcnf = Wcnf::new();
        wcnf.add_soft_clause(lits(&[1]), 1.0).unwrap();
        wcnf.compute_wt_info();
        assert_eq!(wcnf.ms_type(), MsType::Ms);
        wcnf.add_hard_clause(lits(&[1, 2]));
        wcnf.compute_wt_info();
        assert_eq!(wcnf.ms_type(), MsType::Pms);
        wcnf.add_soft_clause(lits(&[2]), 5.0).unwrap();
        wcnf.compute_wt_info();
        assert_eq!(wcnf.ms_type(), MsType::Wpms);
    }

    #[test]
    fn card_constraints_are_recorded() {
        let mut wcnf = Wcnf::new();
        wcnf.add_card_constr(lits(&[1, 2, 3]), 2, CardSense::AtMost);
        assert_eq!(wcnf.card_constrs().len(), 1);
        assert_eq!(wcnf.card_constrs()[0].bound, 2);
        assert_eq!(wcnf.card_constrs()[0].sense, CardSense::AtMost);
        assert_eq!(wcnf.n_vars(), 3);
    }

    #[test]
    fn unsat_is_sticky() {
        let mut wcnf = Wcnf::new();
        wcnf.unsat = true;
        wcnf.add_hard_clause(lits(&[1]));
        wcnf.add_soft_clause(lits(&[2]), 1.0).unwrap();
        assert_eq!(wcnf.n_hards(), 0);
        assert_eq!(wcnf.n_softs(), 0);
        // the variable range and unit count must not grow either
        assert_eq!(wcnf.n_vars(), 0);
        assert_eq!(wcnf.n_orig_vars(), 0);
        assert_eq!(wcnf.stats().n_units, 0);
    }
}
