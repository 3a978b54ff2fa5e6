//! # SAT Oracle Interface
//!
//! The preprocessing passes use a SAT solver as a subroutine through the
//! narrow [`SatOracle`] interface. A fresh oracle is constructed for every
//! pipeline phase and dropped at phase end, so no state leaks between phases.
//!
//! [`PropSolver`] is the bundled implementation: a two-watched-literal
//! propagation engine with a budgeted DPLL search on top. It is complete but
//! makes no claim to be competitive; any conflict-driven backend can be
//! slotted in by implementing the trait.

use std::mem;

use crate::types::{Assignment, Lit, TernaryVal, Var};

/// The interface the simplification pipeline requires of a SAT solver.
///
/// `Undef` results are always treated conservatively by the callers: a solver
/// that cannot answer within its budget simply causes less simplification.
pub trait SatOracle {
    /// Adds a clause over the oracle's variables. May detect unsatisfiability
    /// immediately; adding to an unsatisfiable oracle is a no-op.
    fn add_clause(&mut self, lits: &[Lit]);
    /// True iff the clauses added so far have been found contradictory
    fn theory_is_unsat(&self) -> bool;
    /// Runs unit propagation at the root level
    fn unit_propagate(&mut self);
    /// Gets all literals forced at the root level
    fn forced_lits(&self) -> Vec<Lit>;
    /// Gets the root-level value of a literal, `Undef` if it is not fixed
    fn fixed_value(&self, lit: Lit) -> TernaryVal;
    /// Collects into `out` the literals implied by assuming `lit`, excluding
    /// `lit` itself and anything already fixed. If `lit` is already fixed or
    /// assuming it yields a conflict, `out` is left empty.
    fn find_implications(&mut self, lit: Lit, out: &mut Vec<Lit>);
    /// Searches for a satisfying assignment, giving up once more than
    /// `budget` propagations have been performed. Returns `Undef` on budget
    /// exhaustion.
    fn solve_with_prop_budget(&mut self, budget: u64) -> TernaryVal;
}

/// Looks up the value of a literal in a variable-indexed value array
#[inline]
fn lit_value(values: &[TernaryVal], lit: Lit) -> TernaryVal {
    match values.get(lit.vidx()) {
        None | Some(TernaryVal::Undef) => TernaryVal::Undef,
        Some(&val) => {
            if lit.is_neg() {
                !val
            } else {
                val
            }
        }
    }
}

/// A bounded SAT solver built on two-watched-literal unit propagation.
///
/// Decisions use the lowest unassigned variable and chronological
/// backtracking, which keeps the search exact while the propagation budget
/// bounds the effort.
#[derive(Debug, Default)]
pub struct PropSolver {
    clauses: Vec<Vec<Lit>>,
    /// Watch lists keyed by [`Lit::lidx`]: clauses in which the literal is
    /// one of the two watched literals
    watches: Vec<Vec<usize>>,
    values: Vec<TernaryVal>,
    /// Decision level a variable was assigned at; only meaningful while the
    /// variable is assigned
    levels: Vec<u32>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
    ok: bool,
    props: u64,
    model: Option<Assignment>,
}

impl PropSolver {
    /// Creates a new, empty solver
    #[must_use]
    pub fn new() -> Self {
        PropSolver {
            ok: true,
            ..Default::default()
        }
    }

    /// Gets the model found by the last successful
    /// [`SatOracle::solve_with_prop_budget`] call
    #[must_use]
    pub fn model(&self) -> Option<&Assignment> {
        self.model.as_ref()
    }

    /// Gets the number of propagations performed so far
    #[must_use]
    pub fn n_props(&self) -> u64 {
        self.props
    }

    fn ensure_var(&mut self, var: Var) {
        if var.idx() >= self.values.len() {
            self.values.resize(var.idx() + 1, TernaryVal::Undef);
            self.levels.resize(var.idx() + 1, 0);
            self.watches.resize(2 * (var.idx() + 1), Vec::new());
        }
    }

    fn assign(&mut self, lit: Lit) {
        debug_assert_eq!(lit_value(&self.values, lit), TernaryVal::Undef);
        self.values[lit.vidx()] = TernaryVal::from(lit.is_pos());
        self.levels[lit.vidx()] = self.trail_lim.len() as u32;
        self.trail.push(lit);
    }

    fn enqueue(&mut self, lit: Lit) -> bool {
        match lit_value(&self.values, lit) {
            TernaryVal::True => true,
            TernaryVal::False => false,
            TernaryVal::Undef => {
                self.assign(lit);
                true
            }
        }
    }

    /// Propagates all pending trail entries; returns the index of a
    /// conflicting clause if one is found
    fn propagate(&mut self) -> Option<usize> {
        while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            self.props += 1;
            let false_lit = !p;
            let mut ws = mem::take(&mut self.watches[false_lit.lidx()]);
            let mut i = 0;
            'clauses: while i < ws.len() {
                let ci = ws[i];
                {
                    let cl = &mut self.clauses[ci];
                    if cl[0] == false_lit {
                        cl.swap(0, 1);
                    }
                    debug_assert_eq!(cl[1], false_lit);
                    if lit_value(&self.values, cl[0]) == TernaryVal::True {
                        i += 1;
                        continue 'clauses;
                    }
                    // look for a replacement watch
                    for k in 2..cl.len() {
                        if lit_value(&self.values, cl[k]) != TernaryVal::False {
                            cl.swap(1, k);
                            let new_watch = cl[1];
                            self.watches[new_watch.lidx()].push(ci);
                            ws.swap_remove(i);
                            continue 'clauses;
                        }
                    }
                }
                // no replacement: the clause is unit or conflicting
                let first = self.clauses[ci][0];
                match lit_value(&self.values, first) {
                    TernaryVal::False => {
                        self.watches[false_lit.lidx()] = ws;
                        self.qhead = self.trail.len();
                        return Some(ci);
                    }
                    TernaryVal::Undef => {
                        self.assign(first);
                        i += 1;
                    }
                    TernaryVal::True => unreachable!(),
                }
            }
            self.watches[false_lit.lidx()] = ws;
        }
        None
    }

    /// Undoes all assignments above the given decision level
    fn cancel_until(&mut self, level: u32) {
        if self.trail_lim.len() as u32 <= level {
            return;
        }
        let lim = self.trail_lim[level as usize];
        while self.trail.len() > lim {
            let lit = self.trail.pop().unwrap();
            self.values[lit.vidx()] = TernaryVal::Undef;
        }
        self.trail_lim.truncate(level as usize);
        self.qhead = self.trail.len();
    }
}

impl SatOracle for PropSolver {
    fn add_clause(&mut self, lits: &[Lit]) {
        if !self.ok {
            return;
        }
        debug_assert!(self.trail_lim.is_empty());
        for &l in lits {
            self.ensure_var(l.var());
        }
        let mut cl = lits.to_vec();
        cl.sort_unstable();
        cl.dedup();
        if cl.windows(2).any(|w| w[0] == !w[1]) {
            return;
        }
        if cl.iter().any(|&l| lit_value(&self.values, l) == TernaryVal::True) {
            return;
        }
        cl.retain(|&l| lit_value(&self.values, l) == TernaryVal::Undef);
        match cl.len() {
            0 => self.ok = false,
            1 => {
                if !self.enqueue(cl[0]) {
                    self.ok = false;
                }
            }
            _ => {
                let ci = self.clauses.len();
                self.watches[cl[0].lidx()].push(ci);
                self.watches[cl[1].lidx()].push(ci);
                self.clauses.push(cl);
            }
        }
    }

    fn theory_is_unsat(&self) -> bool {
        !self.ok
    }

    fn unit_propagate(&mut self) {
        if !self.ok {
            return;
        }
        debug_assert!(self.trail_lim.is_empty());
        if self.propagate().is_some() {
            self.ok = false;
        }
    }

    fn forced_lits(&self) -> Vec<Lit> {
        let end = self.trail_lim.first().copied().unwrap_or(self.trail.len());
        self.trail[..end].to_vec()
    }

    fn fixed_value(&self, lit: Lit) -> TernaryVal {
        if lit.vidx() >= self.values.len() || self.levels[lit.vidx()] != 0 {
            return TernaryVal::Undef;
        }
        lit_value(&self.values, lit)
    }

    fn find_implications(&mut self, lit: Lit, out: &mut Vec<Lit>) {
        out.clear();
        if !self.ok {
            return;
        }
        self.ensure_var(lit.var());
        if lit_value(&self.values, lit) != TernaryVal::Undef {
            return;
        }
        debug_assert!(self.trail_lim.is_empty());
        self.trail_lim.push(self.trail.len());
        self.assign(lit);
        if self.propagate().is_none() {
            out.extend_from_slice(&self.trail[self.trail_lim[0] + 1..]);
        }
        self.cancel_until(0);
    }

    fn solve_with_prop_budget(&mut self, budget: u64) -> TernaryVal {
        if !self.ok {
            return TernaryVal::False;
        }
        debug_assert!(self.trail_lim.is_empty());
        if self.propagate().is_some() {
            self.ok = false;
            return TernaryVal::False;
        }
        let start = self.props;
        let mut decisions: Vec<(Lit, bool)> = Vec::new();
        loop {
            if self.props - start > budget {
                self.cancel_until(0);
                return TernaryVal::Undef;
            }
            if self.propagate().is_some() {
                // flip the deepest decision whose complement is untried
                let flipped = loop {
                    let Some((dec, tried)) = decisions.pop() else {
                        break false;
                    };
                    self.cancel_until(decisions.len() as u32);
                    if !tried {
                        self.trail_lim.push(self.trail.len());
                        decisions.push((!dec, true));
                        self.assign(!dec);
                        break true;
                    }
                };
                if !flipped {
                    self.cancel_until(0);
                    self.ok = false;
                    return TernaryVal::False;
                }
                continue;
            }
            match self.values.iter().position(|&v| v == TernaryVal::Undef) {
                None => {
                    self.model = Some(Assignment::from(self.values.clone()));
                    self.cancel_until(0);
                    return TernaryVal::True;
                }
                Some(v) => {
                    let dec = Lit::positive(v as u32);
                    self.trail_lim.push(self.trail.len());
                    decisions.push((dec, false));
                    self.assign(dec);
                }
            }
        }
    }
}
