//! # Basic Types
//!
//! Variables, literals, ternary values and assignments shared by the formula
//! store, the preprocessing passes and the SAT oracle interface.

use std::{fmt, ops};

use thiserror::Error;

/// The hash map used throughout the crate
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Clause weights. Soft clause weights are positive; the store tracks whether
/// all weights seen so far are integral.
pub type Weight = f64;

/// Type representing boolean variables. Variable indexing starts from 0 and
/// the maximum index is `(u32::MAX - 1) / 2` so that literals fit in a `u32`
/// as well.
#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy)]
#[repr(transparent)]
pub struct Var {
    idx: u32,
}

impl Var {
    /// The maximum index that can be represented
    pub const MAX_IDX: u32 = (u32::MAX - 1) / 2;

    /// Creates a new variable with a given index
    ///
    /// # Panics
    ///
    /// If `idx > Var::MAX_IDX`.
    #[must_use]
    pub const fn new(idx: u32) -> Var {
        assert!(idx <= Var::MAX_IDX, "variable index too high");
        Var { idx }
    }

    /// Creates a literal with the given negation from the variable
    #[inline]
    #[must_use]
    pub const fn lit(self, negated: bool) -> Lit {
        Lit::new(self.idx, negated)
    }

    /// Creates a literal that is not negated
    #[inline]
    #[must_use]
    pub const fn pos_lit(self) -> Lit {
        Lit::new(self.idx, false)
    }

    /// Creates a negated literal
    #[inline]
    #[must_use]
    pub const fn neg_lit(self) -> Lit {
        Lit::new(self.idx, true)
    }

    /// Returns the index of the variable as a `usize` for easy indexing of
    /// data structures
    #[inline]
    #[must_use]
    pub fn idx(self) -> usize {
        self.idx as usize
    }

    /// Returns the 32-bit index of the variable
    #[inline]
    #[must_use]
    pub fn idx32(self) -> u32 {
        self.idx
    }
}

/// Incrementing variables
impl ops::Add<u32> for Var {
    type Output = Var;

    fn add(self, rhs: u32) -> Self::Output {
        let idx = self.idx + rhs;
        debug_assert!(idx <= Var::MAX_IDX, "variable index overflow");
        Var { idx }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.idx)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.idx)
    }
}

/// More easily creates variables. Mainly used in tests.
#[macro_export]
macro_rules! var {
    ($v:expr) => {
        $crate::types::Var::new($v)
    };
}

/// Type representing literals, possibly negated boolean variables.
///
/// # Representation in Memory
///
/// The representation is `idx << 1` with the last bit set iff the literal is
/// negated. [`Lit::lidx`] exposes this code so literals can key dense arrays
/// with the two literals of a variable next to each other.
#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy)]
#[repr(transparent)]
pub struct Lit {
    lidx: u32,
}

impl Lit {
    /// Creates a new (possibly negated) literal with a given variable index
    ///
    /// # Panics
    ///
    /// If `idx > Var::MAX_IDX`.
    #[must_use]
    pub const fn new(idx: u32, negated: bool) -> Lit {
        assert!(idx <= Var::MAX_IDX, "variable index too high");
        Lit {
            lidx: (idx << 1) + if negated { 1 } else { 0 },
        }
    }

    /// Creates a new positive literal with a given variable index
    #[inline]
    #[must_use]
    pub const fn positive(idx: u32) -> Lit {
        Lit::new(idx, false)
    }

    /// Creates a new negated literal with a given variable index
    #[inline]
    #[must_use]
    pub const fn negative(idx: u32) -> Lit {
        Lit::new(idx, true)
    }

    /// Creates a literal from a DIMACS integer value (1-based, negative value
    /// means negated)
    ///
    /// # Errors
    ///
    /// If the value is zero or the index too high.
    pub fn from_dimacs(val: i32) -> Result<Lit, TypeError> {
        if val == 0 {
            return Err(TypeError::DimacsZero);
        }
        let idx = val.unsigned_abs() - 1;
        if idx > Var::MAX_IDX {
            return Err(TypeError::IdxTooHigh(idx, Var::MAX_IDX));
        }
        Ok(Lit::new(idx, val < 0))
    }

    /// Converts the literal to a DIMACS integer value (`idx + 1`, negative if
    /// the literal is negated)
    ///
    /// # Panics
    ///
    /// If the variable index does not fit in an `i32`.
    #[must_use]
    pub fn to_dimacs(self) -> i32 {
        let idx = i32::try_from(self.vidx32() + 1).expect("variable index too high for DIMACS");
        if self.is_neg() {
            -idx
        } else {
            idx
        }
    }

    /// Gets the variable index of the literal
    #[inline]
    #[must_use]
    pub fn vidx(self) -> usize {
        (self.lidx >> 1) as usize
    }

    /// Gets the 32-bit variable index of the literal
    #[inline]
    #[must_use]
    pub fn vidx32(self) -> u32 {
        self.lidx >> 1
    }

    /// Gets the literal code for indexing dense data structures
    #[inline]
    #[must_use]
    pub fn lidx(self) -> usize {
        self.lidx as usize
    }

    /// Gets the variable the literal refers to
    #[inline]
    #[must_use]
    pub fn var(self) -> Var {
        Var::new(self.vidx32())
    }

    /// True iff the literal is positive
    #[inline]
    #[must_use]
    pub fn is_pos(self) -> bool {
        (self.lidx & 1) == 0
    }

    /// True iff the literal is negated
    #[inline]
    #[must_use]
    pub fn is_neg(self) -> bool {
        (self.lidx & 1) == 1
    }
}

/// Negating literals with the `!` operator
impl ops::Not for Lit {
    type Output = Lit;

    #[inline]
    fn not(self) -> Lit {
        Lit {
            lidx: self.lidx ^ 1,
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.is_neg() { "~" } else { "" }, self.var())
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.is_neg() { "~" } else { "" }, self.var())
    }
}

/// More easily creates literals. Mainly used in tests.
#[macro_export]
macro_rules! lit {
    ($l:expr) => {
        $crate::types::Lit::positive($l)
    };
}

/// Ternary value assigned to a literal or variable
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TernaryVal {
    /// Positive assignment
    True,
    /// Negative assignment
    False,
    /// No assignment
    #[default]
    Undef,
}

impl TernaryVal {
    /// Converts the value to a [`bool`] with a default for [`TernaryVal::Undef`]
    #[must_use]
    pub fn to_bool_with_def(self, def: bool) -> bool {
        match self {
            TernaryVal::True => true,
            TernaryVal::False => false,
            TernaryVal::Undef => def,
        }
    }
}

impl From<bool> for TernaryVal {
    fn from(value: bool) -> Self {
        if value {
            return TernaryVal::True;
        }
        TernaryVal::False
    }
}

impl ops::Not for TernaryVal {
    type Output = TernaryVal;

    fn not(self) -> Self::Output {
        match self {
            TernaryVal::True => TernaryVal::False,
            TernaryVal::False => TernaryVal::True,
            TernaryVal::Undef => TernaryVal::Undef,
        }
    }
}

impl fmt::Display for TernaryVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TernaryVal::True => write!(f, "1"),
            TernaryVal::False => write!(f, "0"),
            TernaryVal::Undef => write!(f, "_"),
        }
    }
}

/// An assignment of truth values to variables
#[derive(Clone, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Assignment {
    assignment: Vec<TernaryVal>,
}

impl Assignment {
    /// Gets the value the assignment gives to a variable. Variables beyond the
    /// assignment are [`TernaryVal::Undef`].
    #[must_use]
    pub fn var_value(&self, var: Var) -> TernaryVal {
        if var.idx() >= self.assignment.len() {
            TernaryVal::Undef
        } else {
            self.assignment[var.idx()]
        }
    }

    /// Same as [`Assignment::var_value`], but for literals
    #[must_use]
    pub fn lit_value(&self, lit: Lit) -> TernaryVal {
        if lit.is_neg() {
            !self.var_value(lit.var())
        } else {
            self.var_value(lit.var())
        }
    }

    /// True iff the assignment satisfies the literal
    #[must_use]
    pub fn satisfies(&self, lit: Lit) -> bool {
        self.lit_value(lit) == TernaryVal::True
    }

    /// Assigns a value to a variable, growing the assignment if needed
    pub fn assign_var(&mut self, var: Var, value: TernaryVal) {
        if self.assignment.len() < var.idx() + 1 {
            self.assignment.resize(var.idx() + 1, TernaryVal::Undef);
        }
        self.assignment[var.idx()] = value;
    }

    /// Assigns a literal to true
    pub fn assign_lit(&mut self, lit: Lit) {
        self.assign_var(lit.var(), TernaryVal::from(lit.is_pos()));
    }

    /// Gets the number of variables in the assignment
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    /// Checks if the assignment is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }
}

impl From<Vec<TernaryVal>> for Assignment {
    fn from(assignment: Vec<TernaryVal>) -> Self {
        Self { assignment }
    }
}

impl FromIterator<TernaryVal> for Assignment {
    fn from_iter<T: IntoIterator<Item = TernaryVal>>(iter: T) -> Self {
        Self {
            assignment: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<bool> for Assignment {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        iter.into_iter().map(TernaryVal::from).collect()
    }
}

impl FromIterator<Lit> for Assignment {
    fn from_iter<T: IntoIterator<Item = Lit>>(iter: T) -> Self {
        let mut assignment = Assignment::default();
        iter.into_iter().for_each(|l| assignment.assign_lit(l));
        assignment
    }
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.assignment.iter().try_for_each(|tv| write!(f, "{tv}"))
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.assignment.iter().try_for_each(|tv| write!(f, "{tv}"))
    }
}

/// Errors related to basic types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// The requested index is too high; contains the requested and the
    /// maximum index
    #[error("index {0} is too high (maximum {1})")]
    IdxTooHigh(u32, u32),
    /// DIMACS literal is zero
    #[error("zero is an invalid DIMACS literal")]
    DimacsZero,
}

#[cfg(test)]
mod tests {
    use super::{Assignment, Lit, TernaryVal, Var};

    #[test]
    fn lit_code_layout() {
        let lit = Lit::new(5, true);
        assert_eq!(lit.lidx(), 0b1011);
        assert_eq!(lit.vidx(), 5);
        assert!(lit.is_neg());
        assert_eq!((!lit).lidx(), 0b1010);
        assert_eq!(!!lit, lit);
    }

    #[test]
    fn lit_var_round_trip() {
        let var = Var::new(5);
        assert_eq!(var.pos_lit().var(), var);
        assert_eq!(var.neg_lit().var(), var);
        assert_ne!(var.pos_lit(), var.neg_lit());
    }

    #[test]
    fn dimacs_conversion() {
        assert_eq!(Lit::from_dimacs(42).unwrap(), Lit::positive(41));
        assert_eq!(Lit::from_dimacs(-42).unwrap(), Lit::negative(41));
        assert_eq!(Lit::negative(41).to_dimacs(), -42);
        assert!(Lit::from_dimacs(0).is_err());
    }

    #[test]
    fn lit_order_groups_complements() {
        let mut lits = vec![
            Lit::positive(3),
            Lit::negative(1),
            Lit::positive(1),
            Lit::negative(3),
        ];
        lits.sort_unstable();
        assert_eq!(
            lits,
            vec![
                Lit::positive(1),
                Lit::negative(1),
                Lit::positive(3),
                Lit::negative(3),
            ]
        );
    }

    #[test]
    fn assignment_values() {
        let assign = Assignment::from(vec![TernaryVal::True, TernaryVal::False]);
        assert_eq!(assign.lit_value(Lit::positive(0)), TernaryVal::True);
        assert_eq!(assign.lit_value(Lit::negative(0)), TernaryVal::False);
        assert_eq!(assign.lit_value(Lit::negative(1)), TernaryVal::True);
        assert_eq!(assign.var_value(Var::new(7)), TernaryVal::Undef);
    }

    #[test]
    fn assignment_from_lits() {
        let assign: Assignment = vec![Lit::positive(0), Lit::negative(2)]
            .into_iter()
            .collect();
        assert!(assign.satisfies(Lit::positive(0)));
        assert!(assign.satisfies(Lit::negative(2)));
        assert_eq!(assign.var_value(Var::new(1)), TernaryVal::Undef);
    }
}
