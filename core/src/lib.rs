//! # Thresher Core
//!
//! A weighted partial MaxSAT formula store and preprocessing engine. Given a
//! weighted CNF of hard clauses and positively weighted soft clauses, the
//! engine applies a pipeline of semantics-preserving simplifications
//! (transition-weight hardening, unit and equality collapsing, duplicate
//! removal, mutex discovery among soft clause selectors, variable remapping)
//! and exposes both the simplified instance and the bookkeeping needed to
//! lift solutions back to the input variable space.
//!
//! The engine drives a SAT solver through the narrow [`SatOracle`]
//! interface; [`PropSolver`] is the bundled implementation.

pub mod fio;
pub mod options;
pub mod oracle;
pub mod packed;
pub mod types;
pub mod wcnf;

mod prepro;

pub use options::{MxMode, SimpOptions};
pub use oracle::{PropSolver, SatOracle};
pub use packed::PackedVecs;
pub use types::{Assignment, Lit, TernaryVal, Var, Weight};
pub use wcnf::{
    CardConstr, CardSense, ModelEval, MsType, ScMx, Wcnf, WcnfError, WcnfStats,
};
