//! # Options
//!
//! Configuration for the simplification pipeline. The defaults match the
//! behavior the engine was tuned with: units, equalities and hardening on,
//! non-core mutex discovery with a 15 second / 1.5 GiB budget.

use std::fmt;

/// Which kinds of mutexes to look for among the soft clause selectors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum MxMode {
    /// Don't look for mutexes
    None,
    /// Only look for core mutexes (at most one of the softs falsified)
    Core,
    /// Only look for non-core mutexes (at most one of the softs satisfied)
    #[default]
    NonCore,
    /// Look for both, non-core mutexes first
    Both,
}

impl MxMode {
    /// Whether core mutexes are searched for
    #[must_use]
    pub fn find_cores(self) -> bool {
        matches!(self, MxMode::Core | MxMode::Both)
    }

    /// Whether non-core mutexes are searched for
    #[must_use]
    pub fn find_non_cores(self) -> bool {
        matches!(self, MxMode::NonCore | MxMode::Both)
    }
}

impl fmt::Display for MxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MxMode::None => write!(f, "none"),
            MxMode::Core => write!(f, "core"),
            MxMode::NonCore => write!(f, "non-core"),
            MxMode::Both => write!(f, "both"),
        }
    }
}

/// Configuration options for [`Wcnf::simplify`](crate::Wcnf::simplify)
#[derive(Clone, Copy, Debug)]
pub struct SimpOptions {
    /// Try to harden soft clauses by satisfiability tests over the transition
    /// weights
    pub harden: bool,
    /// Find and collapse equalities implied by the hard clauses
    pub eqs: bool,
    /// Reduce the formula by hard units
    pub units: bool,
    /// Which mutexes to discover among soft clause selectors
    pub find_mxes: MxMode,
    /// Memory budget in MiB for the mutex finder's cached implication sets
    pub mx_mem_lim: u64,
    /// Wall clock budget in seconds for the mutex finder; `None` is unlimited
    pub mx_cpu_lim: Option<f64>,
    /// Keep the original soft clause literals in non-core mutex records so
    /// downstream solvers can seed constraints from them
    pub mx_seed_originals: bool,
}

impl Default for SimpOptions {
    fn default() -> Self {
        SimpOptions {
            harden: true,
            eqs: true,
            units: true,
            find_mxes: MxMode::default(),
            mx_mem_lim: 1536,
            mx_cpu_lim: Some(15.0),
            mx_seed_originals: true,
        }
    }
}

impl SimpOptions {
    /// Options with every technique disabled; `simplify` then only recomputes
    /// statistics and remaps variables
    #[must_use]
    pub fn none() -> Self {
        SimpOptions {
            harden: false,
            eqs: false,
            units: false,
            find_mxes: MxMode::None,
            ..Default::default()
        }
    }

    /// Options with every technique enabled
    #[must_use]
    pub fn all() -> Self {
        SimpOptions {
            find_mxes: MxMode::Both,
            ..Default::default()
        }
    }
}
