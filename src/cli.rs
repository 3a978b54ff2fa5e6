//! # Command Line Interface for the Simplifier Binary

use std::{fmt, io::Write, path::PathBuf};

use clap::{Parser, ValueEnum};
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};
use thresher_core::{ModelEval, MxMode, SimpOptions, WcnfStats};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// The path to the instance file to load. Files with a `.gz` extension
    /// are decompressed transparently.
    inst_path: PathBuf,
    /// Try to harden soft clauses by satisfiability tests
    #[arg(long, default_value_t = Bool::from(SimpOptions::default().harden))]
    wcnf_harden: Bool,
    /// Find and reduce equalities implied by the hard clauses
    #[arg(long, default_value_t = Bool::from(SimpOptions::default().eqs))]
    wcnf_eqs: Bool,
    /// Reduce the formula by hard units
    #[arg(long, default_value_t = Bool::from(SimpOptions::default().units))]
    wcnf_units: Bool,
    /// Which mutexes to detect among the soft clause selectors
    #[arg(long, value_enum, default_value_t = MxMode::default())]
    mx_find_mxes: MxMode,
    /// Memory limit in MiB for the mutex finder's implication cache
    #[arg(long, default_value_t = SimpOptions::default().mx_mem_lim)]
    mx_mem_lim: u64,
    /// Time limit in seconds for mutex detection (0 is no limit)
    #[arg(long, default_value_t = 15.0)]
    mx_cpu_lim: f64,
    /// Keep the original soft clause literals in non-core mutex records
    #[arg(long, default_value_t = Bool::from(SimpOptions::default().mx_seed_originals))]
    mx_seed_mxes: Bool,
    /// Write the simplified WCNF to stdout and exit
    #[arg(long)]
    simplify_only: bool,
    /// Search the hard clauses for a model with the bundled solver and
    /// report the cost of the first one found
    #[arg(long)]
    solve_hards: bool,
    /// Don't print statistics
    #[arg(long)]
    no_print_stats: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Bool {
    /// Turn on feature
    True,
    /// Turn off feature
    False,
}

impl Bool {
    fn is_true(self) -> bool {
        self == Bool::True
    }
}

impl fmt::Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool::True => write!(f, "true"),
            Bool::False => write!(f, "false"),
        }
    }
}

impl From<bool> for Bool {
    fn from(val: bool) -> Self {
        if val {
            Bool::True
        } else {
            Bool::False
        }
    }
}

pub struct Cli {
    pub opts: SimpOptions,
    pub inst_path: PathBuf,
    pub simplify_only: bool,
    pub solve_hards: bool,
    print_stats: bool,
    stdout: BufferWriter,
    stderr: BufferWriter,
}

impl Cli {
    pub fn init() -> Self {
        let args = CliArgs::parse();
        Self {
            opts: SimpOptions {
                harden: args.wcnf_harden.is_true(),
                eqs: args.wcnf_eqs.is_true(),
                units: args.wcnf_units.is_true(),
                find_mxes: args.mx_find_mxes,
                mx_mem_lim: args.mx_mem_lim,
                mx_cpu_lim: (args.mx_cpu_lim > 0.0).then_some(args.mx_cpu_lim),
                mx_seed_originals: args.mx_seed_mxes.is_true(),
            },
            inst_path: args.inst_path,
            simplify_only: args.simplify_only,
            solve_hards: args.solve_hards,
            print_stats: !args.no_print_stats,
            stdout: BufferWriter::stdout(ColorChoice::Auto),
            stderr: BufferWriter::stderr(ColorChoice::Auto),
        }
    }

    pub fn info(&self, msg: &str) -> anyhow::Result<()> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Blue)))?;
        write!(buffer, "c INFO")?;
        buffer.reset()?;
        writeln!(buffer, ": {msg}")?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn error(&self, msg: &str) -> anyhow::Result<()> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        write!(buffer, "c ERROR")?;
        buffer.reset()?;
        writeln!(buffer, ": {msg}")?;
        self.stderr.print(&buffer)?;
        Ok(())
    }

    fn field(buffer: &mut Buffer, name: &str) -> anyhow::Result<()> {
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(buffer, "c {name}")?;
        buffer.reset()?;
        write!(buffer, ": ")?;
        Ok(())
    }

    fn print_stats(&self, heading: &str, stats: &WcnfStats, time: f64) -> anyhow::Result<()> {
        if !self.print_stats {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, "c {heading}")?;
        buffer.reset()?;
        Self::field(&mut buffer, "hard clauses")?;
        writeln!(
            buffer,
            "{} ({} lits, {} units)",
            stats.n_hards, stats.n_hard_lits, stats.n_units
        )?;
        Self::field(&mut buffer, "soft clauses")?;
        writeln!(buffer, "{} ({} lits)", stats.n_softs, stats.n_soft_lits)?;
        Self::field(&mut buffer, "variables")?;
        writeln!(buffer, "{}", stats.n_vars)?;
        Self::field(&mut buffer, "soft weight (+ base cost)")?;
        writeln!(buffer, "{} (+ {})", stats.total_cls_wt, stats.base_cost)?;
        Self::field(&mut buffer, "distinct weights")?;
        writeln!(
            buffer,
            "{} (min {}, max {}, mean {:.4}, std dev {:.4})",
            stats.n_diff_wts,
            stats.wt_min,
            stats.wt_max,
            stats.wt_mean,
            stats.wt_var.sqrt()
        )?;
        if stats.n_mxes > 0 {
            Self::field(&mut buffer, "mutexes")?;
            writeln!(buffer, "{}", stats.n_mxes)?;
        }
        Self::field(&mut buffer, "time")?;
        writeln!(buffer, "{time:.4}s")?;
        if stats.unsat {
            buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
            writeln!(buffer, "c hard clauses are contradictory")?;
            buffer.reset()?;
        }
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_formula_stats(&self, stats: &WcnfStats, parse_time: f64) -> anyhow::Result<()> {
        self.print_stats("Instance", stats, parse_time)
    }

    pub fn print_simp_stats(&self, stats: &WcnfStats, simp_time: f64) -> anyhow::Result<()> {
        self.print_stats("After simplification", stats, simp_time)
    }

    pub fn print_model_eval(&self, eval: &ModelEval) -> anyhow::Result<()> {
        let mut buffer = self.stdout.buffer();
        Self::field(&mut buffer, "model cost")?;
        writeln!(buffer, "{} ({} falsified softs)", eval.cost, eval.n_false_softs)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }
}
