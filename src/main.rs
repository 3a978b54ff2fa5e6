use std::io;

use cpu_time::ProcessTime;
use thresher_core::{PropSolver, SatOracle, TernaryVal, Wcnf};

mod cli;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::init();
    if let Err(err) = sub_main(&cli) {
        cli.error(&format!("{err:#}"))?;
        std::process::exit(1);
    }
    Ok(())
}

fn sub_main(cli: &Cli) -> anyhow::Result<()> {
    cli.info(&format!("loading instance {}", cli.inst_path.display()))?;
    let mut wcnf = Wcnf::from_dimacs_path(&cli.inst_path)?;
    cli.print_formula_stats(&wcnf.stats(), wcnf.parse_time())?;

    let start = ProcessTime::now();
    wcnf.simplify(&cli.opts);
    let simp_time = start.elapsed().as_secs_f64();
    cli.print_simp_stats(&wcnf.stats(), simp_time)?;

    if cli.simplify_only {
        let stdout = io::stdout();
        wcnf.write_dimacs(&mut stdout.lock())?;
        return Ok(());
    }

    if cli.solve_hards {
        if wcnf.is_unsat() {
            cli.info("skipping solving, the hard clauses are contradictory")?;
            return Ok(());
        }
        let mut solver = PropSolver::new();
        for cls in wcnf.hards() {
            solver.add_clause(cls);
        }
        match solver.solve_with_prop_budget(u64::MAX) {
            TernaryVal::True => {
                let model = solver
                    .model()
                    .expect("a sat result must come with a model")
                    .clone();
                let eval = wcnf.check_model(&model)?;
                cli.print_model_eval(&eval)?;
            }
            _ => cli.info("bundled solver found the hard clauses unsatisfiable")?,
        }
    }
    Ok(())
}
