use std::error::Error;
use std::io::{self, Write};

use chm_sim::commands::{
    run::{self, RunArgs},
    simulate::{self, SimulateArgs},
};
use chm_sim::logging::{init_logging, LogFormat};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chm-sim", about = "Character-history MCMC CLI")]
struct Cli {
    /// Format of log lines written to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Human, global = true)]
    log_format: LogFormat,
    /// Default filter when CHM_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run Metropolis-coupled inference over the histories of a scenario.
    Run(RunArgs),
    /// Forward-simulate histories on the scenario tree.
    Simulate(SimulateArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_format, &cli.log_level);
    let mut stdout = io::stdout().lock();
    match cli.command {
        Command::Run(args) => {
            let report = run::run(&args)?;
            report.summary.print_operator_summary(&mut io::stderr().lock())?;
            serde_json::to_writer_pretty(&mut stdout, &report.summary)?;
        }
        Command::Simulate(args) => {
            let report = simulate::run(&args)?;
            serde_json::to_writer_pretty(&mut stdout, &report)?;
        }
    }
    writeln!(stdout)?;
    Ok(())
}

