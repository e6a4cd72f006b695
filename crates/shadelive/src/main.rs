mod cli;
mod config;
mod osc;
mod paths;
mod run;
mod watch;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    run::run(cli)
}
