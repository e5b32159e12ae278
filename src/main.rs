mod cli;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    // Session log (overwrites previous run's log)
    fundus_stretch::logger::init();

    let args = cli::CliArgs::parse();
    cli::run(args)
}
