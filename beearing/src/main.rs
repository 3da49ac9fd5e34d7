mod cli;
mod locate;

use clap::Parser;
use cli::{Cli, Commands};
use locate::{run_from_file, run_stream, run_timing};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = TermLogger::init(
        cli.loglevel,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Couldn't set up logging: {}", e);
    }

    let result = match cli.command {
        Commands::FromFile(args) => run_from_file(args),
        Commands::Stream(args) => run_stream(args),
        Commands::Timing(args) => run_timing(args),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
