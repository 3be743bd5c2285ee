use anyhow::Result;
use clap::Parser;
use coveron::cli::{Cli, Commands};
use coveron::commands::{handle_instrument, handle_strip, init_config, StripConfig};
use coveron::observability::{init_logging, install_panic_hook};

/// Main thread stack size (16MB for deeply nested syntax trees)
const MAIN_STACK_SIZE: usize = 16 * 1024 * 1024;

fn main() -> Result<()> {
    install_panic_hook();

    let worker = std::thread::Builder::new()
        .name("coveron-main".to_string())
        .stack_size(MAIN_STACK_SIZE)
        .spawn(run)?;
    match worker.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("coveron terminated after a panic"),
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Instrument(args) => {
            init_logging(args.verbosity);
            handle_instrument(args)?;
            Ok(())
        }
        Commands::Strip {
            file,
            output,
            cpp,
            config,
        } => {
            init_logging(0);
            handle_strip(StripConfig {
                file,
                output,
                cpp,
                config,
            })
        }
        Commands::Init { force } => init_config(force),
    }
}
