use clap::Parser;
use confiture::cmd::{self, Cli};
use confiture::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = cmd::run(cli) {
        eprintln!("{}", error::render(&e));
        std::process::exit(error::exit_code_for(&e));
    }
}
