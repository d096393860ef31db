use clap::Parser;
use jgoogle::cli::{self, Cli};
use jgoogle::error::exit_code_for;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Initialize tracing subscriber
    cli::init_tracing(args.verbose);

    if let Err(err) = cli::run(args).await {
        eprintln!("error: {:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}
