use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use bistro_pos::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    bistro_pos::init_tracing();

    match bistro_pos::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(code = err.code.as_str(), "{}", err.message);
            eprintln!("error {}", err);
            ExitCode::FAILURE
        }
    }
}
