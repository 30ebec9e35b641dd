use std::process::ExitCode;
use tracing::{error, info};

mod cli;
mod crawler;
mod error;
mod http;
mod storage;
mod utils;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = cli::parse_args();

    // Initialize logging
    if let Err(e) = utils::init_logging(args.verbose, args.log_file.clone()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting jobsearcher crawler v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(code) => {
            info!("Command completed");
            code
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
