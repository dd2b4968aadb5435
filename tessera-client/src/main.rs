//! tessera client - CLI for the shared-object toolkit

use tessera_utils::{init_logging_with_config, LogConfig, Result};

mod cli;
mod commands;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    init_logging_with_config(LogConfig::client())?;
    tracing::debug!("CLI args: {:?}", args);

    match commands::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}
