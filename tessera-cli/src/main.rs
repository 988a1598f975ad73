//! ## tessera-cli
//! **`tessera` binary**
//!
//! - `serve`: run the engine with the socket subsystem and an echo handler
//!   until Ctrl-C.
//! - `send`: connect, send one message, print the first reply.

use std::process::ExitCode;

use clap::Parser;

mod commands;
mod error;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match commands::run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
