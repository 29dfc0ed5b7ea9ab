// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - credit ledger and tiered quota enforcement service.
//!
//! This is the binary entry point for the Tally service.

use clap::{Parser, Subcommand};

mod serve;
mod status;

/// Tally - credit ledger and tiered quota enforcement service.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Tally billing service.
    Serve,
    /// Show the status of a running service.
    Status {
        /// Output structured JSON for scripting.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match tally_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        None => {
            println!("tally: use --help for available commands");
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("tally: {err}");
        std::process::exit(1);
    }
}
