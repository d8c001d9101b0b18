//! ovnsync CLI
//!
//! Command-line tools for checking how a client will see an OVN database.
//!
//! # Commands
//!
//! - `negotiate` - Show the tables and monitor requests a client would use
//! - `replay` - Run a transaction file against an in-memory store and show the mirror
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ovnsync command-line tools.
#[derive(Parser)]
#[command(name = "ovnsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to an .ovsschema file
    #[arg(global = true, short, long)]
    schema: Option<PathBuf>,

    /// Database (nb, sb, OVN_Northbound, OVN_Southbound); defaults to the schema's name
    #[arg(global = true, short, long)]
    db: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the negotiated tables and monitor requests
    Negotiate {
        /// Restrict to a table; repeat for several. `NAME=col1,col2` names columns.
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay a JSON array of operations as one transaction
    Replay {
        /// Path to the operations file
        #[arg(short, long)]
        ops: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Negotiate { tables, format } => {
            let schema = cli.schema.ok_or("Schema path required for negotiate")?;
            commands::negotiate::run(&schema, cli.db.as_deref(), &tables, &format)?;
        }
        Commands::Replay { ops, format } => {
            let schema = cli.schema.ok_or("Schema path required for replay")?;
            commands::replay::run(&schema, cli.db.as_deref(), &ops, &format)?;
        }
        Commands::Version => {
            println!("ovnsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
