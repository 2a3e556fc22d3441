//! DreamPOS CLI - Database migrations and employee provisioning.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! dreampos-cli migrate
//!
//! # Create an employee (password read from DREAMPOS_NEW_PASSWORD)
//! DREAMPOS_NEW_PASSWORD=... dreampos-cli employee create \
//!     -u jdoe --first-name Jane --last-name Doe -b 1 -r cashier
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "dreampos-cli")]
#[command(author, version, about = "DreamPOS CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage employees
    Employee {
        #[command(subcommand)]
        action: EmployeeAction,
    },
}

#[derive(Subcommand)]
enum EmployeeAction {
    /// Create a new employee login
    Create {
        /// Login name
        #[arg(short, long)]
        username: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Business the employee works for
        #[arg(short, long)]
        business_id: i64,

        /// Role, repeatable (`cashier`, `receptionist`, `manager`, `clerk`, `supplier`)
        #[arg(short, long = "role", required = true)]
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Employee { action } => match action {
            EmployeeAction::Create {
                username,
                first_name,
                last_name,
                business_id,
                roles,
            } => {
                commands::employee::create(&commands::employee::CreateArgs {
                    username,
                    first_name,
                    last_name,
                    business_id,
                    roles,
                })
                .await?;
            }
        },
    }
    Ok(())
}
