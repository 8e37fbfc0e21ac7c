//! Shopkeep CLI - schema bootstrap and day-to-day store management.
//!
//! # Usage
//!
//! ```bash
//! # Create any missing tables on the configured backend
//! shopkeep init-db
//!
//! # Register a user (password is hashed with Argon2)
//! shopkeep user create -e buyer@example.com -n "Buyer" -p 'long passphrase'
//!
//! # Inspect data as JSON
//! shopkeep product list
//! shopkeep order list --user 3
//!
//! # Revoke a refresh-token session
//! shopkeep session revoke 0b6f3c1e-...
//! ```
//!
//! The backend (`orm` or `sql`) comes from `SHOPKEEP_STORAGE_BACKEND`; see
//! `shopkeep_store::config` for every variable.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::CommandError;

const DEFAULT_LOG_FILTER: &str = "shopkeep_cli=info,shopkeep_store=info";

#[derive(Parser)]
#[command(name = "shopkeep")]
#[command(author, version, about = "Shopkeep store management CLI")]
struct Cli {
    /// Abort the command if it runs longer than this many seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any missing tables (idempotent)
    InitDb,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage the product catalog
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Inspect and delete orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Inspect and revoke sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Password (min 8 characters)
        #[arg(short, long)]
        password: String,

        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },
    /// List all users
    List,
}

#[derive(Subcommand)]
enum ProductAction {
    /// Add a product
    Add {
        #[arg(short, long)]
        name: String,

        /// Unit price, e.g. 9.99
        #[arg(short, long)]
        price: Decimal,

        #[arg(short, long, default_value_t = 0)]
        stock: i32,

        #[arg(short, long, default_value = "")]
        category: String,

        /// Image URL
        #[arg(long, default_value = "")]
        image: String,

        #[arg(long, default_value = "")]
        description: String,
    },
    /// List all products
    List,
    /// Delete a product
    Delete { id: i32 },
}

#[derive(Subcommand)]
enum OrderAction {
    /// List orders with their items
    List {
        /// Only orders placed by this user id
        #[arg(short, long)]
        user: Option<i32>,
    },
    /// Show one order
    Show { id: i32 },
    /// Delete an order and its items
    Delete { id: i32 },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show a session
    Show { id: String },
    /// Revoke a session
    Revoke { id: String },
    /// Delete a session
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let result = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let env = commands::Env::load(Duration::from_secs(cli.timeout_secs)).await?;

    match cli.command {
        Commands::InitDb => commands::schema::init(&env).await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                password,
                admin,
            } => commands::user::create(&env, &email, &name, &password, admin).await?,
            UserAction::List => commands::user::list(&env).await?,
        },
        Commands::Product { action } => match action {
            ProductAction::Add {
                name,
                price,
                stock,
                category,
                image,
                description,
            } => {
                let product = shopkeep_core::NewProduct {
                    name,
                    image,
                    category,
                    description,
                    rating: 0,
                    num_reviews: 0,
                    price,
                    count_in_stock: stock,
                };
                commands::catalog::add(&env, product).await?;
            }
            ProductAction::List => commands::catalog::list(&env).await?,
            ProductAction::Delete { id } => commands::catalog::delete(&env, id).await?,
        },
        Commands::Order { action } => match action {
            OrderAction::List { user } => commands::order::list(&env, user).await?,
            OrderAction::Show { id } => commands::order::show(&env, id).await?,
            OrderAction::Delete { id } => commands::order::delete(&env, id).await?,
        },
        Commands::Session { action } => match action {
            SessionAction::Show { id } => commands::session::show(&env, id).await?,
            SessionAction::Revoke { id } => commands::session::revoke(&env, id).await?,
            SessionAction::Delete { id } => commands::session::delete(&env, id).await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_product_add() {
        let cli = Cli::try_parse_from([
            "shopkeep", "product", "add", "-n", "Widget", "-p", "9.99", "-s", "5",
        ])
        .map_err(|e| e.to_string());
        match cli {
            Ok(Cli {
                command:
                    Commands::Product {
                        action: ProductAction::Add { price, stock, .. },
                    },
                ..
            }) => {
                assert_eq!(price, Decimal::new(999, 2));
                assert_eq!(stock, 5);
            }
            Ok(_) => panic!("parsed into the wrong command"),
            Err(e) => panic!("failed to parse: {e}"),
        }
    }

    #[test]
    fn test_global_timeout_flag() {
        let cli = Cli::try_parse_from(["shopkeep", "order", "list", "--timeout-secs", "5"])
            .map_err(|e| e.to_string());
        assert!(matches!(cli, Ok(Cli { timeout_secs: 5, .. })));
    }
}
