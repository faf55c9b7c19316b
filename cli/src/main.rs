//! `biblioteca` command-line client for the library-management API.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use biblioteca_core::{ApiClient, BookSearch, ClientConfig, FileStorage, SessionStore};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_SESSION_DIR: &str = ".biblioteca";

#[derive(Debug, Parser)]
#[command(name = "biblioteca", about = "Command-line client for the library API", version)]
struct Cli {
    /// API root. Overrides `BIBLIOTECA_API_URL`.
    #[arg(long = "api-url", value_name = "url", global = true)]
    api_url: Option<String>,
    /// Directory holding the session record.
    #[arg(long = "session-dir", value_name = "path", global = true)]
    session_dir: Option<PathBuf>,
    /// Per-request timeout. Overrides `BIBLIOTECA_TIMEOUT_SECS`.
    #[arg(long = "timeout-secs", value_name = "secs", global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Drop the stored session.
    Logout,
    /// Print the stored session user.
    Whoami,
    /// Check that the API is up.
    Health,
    #[command(subcommand)]
    Books(BooksCommand),
    #[command(subcommand)]
    Loans(LoansCommand),
    #[command(subcommand)]
    Users(UsersCommand),
}

#[derive(Debug, Subcommand)]
enum BooksCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long = "per-page", default_value_t = 100)]
        per_page: u32,
    },
    Get {
        id: i64,
    },
    Genres,
    Search {
        #[arg(long)]
        titulo: Option<String>,
        #[arg(long)]
        autor: Option<String>,
        #[arg(long)]
        genero: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    LowStock,
}

#[derive(Debug, Subcommand)]
enum LoansCommand {
    List,
    Active,
    Overdue,
    /// Loans of one user.
    User {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    List,
    Get {
        id: i64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = build_client(&cli)?;
    run(&client, cli.command)
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("load configuration from environment")?;
    if let Some(url) = &cli.api_url {
        config = config.with_base_url(url);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

fn build_client(cli: &Cli) -> Result<ApiClient> {
    let config = resolve_config(cli)?;
    let dir = cli
        .session_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_DIR));
    let session = SessionStore::new(Arc::new(FileStorage::new(dir)), config.storage_key.clone());
    Ok(ApiClient::new(config, session).with_navigator(|path: &str| {
        tracing::warn!(target_path = path, "session ended, run `biblioteca login` to sign in again");
    }))
}

fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let response = client.auth().login(&email, &password).context("login failed")?;
            print_json(&response.user)
        }
        Command::Logout => {
            client.guard().logout();
            Ok(())
        }
        Command::Whoami => match client.guard().current_user() {
            Some(user) => print_json(&user),
            None => bail!("not logged in"),
        },
        Command::Health => print_json(&client.health().context("health check failed")?),
        Command::Books(command) => run_books(client, command),
        Command::Loans(command) => run_loans(client, command),
        Command::Users(command) => run_users(client, command),
    }
}

fn run_books(client: &ApiClient, command: BooksCommand) -> Result<()> {
    let books = client.books();
    match command {
        BooksCommand::List { page, per_page } => print_json(&books.list(page, per_page).context("list books")?),
        BooksCommand::Get { id } => print_json(&books.get(id).with_context(|| format!("get book {id}"))?),
        BooksCommand::Genres => print_json(&books.genres().context("list genres")?),
        BooksCommand::Search {
            titulo,
            autor,
            genero,
            limit,
        } => {
            let filter = BookSearch {
                titulo,
                autor,
                genero,
                limit,
            };
            print_json(&books.search(&filter).context("search books")?)
        }
        BooksCommand::LowStock => print_json(&books.low_stock().context("list low-stock books")?),
    }
}

fn run_loans(client: &ApiClient, command: LoansCommand) -> Result<()> {
    let loans = client.loans();
    let result = match command {
        LoansCommand::List => loans.list().context("list loans"),
        LoansCommand::Active => loans.active().context("list active loans"),
        LoansCommand::Overdue => loans.overdue().context("list overdue loans"),
        LoansCommand::User { id } => loans.by_user(id).with_context(|| format!("list loans of user {id}")),
    };
    print_json(&result?)
}

fn run_users(client: &ApiClient, command: UsersCommand) -> Result<()> {
    let users = client.users();
    match command {
        UsersCommand::List => print_json(&users.list().context("list users")?),
        UsersCommand::Get { id } => print_json(&users.get(id).with_context(|| format!("get user {id}"))?),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("render output")?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "biblioteca",
            "--api-url",
            "http://127.0.0.1:9000/api/",
            "--timeout-secs",
            "3",
            "books",
            "list",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
        assert!(matches!(
            cli.command,
            Command::Books(BooksCommand::List { page: 1, per_page: 100 })
        ));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["biblioteca", "loans", "user", "7", "--session-dir", "/tmp/s"]);
        assert_eq!(cli.session_dir, Some(PathBuf::from("/tmp/s")));
        assert!(matches!(cli.command, Command::Loans(LoansCommand::User { id: 7 })));
    }

    #[test]
    fn search_filters_are_optional() {
        let cli = Cli::parse_from(["biblioteca", "books", "search", "--autor", "Borges"]);
        match cli.command {
            Command::Books(BooksCommand::Search { titulo, autor, .. }) => {
                assert!(titulo.is_none());
                assert_eq!(autor.as_deref(), Some("Borges"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
