mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comanda_core::storage::open_store;
use comanda_core::{BackupManager, DatabaseCore, Document, DocumentStore, Role, StoreConfig};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::LogLevel;

type SharedStore = Arc<dyn DocumentStore>;

#[derive(Parser)]
#[command(name = "comanda")]
#[command(about = "Comanda CLI - inspect and maintain the order-management document store")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// error | warn | info | debug | trace (default: $COMANDA_LOG, then warn)
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the full document
    Read,
    /// Replace the document with the content of a JSON file
    Write {
        file: PathBuf,
        #[arg(long, default_value = "operador")]
        role: Role,
    },
    /// Replace only the collections present in a JSON file
    Patch {
        file: PathBuf,
        #[arg(long, default_value = "operador")]
        role: Role,
    },
    /// Production summary for a delivery date (YYYY-MM-DD)
    Summary { date: String },
    /// Take a snapshot of the current document
    Backup,
    /// List snapshots, newest first
    Backups,
    /// Restore a snapshot by filename (the current state is saved first)
    Restore { filename: String },
    /// Register a user with an already hashed password
    AddUser {
        username: String,
        #[arg(long)]
        password_hash: String,
        #[arg(long, default_value = "operador")]
        role: Role,
    },
}

fn parse_log_level(s: &str) -> std::result::Result<LogLevel, String> {
    LogLevel::from_str(s).ok_or_else(|| format!("unknown log level '{}'", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);

    let config = StoreConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let store: SharedStore = Arc::from(
        open_store(&config.backend)
            .with_context(|| format!("Failed to open {} store", config.backend.kind))?,
    );
    let db = DatabaseCore::new(Arc::clone(&store));

    match cli.command {
        Commands::Read => {
            let doc = db.read().context("Failed to read document")?;
            print_json(&doc)
        }
        Commands::Write { file, role } => {
            let doc = load_document(&file)?;
            db.write(doc, role)
                .with_context(|| format!("Write from {} rejected", file.display()))?;
            print_json(&json!({"written": file.display().to_string(), "role": role}))
        }
        Commands::Patch { file, role } => {
            let patch = load_document(&file)?;
            let collections: Vec<String> = patch.collection_names().map(str::to_string).collect();
            db.write_partial(patch, role)
                .with_context(|| format!("Patch from {} rejected", file.display()))?;
            print_json(&json!({"patched": collections, "role": role}))
        }
        Commands::Summary { date } => {
            let summary = db
                .summarize_production(&date)
                .with_context(|| format!("Failed to summarize production for {}", date))?;
            print_json(&summary.to_value())
        }
        Commands::Backup => {
            let filename = backups(store, &config)
                .backup()
                .context("Failed to take backup")?;
            print_json(&json!({"filename": filename}))
        }
        Commands::Backups => {
            let listed = backups(store, &config)
                .list()
                .context("Failed to list backups")?;
            print_json(&listed)
        }
        Commands::Restore { filename } => {
            backups(store, &config)
                .restore(&filename)
                .with_context(|| format!("Failed to restore {}", filename))?;
            print_json(&json!({"restored": filename}))
        }
        Commands::AddUser {
            username,
            password_hash,
            role,
        } => {
            // Local console access counts as admin
            let mut user = db
                .create_user(&username, &password_hash, role, Role::Admin)
                .with_context(|| format!("Failed to create user '{}'", username))?;
            user.remove("passwordHash");
            print_json(&user)
        }
    }
}

fn backups(store: SharedStore, config: &StoreConfig) -> BackupManager<SharedStore> {
    BackupManager::from_config(store, &config.backup)
}

fn load_document(file: &Path) -> Result<Document> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    Document::from_json(&content).with_context(|| format!("Invalid document in file: {}", file.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write_with_role() {
        let cli = Cli::try_parse_from(["comanda", "write", "doc.json", "--role", "admin"]).unwrap();
        match cli.command {
            Commands::Write { file, role } => {
                assert_eq!(file, PathBuf::from("doc.json"));
                assert_eq!(role, Role::Admin);
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn test_role_defaults_to_operator() {
        let cli = Cli::try_parse_from(["comanda", "patch", "p.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Patch { role: Role::Operador, .. }));
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(Cli::try_parse_from(["comanda", "write", "doc.json", "--role", "root"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["comanda", "summary", "2024-05-01", "--log-level", "DEBUG", "--config", "c.toml"])
                .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn test_load_document_reports_bad_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2]").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
