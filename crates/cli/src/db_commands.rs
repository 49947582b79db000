use std::path::{Path, PathBuf};

use clap::Subcommand;

#[derive(Subcommand)]
pub enum DbAction {
    /// Delete the sqlite database file and its WAL/SHM siblings.
    Reset,
    /// Connect once so pending table creation runs, then exit.
    Migrate,
}

/// Strips the `sqlite://` scheme and query string off `CMUX_DATABASE_URL`,
/// leaving the bare file path `ensure_schema` actually writes to.
fn database_path(database_url: &str) -> Option<PathBuf> {
    let path = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() { None } else { Some(Path::new(path).to_path_buf()) }
}

pub async fn handle_db(action: DbAction) -> anyhow::Result<()> {
    match action {
        DbAction::Reset => reset().await,
        DbAction::Migrate => migrate().await,
    }
}

async fn reset() -> anyhow::Result<()> {
    let config = cmux_config::load_from_env();
    let Some(db_path) = database_path(&config.database_url) else {
        println!("in-memory database, nothing to reset");
        return Ok(());
    };

    let mut deleted = false;
    for suffix in ["", "-wal", "-shm"] {
        let path = if suffix.is_empty() {
            db_path.clone()
        } else {
            let mut name = db_path.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        if path.exists() {
            std::fs::remove_file(&path)?;
            println!("deleted {}", path.display());
            deleted = true;
        }
    }

    if !deleted {
        println!("no database files found at {}", db_path.display());
    }
    Ok(())
}

async fn migrate() -> anyhow::Result<()> {
    let config = cmux_config::load_from_env();
    cmux_store::MetadataStore::connect(&config.database_url).await?;
    println!("schema is up to date at {}", config.database_url);
    Ok(())
}
