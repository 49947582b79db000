//! Inline table creation. There is no bundled migrations directory for this
//! store — tables are created idempotently the first time a pool is handed
//! to [`crate::MetadataStore::new`].

use sqlx::SqlitePool;

use crate::error::Result;

pub(crate) async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS environments (
            id                 TEXT PRIMARY KEY,
            team_id            TEXT NOT NULL,
            name               TEXT NOT NULL,
            snapshot_id        TEXT NOT NULL,
            snapshot_provider  TEXT NOT NULL,
            template_vmid      INTEGER,
            data_vault_key     TEXT,
            selected_repos     TEXT NOT NULL DEFAULT '[]',
            maintenance_script TEXT,
            dev_script         TEXT,
            exposed_ports      TEXT NOT NULL DEFAULT '[]',
            created_at         TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS environment_snapshots (
            id                 TEXT PRIMARY KEY,
            environment_id     TEXT NOT NULL,
            version            INTEGER NOT NULL,
            snapshot_id        TEXT NOT NULL,
            snapshot_provider  TEXT NOT NULL,
            template_vmid      INTEGER,
            created_by_user_id TEXT NOT NULL,
            created_at         TEXT NOT NULL DEFAULT (datetime('now')),
            label              TEXT,
            is_active          INTEGER NOT NULL DEFAULT 0,
            maintenance_script TEXT,
            dev_script         TEXT,
            UNIQUE(environment_id, version)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sandbox_activity (
            id                 TEXT PRIMARY KEY,
            instance_id        TEXT NOT NULL,
            provider           TEXT NOT NULL,
            template_vmid      INTEGER,
            snapshot_id        TEXT,
            snapshot_provider  TEXT,
            team_id            TEXT NOT NULL,
            kind               TEXT NOT NULL,
            at                 TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS task_runs (
            id                   TEXT PRIMARY KEY,
            team_id              TEXT NOT NULL,
            user_id              TEXT NOT NULL,
            vscode               TEXT,
            starting_commit_sha  TEXT,
            networking           TEXT NOT NULL DEFAULT '[]',
            discovered_repos     TEXT NOT NULL DEFAULT '[]',
            environment_error    TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS api_keys (
            id         TEXT PRIMARY KEY,
            team_id    TEXT NOT NULL,
            provider   TEXT NOT NULL,
            key_value  TEXT NOT NULL,
            for_agents INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS github_connections (
            id               TEXT PRIMARY KEY,
            team_id          TEXT NOT NULL,
            account_login    TEXT NOT NULL,
            installation_id  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS team_members (
            team_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY (team_id, user_id)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
