use crate::config::Config;
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const IN_MEMORY: &str = ":memory:";

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
    replica: bool,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Serializes read-then-write sequences against this database.
    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.tx_lock.lock().await
    }

    pub fn is_replica(&self) -> bool {
        self.replica
    }

    pub async fn sync(&self) -> Result<()> {
        if self.replica {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let db_name = cfg.app.get_db();

        let (db, replica) = match cfg.app.replica_target() {
            Some((url, token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let path = data_dir.join(db_name);
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                let db = Builder::new_synced_database(&path, url.to_string(), token.to_string())
                    .sync_interval(sync_interval)
                    .build()
                    .await?;
                (db, true)
            }
            None if db_name == IN_MEMORY => (Builder::new_local(IN_MEMORY).build().await?, false),
            None => (Builder::new_local(data_dir.join(db_name)).build().await?, false),
        };

        Self::setup(db, replica).await
    }

    /// Fresh, migrated in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(IN_MEMORY).build().await?;
        Self::setup(db, false).await
    }

    async fn setup(db: LibsqlDatabase, replica: bool) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::bookmarks::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            db,
            conn,
            tx_lock: Mutex::new(()),
            replica,
        })
    }
}
