//! SQLite Connection Pool

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::DbError;
use crate::repository::DatabaseConfig;

/// Wrapper um den SQLite Connection Pool
///
/// Fremdschluessel sind immer aktiv; das Loeschen eines Raums kaskadiert
/// damit auf seine Nachrichten.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pub(crate) pool: SqlitePool,
}

impl SqliteDb {
    /// Oeffnet die Datenbank laut Konfiguration und fuehrt Migrationen aus
    pub async fn oeffnen(config: &DatabaseConfig) -> Result<Self, DbError> {
        let journal = if config.sqlite_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        let opts = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(journal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let db = Self::verbinden(opts, config.max_verbindungen, 0).await?;
        info!(url = %config.url, wal = config.sqlite_wal, "SQLite-Pool geoeffnet");
        Ok(db)
    }

    /// Erstellt eine In-Memory-Datenbank fuer Tests
    ///
    /// Mindestens eine Verbindung bleibt offen, sonst verschwindet die
    /// Datenbank zwischen zwei Zugriffen.
    pub async fn in_memory() -> Result<Self, DbError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::verbinden(opts, 1, 1).await
    }

    async fn verbinden(
        opts: SqliteConnectOptions,
        max_verbindungen: u32,
        min_verbindungen: u32,
    ) -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_verbindungen)
            .min_connections(min_verbindungen)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.migrationen_ausfuehren().await?;
        Ok(db)
    }

    /// Fuehrt alle ausstehenden Migrationen aus
    pub async fn migrationen_ausfuehren(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Datenbank-Migrationen abgeschlossen");
        Ok(())
    }

    /// Gibt den internen Pool zurueck (fuer Tests)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
