//! Der Datenbank-Vertrag des Nachrichten-Kerns
//!
//! Entkoppelt die Geschaeftslogik von der konkreten Implementierung.
//! Der Speicher-Worker nimmt einen seriellen Schreibpfad an; Leser duerfen
//! parallel zugreifen.

use chrono::Duration;

use crate::error::DbError;
use crate::models::{BenutzerRecord, NachrichtRecord, NeueNachricht, RaumRecord};

/// Result-Alias fuer Datenbank-Operationen
pub type DbResult<T> = Result<T, DbError>;

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://stillepost.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus bei SQLite aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://stillepost.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Datenzugriffe des Nachrichten-Kerns
#[allow(async_fn_in_trait)]
pub trait Database: Send + Sync {
    /// Eine einzelne Nachricht laden
    async fn get_message(&self, room_id: &str, message_id: i64) -> DbResult<Option<NachrichtRecord>>;

    /// Eine Nachricht anhaengen (append-only)
    async fn store_message(&self, room_id: &str, nachricht: &NeueNachricht) -> DbResult<()>;

    /// Einen Benutzer anhand seiner ID laden
    async fn get_user(&self, user_id: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Einen Benutzer anhand seiner E-Mail laden
    async fn get_user_by_email(&self, email: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Einen Benutzer einfuegen oder aktualisieren (Upsert ueber die ID)
    async fn store_user(&self, benutzer: &BenutzerRecord) -> DbResult<()>;

    /// Einen Raum laden; hydriert die juengsten Nachrichten
    /// (hoechstens `RAUM_HISTORIE_LIMIT`, aelteste zuerst)
    async fn get_room(&self, room_id: &str) -> DbResult<Option<RaumRecord>>;

    /// Raum-Metadaten einfuegen oder aktualisieren; Nachrichten bleiben
    /// unberuehrt
    async fn store_room(&self, raum: &RaumRecord) -> DbResult<()>;

    /// Pro Raum alle bis auf die `behalten` juengsten Nachrichten loeschen
    /// (juengste nach Einfuege-ID, nicht nach Client-Zeitstempel)
    async fn prune_messages(&self, behalten: i64) -> DbResult<()>;

    /// Raeume loeschen, deren juengste Nachricht aelter als `schwelle` ist;
    /// zugehoerige Nachrichten kaskadieren
    async fn reap_stale_rooms(&self, schwelle: Duration) -> DbResult<()>;
}
