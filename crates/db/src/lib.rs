//! stillepost-db – Datenbank-Abstraktion
//!
//! Stellt den `Database`-Trait bereit, den der Nachrichten-Pfad und die
//! Hintergrund-Worker konsumieren, sowie die SQLite-Implementierung
//! (sqlx, WAL-Modus). Die Nachrichten-Tabelle ist append-only; Aufraeumen
//! uebernehmen Prune und Reaper ueber eigene Trait-Methoden.

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::DbError;
pub use repository::{Database, DatabaseConfig, DbResult};
pub use sqlite::SqliteDb;
