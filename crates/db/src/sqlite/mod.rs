//! SQLite-Implementierung des Database-Traits

mod pool;
mod store;

pub use pool::SqliteDb;

/// Zeitstempel-Format fuer `created_at`-Spalten; lexikografisch sortierbar,
/// damit Vergleiche direkt in SQL moeglich sind.
pub(crate) const ZEIT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub(crate) fn zeit_jetzt_string() -> String {
    chrono::Utc::now().format(ZEIT_FORMAT).to_string()
}

pub(crate) fn zeit_parsen(s: &str) -> crate::DbResult<chrono::DateTime<chrono::Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, ZEIT_FORMAT)
        .map(|ndt| ndt.and_utc())
        .or_else(|_| {
            chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&chrono::Utc))
        })
        .map_err(|e| crate::DbError::intern(format!("Ungueltige Zeitangabe '{s}': {e}")))
}
