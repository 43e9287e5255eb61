//! Datenbankmodelle fuer Stillepost
//!
//! Diese Typen repraesentieren Datensaetze aus der Datenbank. Die Felder
//! `rooms`, `history`, `stats` und `posts` liegen als JSON-Spalten in der
//! users-Tabelle; `stats` und `posts` bleiben fuer den Server opak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stillepost_core::Rolle;

/// Obergrenze der Raum-Historie eines Benutzers
pub const HISTORIE_MAX: usize = 10;

/// Standard-Retention eines neuen Raums
pub const RAUM_MAX_NACHRICHTEN: i64 = 1000;

/// Wie viele Nachrichten `get_room` in einen Raum hydriert
pub const RAUM_HISTORIE_LIMIT: i64 = 50;

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Benutzer-Datensatz aus der Datenbank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenutzerRecord {
    /// Opake ID (128 Bit als Hex-String)
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Rolle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Vom Benutzer gespeicherte Raeume (Menge, Reihenfolge stabil)
    pub rooms: Vec<String>,
    /// Zuletzt betretene Raeume, juengster am Ende, dedupliziert, max 10
    pub history: Vec<String>,
    /// Opake Telemetrie
    pub stats: serde_json::Value,
    /// Opak, aus Kompatibilitaet mitgefuehrt
    pub posts: serde_json::Value,
}

impl BenutzerRecord {
    /// Legt einen neuen Benutzer mit leeren Listen an
    pub fn neu(id: String, email: String, name: String, role: Rolle, password_hash: String) -> Self {
        let jetzt = Utc::now();
        Self {
            id,
            email,
            password_hash,
            name,
            role,
            created_at: jetzt,
            updated_at: jetzt,
            rooms: Vec::new(),
            history: Vec::new(),
            stats: serde_json::json!({}),
            posts: serde_json::json!([]),
        }
    }

    /// Vermerkt einen Raumbeitritt
    ///
    /// Historie: bestehender Eintrag wandert ans Ende (Deduplizierung),
    /// Laenge bleibt unter `HISTORIE_MAX`. Gespeicherte Raeume: Menge,
    /// einmaliges Anhaengen.
    pub fn raum_vermerken(&mut self, raum: &str) {
        self.history.retain(|r| r != raum);
        self.history.push(raum.to_string());
        if self.history.len() > HISTORIE_MAX {
            let ueberhang = self.history.len() - HISTORIE_MAX;
            self.history.drain(..ueberhang);
        }

        if !self.rooms.iter().any(|r| r == raum) {
            self.rooms.push(raum.to_string());
        }

        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Raeume
// ---------------------------------------------------------------------------

/// Raum-Datensatz aus der Datenbank
///
/// `nachrichten` wird nur von `get_room` befuellt (juengste <=50, aelteste
/// zuerst); `store_room` schreibt ausschliesslich die Metadaten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaumRecord {
    /// ID ist der Raumname
    pub id: String,
    pub name: String,
    /// Retention-Grenze fuer den Prune-Worker
    pub max_messages: i64,
    /// Opake Telemetrie
    pub stats: serde_json::Value,
    #[serde(default)]
    pub nachrichten: Vec<NachrichtRecord>,
}

impl RaumRecord {
    /// Legt einen neuen Raum mit Standardwerten an
    pub fn neu(name: &str) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            max_messages: RAUM_MAX_NACHRICHTEN,
            stats: serde_json::json!({}),
            nachrichten: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Nachrichten
// ---------------------------------------------------------------------------

/// Persistierte Nachricht
///
/// `inhalt` ist fuer Textnachrichten der opake Ciphertext (Base64), fuer
/// Datei-Kontrollnachrichten ein kompakter Deskriptor-String.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NachrichtRecord {
    /// Monoton steigende Einfuege-ID (Prune-Reihenfolge)
    pub id: i64,
    pub room_id: String,
    pub user_id: String,
    pub email: String,
    pub inhalt: String,
    /// Server-Zeitstempel als Unix-Sekunden-String
    pub zeit: String,
    pub reply_to: String,
    pub iv: String,
    pub hot_sauce: String,
    pub created_at: DateTime<Utc>,
}

/// Daten zum Anhaengen einer neuen Nachricht
#[derive(Debug, Clone)]
pub struct NeueNachricht {
    pub room_id: String,
    pub user_id: String,
    pub email: String,
    pub inhalt: String,
    pub zeit: String,
    pub reply_to: String,
    pub iv: String,
    pub hot_sauce: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn benutzer() -> BenutzerRecord {
        BenutzerRecord::neu(
            "00112233445566778899aabbccddeeff".into(),
            "test@example.com".into(),
            "Test".into(),
            Rolle::User,
            "hash".into(),
        )
    }

    #[test]
    fn historie_beitritt_haengt_an() {
        let mut b = benutzer();
        b.raum_vermerken("a");
        b.raum_vermerken("b");
        assert_eq!(b.history, vec!["a", "b"]);
        assert_eq!(b.rooms, vec!["a", "b"]);
    }

    #[test]
    fn historie_dedupliziert_und_verschiebt_ans_ende() {
        let mut b = benutzer();
        for raum in ["a", "b", "c"] {
            b.raum_vermerken(raum);
        }
        b.raum_vermerken("b");
        assert_eq!(b.history, vec!["a", "c", "b"]);
        assert_eq!(b.history.len(), 3);
    }

    #[test]
    fn historie_begrenzt_auf_maximum() {
        let mut b = benutzer();
        for i in 0..15 {
            b.raum_vermerken(&format!("raum{i}"));
        }
        assert_eq!(b.history.len(), HISTORIE_MAX);
        assert_eq!(b.history.last().unwrap(), "raum14");
        assert_eq!(b.history.first().unwrap(), "raum5");
    }

    #[test]
    fn doppelter_beitritt_aendert_laenge_nicht() {
        let mut b = benutzer();
        b.raum_vermerken("x");
        b.raum_vermerken("x");
        assert_eq!(b.history, vec!["x"]);
        assert_eq!(b.rooms, vec!["x"]);
    }

    #[test]
    fn raum_standardwerte() {
        let r = RaumRecord::neu("lobby");
        assert_eq!(r.id, "lobby");
        assert_eq!(r.name, "lobby");
        assert_eq!(r.max_messages, RAUM_MAX_NACHRICHTEN);
        assert!(r.nachrichten.is_empty());
    }
}
