//! Basistypen fuer Stillepost
//!
//! Rollen, Statistik-Eintraege und die Erzeugung opaker Benutzer-IDs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rolle eines Benutzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolle {
    User,
    Admin,
}

impl Rolle {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Liest eine Rolle aus einem Wire-String; alles ausser "admin" wird
    /// als normaler Benutzer behandelt.
    pub fn aus_wire(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

impl Default for Rolle {
    fn default() -> Self {
        Self::User
    }
}

impl std::str::FromStr for Rolle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("Unbekannte Rolle: {other}")),
        }
    }
}

impl std::fmt::Display for Rolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Ein einzelner Statistik-Messpunkt (opake Telemetrie)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistik {
    pub zeit: DateTime<Utc>,
    pub wert: f64,
}

impl Statistik {
    pub fn jetzt(wert: f64) -> Self {
        Self {
            zeit: Utc::now(),
            wert,
        }
    }
}

/// Statistik-Sammlung: Name -> Messreihe
pub type AppStatistiken = HashMap<String, Vec<Statistik>>;

/// Erzeugt eine neue opake Benutzer-ID: 128 Bit Zufall als Hex-String
/// (32 Zeichen, ohne Trennstriche).
pub fn benutzer_id_generieren() -> String {
    Uuid::new_v4().simple().to_string()
}
