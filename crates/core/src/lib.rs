//! stillepost-core – Gemeinsame Typen
//!
//! Kleine Basistypen, die von mehreren Crates gebraucht werden:
//! Benutzerrollen, Statistik-Eintraege und die ID-Erzeugung.

pub mod types;

pub use types::{benutzer_id_generieren, AppStatistiken, Rolle, Statistik};
