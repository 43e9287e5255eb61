//! stillepost-chat – Broadcast-Gewebe und Hintergrund-Worker
//!
//! Enthaelt die gemeinsam genutzte Registry der Stream-Abonnenten, die
//! begrenzte Speicher-Warteschlange mit ihrem Einzel-Konsumenten und die
//! periodische Wartung (Prune, Reaper). Alles hier ist unabhaengig vom
//! Wire-Format; die gRPC-Schicht reicht ihre Sender-Handles generisch
//! herein.

pub mod speicher;
pub mod verteiler;
pub mod wartung;

pub use speicher::{speicher_warteschlange, speicher_worker, SpeicherAuftrag, SpeicherQueue};
pub use verteiler::StreamVerteiler;
pub use wartung::{prune_worker, raum_reaper, WartungsKonfig};
