//! Asynchroner Speicher-Pfad
//!
//! Begrenzte Warteschlange zwischen Nachrichten-Ebene und Datenbank mit
//! genau einem Konsumenten. Das Einreihen blockiert nie: ist die
//! Warteschlange voll, wird der Auftrag verworfen und eine Warnung
//! geloggt – Zustellung hat unter Last Vorrang vor Persistenz.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use stillepost_db::models::NeueNachricht;
use stillepost_db::Database;

/// Kapazitaet der Speicher-Warteschlange
pub const WARTESCHLANGE_KAPAZITAET: usize = 100;

/// Intervall des Heartbeat-Logs des Workers
const HEARTBEAT_INTERVALL: Duration = Duration::from_secs(5 * 60);

/// Ein Auftrag fuer den Speicher-Worker
#[derive(Debug)]
pub struct SpeicherAuftrag {
    pub raum_id: String,
    pub nachricht: NeueNachricht,
}

/// Produzenten-Seite der Speicher-Warteschlange
#[derive(Clone)]
pub struct SpeicherQueue {
    tx: mpsc::Sender<SpeicherAuftrag>,
}

impl SpeicherQueue {
    /// Reiht einen Auftrag nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Warteschlange voll ist; der Auftrag
    /// ist dann verworfen und die Warnung bereits geschrieben.
    pub fn einreihen(&self, auftrag: SpeicherAuftrag) -> bool {
        match self.tx.try_send(auftrag) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("DB-Warteschlange voll, Nachricht wird nicht persistiert");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("DB-Warteschlange geschlossen, Nachricht wird nicht persistiert");
                false
            }
        }
    }

    /// Aktuelle Fuellhoehe der Warteschlange
    pub fn tiefe(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Erstellt die Speicher-Warteschlange mit der angegebenen Kapazitaet
pub fn speicher_warteschlange(
    kapazitaet: usize,
) -> (SpeicherQueue, mpsc::Receiver<SpeicherAuftrag>) {
    let (tx, rx) = mpsc::channel(kapazitaet);
    (SpeicherQueue { tx }, rx)
}

/// Einzel-Konsument der Speicher-Warteschlange
///
/// Serialisiert alle Schreibzugriffe auf die Nachrichten-Tabelle durch
/// eine Task; Datenbanklatenz trifft damit nie den Broadcast-Pfad.
/// Fehler beim Speichern werden geloggt und uebersprungen. Der Worker
/// endet, wenn alle Produzenten-Handles weg sind.
pub async fn speicher_worker<D: Database>(db: Arc<D>, mut rx: mpsc::Receiver<SpeicherAuftrag>) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVALL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Der erste Tick feuert sofort
    heartbeat.tick().await;

    info!("Speicher-Worker gestartet");

    loop {
        tokio::select! {
            auftrag = rx.recv() => {
                let Some(auftrag) = auftrag else {
                    debug!("Speicher-Warteschlange geschlossen, Worker endet");
                    return;
                };
                if let Err(e) = db.store_message(&auftrag.raum_id, &auftrag.nachricht).await {
                    warn!(raum = %auftrag.raum_id, fehler = %e, "Nachricht konnte nicht gespeichert werden");
                }
            }
            _ = heartbeat.tick() => {
                info!(tiefe = rx.len(), "Speicher-Worker Heartbeat");
            }
        }
    }
}
