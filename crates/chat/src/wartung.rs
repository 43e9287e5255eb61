//! Periodische Wartung: Prune und Reaper
//!
//! Beide Worker laufen als eigenstaendige, endlose Schleifen gegen den
//! Datenbank-Vertrag. Fehler eines Durchlaufs werden geloggt; der naechste
//! Durchlauf findet regulaer statt. Die Worker enden mit dem Prozess –
//! eine koordinierte Abschaltung ist nicht noetig, der persistente
//! Speicher bleibt massgeblich.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use stillepost_db::Database;

/// Konfiguration der Wartungs-Worker
#[derive(Debug, Clone)]
pub struct WartungsKonfig {
    /// Abstand zwischen zwei Prune-Durchlaeufen
    pub prune_intervall: Duration,
    /// Wie viele Nachrichten pro Raum ueberleben
    pub prune_behalten: i64,
    /// Abstand zwischen zwei Reaper-Durchlaeufen
    pub reaper_intervall: Duration,
    /// Ab welchem Alter der juengsten Nachricht ein Raum als inaktiv gilt
    pub reaper_schwelle: Duration,
}

impl Default for WartungsKonfig {
    fn default() -> Self {
        Self {
            prune_intervall: Duration::from_secs(60 * 60),
            prune_behalten: 1000,
            reaper_intervall: Duration::from_secs(6 * 60 * 60),
            reaper_schwelle: Duration::from_secs(49 * 60 * 60),
        }
    }
}

/// Beschneidet periodisch jede Raum-Historie auf die juengsten `behalten`
/// Nachrichten (nach Einfuege-ID)
pub async fn prune_worker<D: Database>(db: Arc<D>, intervall: Duration, behalten: i64) {
    info!(
        intervall_secs = intervall.as_secs(),
        behalten, "Prune-Worker gestartet"
    );
    loop {
        tokio::time::sleep(intervall).await;
        debug!("Prune-Durchlauf beginnt");
        if let Err(e) = db.prune_messages(behalten).await {
            warn!(fehler = %e, "Prune-Durchlauf fehlgeschlagen");
        }
    }
}

/// Entfernt periodisch Raeume, deren juengste Nachricht aelter als die
/// Schwelle ist; die Nachrichten kaskadieren im Store
pub async fn raum_reaper<D: Database>(db: Arc<D>, intervall: Duration, schwelle: Duration) {
    info!(
        intervall_secs = intervall.as_secs(),
        schwelle_secs = schwelle.as_secs(),
        "Raum-Reaper gestartet"
    );
    let schwelle = chrono::Duration::from_std(schwelle).unwrap_or(chrono::Duration::hours(49));
    loop {
        tokio::time::sleep(intervall).await;
        debug!("Reaper-Durchlauf beginnt");
        if let Err(e) = db.reap_stale_rooms(schwelle).await {
            warn!(fehler = %e, "Reaper-Durchlauf fehlgeschlagen");
        }
    }
}
