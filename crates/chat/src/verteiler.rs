//! Stream-Registry – wer hoert in welchem Raum zu
//!
//! Zweistufige Abbildung `raum_id -> benutzer_id -> Handle` hinter einem
//! einzelnen Reader/Writer-Lock. Der Fan-out arbeitet auf einem
//! Schnappschuss: das Lock wird nur fuer das Kopieren der Handles gehalten,
//! nie waehrend des Sendens.
//!
//! Registriert sich dasselbe Paar (Raum, Benutzer) erneut – typisch nach
//! einem Reconnect – verdraengt das neue Handle das alte stillschweigend.
//! Jede Registrierung traegt eine Marke; die Abmeldung greift nur, wenn die
//! Marke noch stimmt, damit der verdraengte Stream beim Aufraeumen nicht
//! seinen Nachfolger entfernt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

struct Abonnent<T> {
    marke: u64,
    handle: T,
}

/// Registry aller aktiven Stream-Abonnenten
pub struct StreamVerteiler<T> {
    raeume: RwLock<HashMap<String, HashMap<String, Abonnent<T>>>>,
    naechste_marke: AtomicU64,
}

impl<T: Clone> StreamVerteiler<T> {
    pub fn neu() -> Self {
        Self {
            raeume: RwLock::new(HashMap::new()),
            naechste_marke: AtomicU64::new(1),
        }
    }

    /// Registriert ein Handle fuer (Raum, Benutzer) und gibt die Marke der
    /// Registrierung zurueck
    ///
    /// Ein bestehendes Handle desselben Paars wird ersetzt; dessen Stream
    /// laeuft beim naechsten Senden auf einen Fehler und raeumt sich selbst
    /// auf.
    pub fn registrieren(&self, raum_id: &str, benutzer_id: &str, handle: T) -> u64 {
        let marke = self.naechste_marke.fetch_add(1, Ordering::Relaxed);
        let mut raeume = self.raeume.write();
        let vorher = raeume
            .entry(raum_id.to_string())
            .or_default()
            .insert(benutzer_id.to_string(), Abonnent { marke, handle });

        if vorher.is_some() {
            debug!(raum = %raum_id, benutzer = %benutzer_id, "Bestehendes Stream-Handle verdraengt");
        }
        marke
    }

    /// Entfernt die Registrierung, sofern die Marke noch die aktuelle ist
    ///
    /// Wird der Raum dadurch leer, faellt sein Eintrag weg.
    pub fn deregistrieren(&self, raum_id: &str, benutzer_id: &str, marke: u64) {
        let mut raeume = self.raeume.write();
        if let Some(abonnenten) = raeume.get_mut(raum_id) {
            if abonnenten.get(benutzer_id).is_some_and(|a| a.marke == marke) {
                abonnenten.remove(benutzer_id);
            }
            if abonnenten.is_empty() {
                raeume.remove(raum_id);
            }
        }
    }

    /// Kopiert die aktuellen Handles eines Raums in eine frische Liste
    ///
    /// Das Lock ist beim Zurueckgeben bereits freigegeben.
    pub fn schnappschuss(&self, raum_id: &str) -> Vec<T> {
        let raeume = self.raeume.read();
        match raeume.get(raum_id) {
            Some(abonnenten) => abonnenten.values().map(|a| a.handle.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Anzahl der Abonnenten eines Raums
    pub fn abonnenten_anzahl(&self, raum_id: &str) -> usize {
        self.raeume.read().get(raum_id).map_or(0, |a| a.len())
    }

    /// Anzahl der Raeume mit mindestens einem Abonnenten
    pub fn raum_anzahl(&self) -> usize {
        self.raeume.read().len()
    }
}

impl<T: Clone> Default for StreamVerteiler<T> {
    fn default() -> Self {
        Self::neu()
    }
}
