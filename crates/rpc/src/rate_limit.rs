//! Rate Limiter fuer die gRPC-Oberflaeche
//!
//! Token-Bucket pro Peer-IP (nur der IP-Anteil der Adresse). Neue Peers
//! bekommen beim ersten Kontakt einen vollen Bucket; ein Hintergrund-Task
//! entfernt Eintraege, die laenger als drei Minuten nicht gesehen wurden.
//! Der Interceptor laeuft vor jedem Handler, unaer wie Stream.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tonic::{service::Interceptor, Request, Status};

/// Eviction-Schwelle: Peers ohne Kontakt seit dieser Dauer fliegen raus
const EVICTION_SCHWELLE: Duration = Duration::from_secs(3 * 60);

/// Intervall des Aufraeum-Tasks
const AUFRAEUM_INTERVALL: Duration = Duration::from_secs(60);

/// Konfiguration fuer den Rate Limiter
#[derive(Debug, Clone)]
pub struct RateLimitKonfig {
    /// Nachhaltige Rate in Anfragen pro Sekunde
    pub anfragen_pro_sekunde: u32,
    /// Maximaler Burst (= Bucket-Groesse)
    pub burst: u32,
}

impl Default for RateLimitKonfig {
    fn default() -> Self {
        Self {
            anfragen_pro_sekunde: 5,
            burst: 10,
        }
    }
}

/// Ein Token-Bucket fuer einen einzelnen Peer
#[derive(Debug)]
struct TokenBucket {
    /// Aktuelle Token-Anzahl (f64 fuer Bruchteil-Auffuellung)
    token: f64,
    max_token: f64,
    /// Auffuellrate in Token pro Sekunde
    fuellrate: f64,
    letzte_auffuellung: Instant,
}

impl TokenBucket {
    fn neu(konfig: &RateLimitKonfig) -> Self {
        Self {
            token: konfig.burst as f64,
            max_token: konfig.burst as f64,
            fuellrate: konfig.anfragen_pro_sekunde as f64,
            letzte_auffuellung: Instant::now(),
        }
    }

    /// Versucht ein Token zu verbrauchen. Gibt `true` zurueck wenn erlaubt.
    fn verbrauchen(&mut self) -> bool {
        self.auffuellen();
        if self.token >= 1.0 {
            self.token -= 1.0;
            true
        } else {
            false
        }
    }

    fn auffuellen(&mut self) {
        let jetzt = Instant::now();
        let vergangen = jetzt.duration_since(self.letzte_auffuellung).as_secs_f64();
        self.token = (self.token + vergangen * self.fuellrate).min(self.max_token);
        self.letzte_auffuellung = jetzt;
    }
}

/// Buchfuehrung pro Peer: Bucket plus Zeitstempel fuer die Eviction
#[derive(Debug)]
struct Besucher {
    bucket: TokenBucket,
    zuletzt_gesehen: Instant,
}

/// Rate Limiter mit Token-Bucket pro Peer-IP
pub struct RateLimiter {
    konfig: RateLimitKonfig,
    besucher: Mutex<HashMap<String, Besucher>>,
}

impl RateLimiter {
    pub fn neu(konfig: RateLimitKonfig) -> Arc<Self> {
        Arc::new(Self {
            konfig,
            besucher: Mutex::new(HashMap::new()),
        })
    }

    /// Startet den periodischen Aufraeum-Task und gibt den Limiter zurueck
    pub fn mit_aufraeum_task(limiter: Arc<Self>) -> Arc<Self> {
        let klon = Arc::clone(&limiter);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(AUFRAEUM_INTERVALL).await;
                let entfernt = klon.aufraeumen();
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Inaktive Rate-Limit-Eintraege entfernt");
                }
            }
        });
        limiter
    }

    /// Verbraucht atomar ein Token fuer den Peer; legt den Bucket beim
    /// ersten Kontakt an und aktualisiert `zuletzt_gesehen`
    pub fn erlauben(&self, peer: &str) -> bool {
        let mut besucher = self.besucher.lock();
        let eintrag = besucher
            .entry(peer.to_string())
            .or_insert_with(|| Besucher {
                bucket: TokenBucket::neu(&self.konfig),
                zuletzt_gesehen: Instant::now(),
            });
        eintrag.zuletzt_gesehen = Instant::now();
        eintrag.bucket.verbrauchen()
    }

    /// Entfernt Eintraege ueber der Eviction-Schwelle; gibt die Anzahl
    /// der entfernten Eintraege zurueck
    pub fn aufraeumen(&self) -> usize {
        let jetzt = Instant::now();
        let mut besucher = self.besucher.lock();
        let vorher = besucher.len();
        besucher.retain(|_, b| jetzt.duration_since(b.zuletzt_gesehen) < EVICTION_SCHWELLE);
        vorher - besucher.len()
    }

    /// Anzahl der aktuell bekannten Peers
    pub fn besucher_anzahl(&self) -> usize {
        self.besucher.lock().len()
    }
}

/// Extrahiert den IP-Anteil einer Peer-Adresse
pub fn ip_aus_adresse(adresse: Option<SocketAddr>) -> String {
    match adresse {
        Some(addr) => addr.ip().to_string(),
        None => "unbekannt".to_string(),
    }
}

/// Interceptor: prueft das Rate-Limit vor jedem Handler
#[derive(Clone)]
pub struct RateLimitAbfang {
    limiter: Arc<RateLimiter>,
}

impl RateLimitAbfang {
    pub fn neu(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Interceptor for RateLimitAbfang {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        let ip = ip_aus_adresse(request.remote_addr());
        if !self.limiter.erlauben(&ip) {
            return Err(Status::resource_exhausted("Zu viele Anfragen, bitte langsamer"));
        }
        Ok(request)
    }
}
