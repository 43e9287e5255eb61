//! Server-Konfiguration
//!
//! Wird beim Start aus Umgebungsvariablen geladen. Pflicht ist einzig
//! `JWT_SECRET`; alle anderen Werte haben sinnvolle Standardwerte, sodass
//! der Server in der Entwicklung ohne weitere Umgebung lauffaehig ist.

use anyhow::{bail, Context, Result};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub netzwerk: NetzwerkEinstellungen,
    pub datenbank: DatenbankEinstellungen,
    pub auth: AuthEinstellungen,
    pub rate_limit: RateLimitEinstellungen,
    pub wartung: WartungEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse
    pub bind_adresse: String,
    /// Port fuer gRPC (`PORT`)
    pub port: u16,
    /// Klartext-HTTP/2 statt TLS (`DISABLE_TLS`); erwartet einen
    /// vorgelagerten Terminator
    pub tls_deaktiviert: bool,
    /// Pfad zum Server-Zertifikat (`TLS_CERT`)
    pub tls_zertifikat: String,
    /// Pfad zum Server-Schluessel (`TLS_KEY`)
    pub tls_schluessel: String,
    /// CA-Buendel fuer mTLS (`TLS_CLIENT_CA`); leer = kein mTLS
    pub tls_client_ca: Option<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8080,
            tls_deaktiviert: false,
            tls_zertifikat: "data/server-cert.pem".into(),
            tls_schluessel: "data/server-key.pem".into(),
            tls_client_ca: None,
        }
    }
}

/// Datenbank-Einstellungen
#[derive(Debug, Clone)]
pub struct DatenbankEinstellungen {
    /// Verbindungs-URL (`DB_DSN`); im Produktivbetrieb zwingend gesetzt
    pub dsn: String,
    /// Maximale Verbindungspool-Groesse
    pub max_verbindungen: u32,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            dsn: "sqlite://stillepost.db".into(),
            max_verbindungen: 5,
        }
    }
}

/// Authentifizierungs-Einstellungen
#[derive(Debug, Clone, Default)]
pub struct AuthEinstellungen {
    /// HMAC-Geheimnis fuer Bearer-Tokens (`JWT_SECRET`, Pflicht)
    pub jwt_geheimnis: String,
}

/// Rate-Limit-Einstellungen
#[derive(Debug, Clone)]
pub struct RateLimitEinstellungen {
    /// Nachhaltige Rate pro Peer (`RATE_LIMIT_RPS`)
    pub anfragen_pro_sekunde: u32,
    /// Burst pro Peer (`RATE_LIMIT_BURST`)
    pub burst: u32,
}

impl Default for RateLimitEinstellungen {
    fn default() -> Self {
        Self {
            anfragen_pro_sekunde: 5,
            burst: 10,
        }
    }
}

/// Einstellungen der Hintergrund-Worker
#[derive(Debug, Clone)]
pub struct WartungEinstellungen {
    /// Abstand der Prune-Durchlaeufe in Sekunden (`PRUNE_INTERVAL_SECS`)
    pub prune_intervall_secs: u64,
    /// Wie viele Nachrichten pro Raum ueberleben (`PRUNE_KEEP`)
    pub prune_behalten: i64,
    /// Abstand der Reaper-Durchlaeufe in Sekunden (`REAPER_INTERVAL_SECS`)
    pub reaper_intervall_secs: u64,
    /// Inaktivitaets-Schwelle in Sekunden (`REAPER_STALE_SECS`)
    pub reaper_schwelle_secs: u64,
    /// Kapazitaet der Speicher-Warteschlange (`SAVE_QUEUE_CAPACITY`)
    pub warteschlange_kapazitaet: usize,
}

impl Default for WartungEinstellungen {
    fn default() -> Self {
        let standard = stillepost_chat::WartungsKonfig::default();
        Self {
            prune_intervall_secs: standard.prune_intervall.as_secs(),
            prune_behalten: standard.prune_behalten,
            reaper_intervall_secs: standard.reaper_intervall.as_secs(),
            reaper_schwelle_secs: standard.reaper_schwelle.as_secs(),
            warteschlange_kapazitaet: stillepost_chat::speicher::WARTESCHLANGE_KAPAZITAET,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone)]
pub struct LoggingEinstellungen {
    /// Log-Level (`LOG_LEVEL`): "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format (`LOG_FORMAT`): "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus der Umgebung
    ///
    /// Bricht ab, wenn `JWT_SECRET` fehlt – ohne Geheimnis gibt es keine
    /// pruefbaren Tokens.
    pub fn aus_umgebung() -> Result<Self> {
        let jwt_geheimnis = match std::env::var("JWT_SECRET") {
            Ok(wert) if !wert.is_empty() => wert,
            _ => bail!("JWT_SECRET ist nicht gesetzt; der Server startet nicht ohne Token-Geheimnis"),
        };

        let standard = Self::default();

        let dsn = match std::env::var("DB_DSN") {
            Ok(wert) if !wert.is_empty() => wert,
            _ => {
                eprintln!(
                    "WARNUNG: DB_DSN nicht gesetzt, verwende Entwicklungs-Standard '{}'",
                    standard.datenbank.dsn
                );
                standard.datenbank.dsn.clone()
            }
        };

        Ok(Self {
            netzwerk: NetzwerkEinstellungen {
                bind_adresse: env_oder("BIND_ADDRESS", &standard.netzwerk.bind_adresse),
                port: env_zahl("PORT", standard.netzwerk.port)?,
                tls_deaktiviert: env_bool("DISABLE_TLS"),
                tls_zertifikat: env_oder("TLS_CERT", &standard.netzwerk.tls_zertifikat),
                tls_schluessel: env_oder("TLS_KEY", &standard.netzwerk.tls_schluessel),
                tls_client_ca: std::env::var("TLS_CLIENT_CA").ok().filter(|s| !s.is_empty()),
            },
            datenbank: DatenbankEinstellungen {
                dsn,
                max_verbindungen: env_zahl("DB_MAX_CONNECTIONS", standard.datenbank.max_verbindungen)?,
            },
            auth: AuthEinstellungen { jwt_geheimnis },
            rate_limit: RateLimitEinstellungen {
                anfragen_pro_sekunde: env_zahl("RATE_LIMIT_RPS", standard.rate_limit.anfragen_pro_sekunde)?,
                burst: env_zahl("RATE_LIMIT_BURST", standard.rate_limit.burst)?,
            },
            wartung: WartungEinstellungen {
                prune_intervall_secs: env_zahl("PRUNE_INTERVAL_SECS", standard.wartung.prune_intervall_secs)?,
                prune_behalten: env_zahl("PRUNE_KEEP", standard.wartung.prune_behalten)?,
                reaper_intervall_secs: env_zahl("REAPER_INTERVAL_SECS", standard.wartung.reaper_intervall_secs)?,
                reaper_schwelle_secs: env_zahl("REAPER_STALE_SECS", standard.wartung.reaper_schwelle_secs)?,
                warteschlange_kapazitaet: env_zahl("SAVE_QUEUE_CAPACITY", standard.wartung.warteschlange_kapazitaet)?,
            },
            logging: LoggingEinstellungen {
                level: env_oder("LOG_LEVEL", &standard.logging.level),
                format: env_oder("LOG_FORMAT", &standard.logging.format),
            },
        })
    }

    /// Gibt die vollstaendige Bind-Adresse fuer gRPC zurueck
    pub fn grpc_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }
}

fn env_oder(name: &str, standard: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| standard.to_string())
}

fn env_zahl<T: std::str::FromStr>(name: &str, standard: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(wert) if !wert.is_empty() => wert
            .parse::<T>()
            .with_context(|| format!("{name} ist keine gueltige Zahl: '{wert}'")),
        _ => Ok(standard),
    }
}

fn env_bool(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}
