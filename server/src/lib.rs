//! stillepost-server – Verdrahtung
//!
//! Baut aus der Konfiguration alle Teile zusammen: Datenbank, Token-Dienst,
//! Rate Limiter, Stream-Verteiler, Speicher-Warteschlange samt Worker,
//! Wartungs-Worker und schliesslich den gRPC-Server.

pub mod config;
pub mod firstuse;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use stillepost_auth::TokenDienst;
use stillepost_chat::{
    prune_worker, raum_reaper, speicher_warteschlange, speicher_worker, StreamVerteiler,
};
use stillepost_db::{DatabaseConfig, SqliteDb};
use stillepost_rpc::{
    ChatDienst, GrpcServer, GrpcServerKonfig, RateLimitKonfig, RateLimiter, TlsKonfig,
};

use config::ServerConfig;

/// Der zusammengesetzte Server
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Worker und den gRPC-Server; kehrt erst beim
    /// Herunterfahren zurueck
    pub async fn starten(self) -> Result<()> {
        let db = Arc::new(datenbank_oeffnen(&self.config).await?);

        let token_dienst = Arc::new(TokenDienst::neu(&self.config.auth.jwt_geheimnis)?);

        let limiter = RateLimiter::mit_aufraeum_task(RateLimiter::neu(RateLimitKonfig {
            anfragen_pro_sekunde: self.config.rate_limit.anfragen_pro_sekunde,
            burst: self.config.rate_limit.burst,
        }));

        let verteiler = Arc::new(StreamVerteiler::neu());

        // Speicher-Pfad: begrenzte Warteschlange mit einem Konsumenten
        let (speicher, speicher_rx) =
            speicher_warteschlange(self.config.wartung.warteschlange_kapazitaet);
        tokio::spawn(speicher_worker(Arc::clone(&db), speicher_rx));

        // Periodische Wartung
        tokio::spawn(prune_worker(
            Arc::clone(&db),
            Duration::from_secs(self.config.wartung.prune_intervall_secs),
            self.config.wartung.prune_behalten,
        ));
        tokio::spawn(raum_reaper(
            Arc::clone(&db),
            Duration::from_secs(self.config.wartung.reaper_intervall_secs),
            Duration::from_secs(self.config.wartung.reaper_schwelle_secs),
        ));

        let dienst = ChatDienst::neu(db, token_dienst, verteiler, speicher);

        let bind_addr = self
            .config
            .grpc_bind_adresse()
            .parse()
            .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse: {e}"))?;

        let tls = if self.config.netzwerk.tls_deaktiviert {
            None
        } else {
            Some(TlsKonfig {
                zertifikat: self.config.netzwerk.tls_zertifikat.clone().into(),
                schluessel: self.config.netzwerk.tls_schluessel.clone().into(),
                client_ca: self.config.netzwerk.tls_client_ca.clone().map(Into::into),
            })
        };

        GrpcServer::neu(GrpcServerKonfig { bind_addr, tls })
            .starten(dienst, limiter)
            .await
    }
}

/// Oeffnet die Datenbank und fuehrt Migrationen aus
pub async fn datenbank_oeffnen(config: &ServerConfig) -> Result<SqliteDb> {
    let db = SqliteDb::oeffnen(&DatabaseConfig {
        url: config.datenbank.dsn.clone(),
        max_verbindungen: config.datenbank.max_verbindungen,
        sqlite_wal: true,
    })
    .await?;
    Ok(db)
}
