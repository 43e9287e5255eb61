//! gRPC-Server fuer Stillepost
//!
//! Startet den tonic-Server mit TLS (Server-Zertifikat), optional mTLS
//! (zusaetzliches CA-Buendel fuer Client-Zertifikate) oder Klartext-HTTP/2,
//! wenn ein vorgelagerter Terminator die Verschluesselung uebernimmt.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

use crate::dienst::ChatDienst;
use crate::proto::chat_service_server::ChatServiceServer;
use crate::rate_limit::{RateLimitAbfang, RateLimiter};

/// TLS-Material fuer den Server
#[derive(Debug, Clone)]
pub struct TlsKonfig {
    pub zertifikat: PathBuf,
    pub schluessel: PathBuf,
    /// CA-Buendel zum Pruefen von Client-Zertifikaten (mTLS); optional
    pub client_ca: Option<PathBuf>,
}

/// gRPC-Server-Konfiguration
#[derive(Debug, Clone)]
pub struct GrpcServerKonfig {
    pub bind_addr: SocketAddr,
    /// `None` bedeutet Klartext-HTTP/2 hinter einem Terminator
    pub tls: Option<TlsKonfig>,
}

/// Der gRPC-Server
pub struct GrpcServer {
    konfig: GrpcServerKonfig,
}

impl GrpcServer {
    pub fn neu(konfig: GrpcServerKonfig) -> Self {
        Self { konfig }
    }

    /// Startet den Server; kehrt erst beim Herunterfahren zurueck
    pub async fn starten(self, dienst: ChatDienst, limiter: Arc<RateLimiter>) -> Result<()> {
        let mut builder = Server::builder();

        match &self.konfig.tls {
            Some(tls) => {
                let zertifikat = tokio::fs::read(&tls.zertifikat)
                    .await
                    .with_context(|| format!("TLS-Zertifikat nicht lesbar: {:?}", tls.zertifikat))?;
                let schluessel = tokio::fs::read(&tls.schluessel)
                    .await
                    .with_context(|| format!("TLS-Schluessel nicht lesbar: {:?}", tls.schluessel))?;

                let mut tls_config =
                    ServerTlsConfig::new().identity(Identity::from_pem(zertifikat, schluessel));

                if let Some(ca_pfad) = &tls.client_ca {
                    let ca = tokio::fs::read(ca_pfad)
                        .await
                        .with_context(|| format!("CA-Buendel nicht lesbar: {ca_pfad:?}"))?;
                    tls_config = tls_config.client_ca_root(Certificate::from_pem(ca));
                    tracing::info!("mTLS aktiv, Client-Zertifikate werden geprueft");
                }

                builder = builder.tls_config(tls_config)?;
                tracing::info!(addr = %self.konfig.bind_addr, "gRPC-Server gestartet (TLS)");
            }
            None => {
                tracing::warn!(
                    addr = %self.konfig.bind_addr,
                    "TLS deaktiviert, Klartext-HTTP/2 erwartet vorgelagerten Terminator"
                );
            }
        }

        builder
            .add_service(ChatServiceServer::with_interceptor(
                dienst,
                RateLimitAbfang::neu(limiter),
            ))
            .serve(self.konfig.bind_addr)
            .await?;

        Ok(())
    }
}
