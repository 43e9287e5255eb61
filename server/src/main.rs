//! Stillepost Server – Einstiegspunkt
//!
//! Laedt die Konfiguration aus der Umgebung, initialisiert das Logging und
//! startet den Server. Mit `--firstuse` wird stattdessen interaktiv der
//! erste Admin-Benutzer angelegt und der Prozess beendet.

use anyhow::Result;
use stillepost_server::{config::ServerConfig, datenbank_oeffnen, firstuse, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::aus_umgebung()?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Stillepost Server wird initialisiert"
    );

    if std::env::args().any(|arg| arg == "--firstuse") {
        let db = datenbank_oeffnen(&config).await?;
        firstuse::ersten_admin_anlegen(&db).await?;
        return Ok(());
    }

    let server = Server::neu(config);
    server.starten().await?;

    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
