//! Aufloesung der Aufrufer-Identitaet aus gRPC-Metadaten
//!
//! Jeder Handler ausser `Login` ruft `benutzer_aus_metadata` als Erstes
//! auf. Die Identitaet stammt vollstaendig aus den signierten Claims –
//! kein Datenbankzugriff auf dem heissen Pfad.

use stillepost_auth::TokenDienst;
use stillepost_core::Rolle;
use tonic::metadata::MetadataMap;
use tonic::Status;

/// Leichtgewichtige Identitaet eines authentifizierten Aufrufers
#[derive(Debug, Clone)]
pub struct AuthBenutzer {
    pub id: String,
    pub rolle: Rolle,
    pub email: String,
}

/// Liest und prueft den Bearer-Token aus den Request-Metadaten
///
/// Ein optionales `Bearer `-Praefix wird toleriert. Fehlende oder
/// ungueltige Tokens geben `UNAUTHENTICATED` zurueck.
pub fn benutzer_aus_metadata(
    metadata: &MetadataMap,
    token_dienst: &TokenDienst,
) -> Result<AuthBenutzer, Status> {
    let wert = metadata
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Status::unauthenticated("Authorization-Metadaten fehlen"))?;

    let token = wert.strip_prefix("Bearer ").unwrap_or(wert);

    let anspruch = token_dienst
        .verifizieren(token)
        .map_err(|e| Status::unauthenticated(format!("Token ungueltig: {e}")))?;

    Ok(AuthBenutzer {
        id: anspruch.user_id,
        rolle: anspruch.role,
        email: anspruch.email,
    })
}
