//! Fehlertypen fuer die Authentifizierung

use thiserror::Error;

/// Alle moeglichen Fehler bei Token-Pruefung und Passwort-Hashing
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Token ---
    #[error("Token abgelaufen")]
    TokenAbgelaufen,

    #[error("Token-Signatur ungueltig")]
    TokenSignaturUngueltig,

    #[error("Token fehlerhaft: {0}")]
    TokenFehlerhaft(String),

    // --- Passwort ---
    #[error("Passwort-Hashing fehlgeschlagen: {0}")]
    PasswortHashing(String),

    // --- Konfiguration ---
    #[error("Token-Geheimnis fehlt oder ist leer")]
    GeheimnisFehlt,
}

impl AuthError {
    pub fn fehlerhaft(msg: impl Into<String>) -> Self {
        Self::TokenFehlerhaft(msg.into())
    }
}

/// Result-Alias fuer die Authentifizierung
pub type AuthResult<T> = Result<T, AuthError>;
