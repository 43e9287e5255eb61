//! Zustandsloser Token-Dienst
//!
//! Stellt Bearer-Tokens im Format `v1.<claims>.<signatur>` aus und prueft
//! sie. Die Claims (ID, Rolle, E-Mail, Zeitstempel, Aussteller) stecken
//! URL-sicher Base64-kodiert im Token selbst und sind mit HMAC-SHA256
//! signiert. Eine fruehere Variante hat den Benutzer bei jedem Aufruf aus
//! der Datenbank geladen; die signierten Claims ersetzen diesen Zugriff.
//!
//! Widerruf vor Ablauf ist damit nicht moeglich – die Lebensdauer ist auf
//! 24 Stunden begrenzt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use stillepost_core::Rolle;

use crate::error::{AuthError, AuthResult};

/// Token-Lebensdauer: 24 Stunden
const TOKEN_TTL_SEKUNDEN: i64 = 24 * 60 * 60;

/// Aussteller-Kennung in jedem Token
const AUSSTELLER: &str = "stillepost-server";

/// Versionspraefix des Token-Formats
const TOKEN_VERSION: &str = "v1";

/// Die signierten Claims eines Bearer-Tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAnspruch {
    pub user_id: String,
    pub role: Rolle,
    pub email: String,
    /// Ausstellungszeitpunkt (Unix-Sekunden)
    pub iat: i64,
    /// Ablaufzeitpunkt (Unix-Sekunden)
    pub exp: i64,
    pub iss: String,
}

impl TokenAnspruch {
    /// Gibt `true` zurueck wenn der Token noch nicht abgelaufen ist
    pub fn ist_gueltig(&self) -> bool {
        Utc::now().timestamp() < self.exp
    }
}

/// Token-Dienst mit prozessweitem HMAC-Geheimnis
///
/// Das Geheimnis wird einmal beim Start geladen; ohne Geheimnis startet
/// der Server nicht.
pub struct TokenDienst {
    schluessel: Vec<u8>,
}

impl TokenDienst {
    pub fn neu(geheimnis: &str) -> AuthResult<Self> {
        if geheimnis.is_empty() {
            return Err(AuthError::GeheimnisFehlt);
        }
        Ok(Self {
            schluessel: geheimnis.as_bytes().to_vec(),
        })
    }

    /// Stellt einen neuen Token fuer einen Benutzer aus
    pub fn ausstellen(&self, user_id: &str, rolle: Rolle, email: &str) -> AuthResult<String> {
        let jetzt = Utc::now().timestamp();
        let anspruch = TokenAnspruch {
            user_id: user_id.to_string(),
            role: rolle,
            email: email.to_string(),
            iat: jetzt,
            exp: jetzt + TOKEN_TTL_SEKUNDEN,
            iss: AUSSTELLER.to_string(),
        };

        let payload = serde_json::to_vec(&anspruch)
            .map_err(|e| AuthError::fehlerhaft(format!("Claims nicht serialisierbar: {e}")))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let signatur = self.signieren(payload_b64.as_bytes());
        let signatur_b64 = URL_SAFE_NO_PAD.encode(signatur);

        Ok(format!("{TOKEN_VERSION}.{payload_b64}.{signatur_b64}"))
    }

    /// Prueft einen Token und gibt die Claims zurueck
    ///
    /// Reihenfolge: Format, Signatur, Aussteller, Ablauf. Die Signatur wird
    /// in konstanter Zeit verglichen.
    pub fn verifizieren(&self, token: &str) -> AuthResult<TokenAnspruch> {
        let teile: Vec<&str> = token.split('.').collect();
        if teile.len() != 3 || teile[0] != TOKEN_VERSION {
            return Err(AuthError::fehlerhaft("Unbekanntes Token-Format"));
        }

        let payload_b64 = teile[1];
        let erwartet = self.signieren(payload_b64.as_bytes());
        let erhalten = URL_SAFE_NO_PAD
            .decode(teile[2])
            .map_err(|_| AuthError::fehlerhaft("Signatur nicht Base64-dekodierbar"))?;

        if !konstante_zeit_gleich(&erwartet, &erhalten) {
            return Err(AuthError::TokenSignaturUngueltig);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::fehlerhaft("Claims nicht Base64-dekodierbar"))?;
        let anspruch: TokenAnspruch = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::fehlerhaft(format!("Claims nicht lesbar: {e}")))?;

        if anspruch.iss != AUSSTELLER {
            return Err(AuthError::fehlerhaft("Unbekannter Aussteller"));
        }
        if !anspruch.ist_gueltig() {
            return Err(AuthError::TokenAbgelaufen);
        }

        Ok(anspruch)
    }

    fn signieren(&self, daten: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.schluessel)
            .expect("HMAC akzeptiert Schluessel jeder Laenge");
        mac.update(daten);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Byteweiser Vergleich ohne fruehen Abbruch
fn konstante_zeit_gleich(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
