//! stillepost-auth – Authentifizierung
//!
//! Zustandsloser Token-Dienst (HMAC-SHA256-signierte Bearer-Tokens) und
//! Passwort-Hashing. Die Tokens tragen alle Angaben, die der heisse Pfad
//! braucht (ID, Rolle, E-Mail) – kein Datenbankzugriff bei der Pruefung.

pub mod error;
pub mod password;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use password::{passwort_hashen, passwort_verifizieren};
pub use token::{TokenAnspruch, TokenDienst};
