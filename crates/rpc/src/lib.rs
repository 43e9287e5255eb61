//! stillepost-rpc – gRPC-Oberflaeche
//!
//! Implementiert den ChatService: unaere Katalog-Operationen (Login,
//! Benutzerverwaltung, Raumbeitritt) und den bidirektionalen Nachrichten-
//! Stream. Rate-Limiting laeuft als Interceptor vor jedem Handler; die
//! Token-Pruefung macht jeder Handler selbst (Login ist die einzige
//! oeffentliche Methode).

pub mod dienst;
pub mod rate_limit;
pub mod server;
pub mod zugriff;

// Generierter Code aus tonic-build
pub mod proto {
    tonic::include_proto!("stillepost.v1");
}

pub use dienst::ChatDienst;
pub use rate_limit::{RateLimitAbfang, RateLimitKonfig, RateLimiter};
pub use server::{GrpcServer, GrpcServerKonfig, TlsKonfig};
pub use zugriff::{benutzer_aus_metadata, AuthBenutzer};
