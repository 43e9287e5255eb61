//! ChatService-Implementierung
//!
//! Unaere Katalog-Operationen plus der bidirektionale Nachrichten-Stream.
//! Der Stream-Handler ist die Nachrichten-Ebene: Handshake (die erste
//! Frame nennt den Raum), Registrierung beim Verteiler, Empfangsschleife,
//! Fan-out auf den Registry-Schnappschuss und nicht-blockierendes
//! Einreihen in die Speicher-Warteschlange.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use stillepost_auth::{passwort_hashen, passwort_verifizieren, TokenDienst};
use stillepost_chat::{SpeicherAuftrag, SpeicherQueue, StreamVerteiler};
use stillepost_core::{benutzer_id_generieren, AppStatistiken, Rolle, Statistik};
use stillepost_db::models::{BenutzerRecord, NachrichtRecord, NeueNachricht, RaumRecord};
use stillepost_db::{Database, DbError, SqliteDb};

use crate::proto::chat_message::Payload;
use crate::proto::chat_service_server::ChatService;
use crate::proto::{
    ChatMessage, CreateUserRequest, CreateUserResponse, FileAction, JoinRoomRequest, LoginRequest,
    LoginResponse, MessageType, RoomResponse, UpdatePasswordRequest, UpdatePasswordResponse, User,
};
use crate::zugriff::{benutzer_aus_metadata, AuthBenutzer};

/// Groesse der Sende-Queue pro Stream-Abonnent
const SENDE_QUEUE_GROESSE: usize = 64;

/// Einheitliche Fehlermeldung fuer alle Login-Fehlschlaege; unbekannte
/// E-Mail und falsches Passwort bleiben ununterscheidbar
const ANMELDEDATEN_FALSCH: &str = "Ungueltige Anmeldedaten";

/// Handle auf die Sende-Queue eines Stream-Abonnenten
pub type AbonnentSender = mpsc::Sender<Result<ChatMessage, Status>>;

/// Der ChatService: Katalog plus Nachrichten-Ebene
#[derive(Clone)]
pub struct ChatDienst {
    db: Arc<SqliteDb>,
    token_dienst: Arc<TokenDienst>,
    verteiler: Arc<StreamVerteiler<AbonnentSender>>,
    speicher: SpeicherQueue,
    statistiken: Arc<RwLock<AppStatistiken>>,
}

impl ChatDienst {
    pub fn neu(
        db: Arc<SqliteDb>,
        token_dienst: Arc<TokenDienst>,
        verteiler: Arc<StreamVerteiler<AbonnentSender>>,
        speicher: SpeicherQueue,
    ) -> Self {
        Self {
            db,
            token_dienst,
            verteiler,
            speicher,
            statistiken: Arc::new(RwLock::new(AppStatistiken::new())),
        }
    }

    /// Verarbeitet eine eingehende Frame: Server-Zeitstempel, Fan-out,
    /// dann (ausser fuer Datei-Chunks) Einreihen in den Speicher-Pfad
    async fn nachricht_verarbeiten(&self, benutzer: &AuthBenutzer, mut frame: ChatMessage) {
        // Server-Zeit ist massgeblich; Clients koennen luegen
        frame.timestamp = Utc::now().timestamp();
        frame.user_id = benutzer.id.clone();
        frame.email = benutzer.email.clone();

        self.verteilen(&frame).await;

        if frame.r#type() == MessageType::FileChunk {
            // Chunks sind reine Durchleitung und werden nie persistiert
            return;
        }

        let Some(nachricht) = nachricht_aus_frame(benutzer, &frame) else {
            return;
        };
        self.speicher.einreihen(SpeicherAuftrag {
            raum_id: frame.room_id.clone(),
            nachricht,
        });
    }

    /// Sendet eine Frame an alle aktuellen Abonnenten ihres Raums
    ///
    /// Der Schnappschuss entsteht unter dem Registry-Lock, die Sends laufen
    /// ohne Lock. Fehler einzelner Abonnenten werden ignoriert; deren
    /// Empfangsschleife raeumt selbst auf.
    async fn verteilen(&self, frame: &ChatMessage) {
        let abonnenten = self.verteiler.schnappschuss(&frame.room_id);
        for abonnent in abonnenten {
            let _ = abonnent.send(Ok(frame.clone())).await;
        }
    }

    /// Vermerkt einen Zaehler-Messpunkt in der Server-Statistik
    fn statistik_erfassen(&self, name: &str) {
        self.statistiken
            .write()
            .entry(name.to_string())
            .or_default()
            .push(Statistik::jetzt(1.0));
    }

    /// Anzahl der Messpunkte einer Statistik (fuer Tests)
    pub fn statistik_anzahl(&self, name: &str) -> usize {
        self.statistiken.read().get(name).map_or(0, |v| v.len())
    }
}

#[tonic::async_trait]
impl ChatService for ChatDienst {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let anfrage = request.into_inner();
        if anfrage.email.is_empty() || anfrage.password.is_empty() {
            return Err(Status::invalid_argument("E-Mail und Passwort sind erforderlich"));
        }

        let benutzer = self
            .db
            .get_user_by_email(&anfrage.email)
            .await
            .map_err(db_fehler_zu_status)?
            .ok_or_else(|| Status::unauthenticated(ANMELDEDATEN_FALSCH))?;

        let korrekt = passwort_verifizieren(&anfrage.password, &benutzer.password_hash)
            .map_err(|_| Status::internal("Interner Authentifizierungsfehler"))?;
        if !korrekt {
            warn!(email = %anfrage.email, "Fehlgeschlagener Login-Versuch");
            return Err(Status::unauthenticated(ANMELDEDATEN_FALSCH));
        }

        self.statistik_erfassen("logins");

        let token = self
            .token_dienst
            .ausstellen(&benutzer.id, benutzer.role, &benutzer.email)
            .map_err(|_| Status::internal("Token konnte nicht ausgestellt werden"))?;

        info!(email = %benutzer.email, "Benutzer angemeldet");

        Ok(Response::new(LoginResponse {
            user: Some(proto_benutzer(&benutzer)),
            token,
        }))
    }

    async fn create_user(
        &self,
        request: Request<CreateUserRequest>,
    ) -> Result<Response<CreateUserResponse>, Status> {
        let aufrufer = benutzer_aus_metadata(request.metadata(), &self.token_dienst)?;
        if aufrufer.rolle != Rolle::Admin {
            return Err(Status::permission_denied("Nur Admins duerfen Benutzer anlegen"));
        }

        let anfrage = request.into_inner();
        if anfrage.email.is_empty() || anfrage.password.is_empty() {
            return Err(Status::invalid_argument("E-Mail und Passwort sind erforderlich"));
        }

        if self
            .db
            .get_user_by_email(&anfrage.email)
            .await
            .map_err(db_fehler_zu_status)?
            .is_some()
        {
            return Err(Status::already_exists("Benutzer mit dieser E-Mail existiert bereits"));
        }

        let hash = passwort_hashen(&anfrage.password)
            .map_err(|_| Status::internal("Passwort-Hashing fehlgeschlagen"))?;
        let neu = BenutzerRecord::neu(
            benutzer_id_generieren(),
            anfrage.email,
            anfrage.first_name,
            Rolle::aus_wire(&anfrage.role),
            hash,
        );

        self.db.store_user(&neu).await.map_err(db_fehler_zu_status)?;

        info!(
            admin = %aufrufer.email,
            email = %neu.email,
            rolle = %neu.role,
            "Admin hat neuen Benutzer angelegt"
        );

        Ok(Response::new(CreateUserResponse {
            success: true,
            user_id: neu.id,
            message: "Benutzer angelegt".into(),
        }))
    }

    async fn update_password(
        &self,
        request: Request<UpdatePasswordRequest>,
    ) -> Result<Response<UpdatePasswordResponse>, Status> {
        let aufrufer = benutzer_aus_metadata(request.metadata(), &self.token_dienst)?;
        let anfrage = request.into_inner();
        if anfrage.email.is_empty() || anfrage.new_password.is_empty() {
            return Err(Status::invalid_argument("E-Mail und neues Passwort sind erforderlich"));
        }

        let mut ziel = self
            .db
            .get_user_by_email(&anfrage.email)
            .await
            .map_err(db_fehler_zu_status)?
            .ok_or_else(|| Status::not_found("Benutzer nicht gefunden"))?;

        if aufrufer.rolle != Rolle::Admin {
            if aufrufer.email != ziel.email {
                return Err(Status::permission_denied(
                    "Nur das eigene Passwort darf geaendert werden",
                ));
            }
            let korrekt = passwort_verifizieren(&anfrage.old_password, &ziel.password_hash)
                .map_err(|_| Status::internal("Interner Authentifizierungsfehler"))?;
            if !korrekt {
                return Err(Status::unauthenticated("Altes Passwort falsch"));
            }
        }

        ziel.password_hash = passwort_hashen(&anfrage.new_password)
            .map_err(|_| Status::internal("Passwort-Hashing fehlgeschlagen"))?;
        ziel.updated_at = Utc::now();
        self.db.store_user(&ziel).await.map_err(db_fehler_zu_status)?;

        info!(email = %ziel.email, "Passwort geaendert");

        Ok(Response::new(UpdatePasswordResponse {
            success: true,
            message: "Passwort geaendert".into(),
        }))
    }

    async fn join_room(
        &self,
        request: Request<JoinRoomRequest>,
    ) -> Result<Response<RoomResponse>, Status> {
        let aufrufer = benutzer_aus_metadata(request.metadata(), &self.token_dienst)?;
        let anfrage = request.into_inner();
        if anfrage.room_name.is_empty() {
            return Err(Status::invalid_argument("Raumname ist erforderlich"));
        }

        let raum = match self
            .db
            .get_room(&anfrage.room_name)
            .await
            .map_err(db_fehler_zu_status)?
        {
            Some(raum) => raum,
            None => {
                let neu = RaumRecord::neu(&anfrage.room_name);
                self.db.store_room(&neu).await.map_err(db_fehler_zu_status)?;
                info!(raum = %neu.id, "Neuen Raum angelegt");
                neu
            }
        };

        // Historie und gespeicherte Raeume am authentifizierten Aufrufer
        // pflegen; ein Fehlschlag hier verhindert den Beitritt nicht
        match self.db.get_user_by_email(&aufrufer.email).await {
            Ok(Some(mut benutzer)) => {
                benutzer.raum_vermerken(&raum.id);
                if let Err(e) = self.db.store_user(&benutzer).await {
                    warn!(fehler = %e, "Benutzer-Historie konnte nicht gespeichert werden");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(fehler = %e, "Benutzer fuer Historien-Pflege nicht ladbar");
            }
        }

        let history = raum.nachrichten.iter().map(frame_aus_record).collect();

        Ok(Response::new(RoomResponse {
            room_id: raum.id,
            name: raum.name,
            success: true,
            history,
        }))
    }

    type StreamStream = Pin<Box<dyn Stream<Item = Result<ChatMessage, Status>> + Send + 'static>>;

    async fn stream(
        &self,
        request: Request<Streaming<ChatMessage>>,
    ) -> Result<Response<Self::StreamStream>, Status> {
        // Ohne gueltigen Token entsteht kein Registry-Eintrag
        let benutzer = benutzer_aus_metadata(request.metadata(), &self.token_dienst)?;
        let mut eingang = request.into_inner();

        let (tx, rx) = mpsc::channel::<Result<ChatMessage, Status>>(SENDE_QUEUE_GROESSE);
        let dienst = self.clone();

        tokio::spawn(async move {
            // Handshake: die erste Frame nennt den Raum; die Identitaet
            // kommt aus dem Token, nicht aus der Frame
            let erste = match eingang.message().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(status) => {
                    debug!(email = %benutzer.email, status = %status, "Stream vor Handshake beendet");
                    return;
                }
            };

            let raum_id = erste.room_id.clone();
            let marke = dienst.verteiler.registrieren(&raum_id, &benutzer.id, tx);
            info!(email = %benutzer.email, raum = %raum_id, "Stream verbunden");

            // Traegt die Handshake-Frame schon Inhalt, zaehlt sie als
            // erste Nachricht
            if erste.payload.is_some() {
                dienst.nachricht_verarbeiten(&benutzer, erste).await;
            }

            loop {
                match eingang.message().await {
                    Ok(Some(frame)) => dienst.nachricht_verarbeiten(&benutzer, frame).await,
                    Ok(None) => break,
                    Err(status) => {
                        debug!(email = %benutzer.email, status = %status, "Stream-Empfang fehlgeschlagen");
                        break;
                    }
                }
            }

            dienst.verteiler.deregistrieren(&raum_id, &benutzer.id, marke);
            info!(email = %benutzer.email, raum = %raum_id, "Stream getrennt");
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

fn db_fehler_zu_status(e: DbError) -> Status {
    match e {
        DbError::NichtGefunden(_) => Status::not_found(e.to_string()),
        _ if e.ist_eindeutigkeit() => Status::already_exists(e.to_string()),
        _ => Status::internal("Datenbankfehler"),
    }
}

fn proto_benutzer(b: &BenutzerRecord) -> User {
    User {
        id: b.id.clone(),
        email: b.email.clone(),
        first_name: b.name.clone(),
        role: b.role.als_str().to_string(),
        rooms: b.rooms.clone(),
        history: b.history.clone(),
    }
}

/// Baut aus einer Frame den internen Speicher-Datensatz
///
/// Text traegt den opaken Ciphertext unveraendert; Datei-Kontrollnachrichten
/// werden zu einem kompakten Deskriptor-String. Chunks und leere Payloads
/// ergeben keinen Datensatz.
fn nachricht_aus_frame(benutzer: &AuthBenutzer, frame: &ChatMessage) -> Option<NeueNachricht> {
    let inhalt = match &frame.payload {
        Some(Payload::MessageContent(text)) => text.clone(),
        Some(Payload::FileMeta(meta)) => format!(
            "FILE:{}|HASH:{}|ACTION:{}",
            meta.file_name,
            meta.file_hash,
            datei_aktion_als_str(meta.action())
        ),
        Some(Payload::DataChunk(_)) | None => return None,
    };

    Some(NeueNachricht {
        room_id: frame.room_id.clone(),
        user_id: benutzer.id.clone(),
        email: benutzer.email.clone(),
        inhalt,
        zeit: frame.timestamp.to_string(),
        reply_to: frame.reply_to.clone(),
        iv: frame.iv.clone(),
        hot_sauce: frame.hot_sauce.clone(),
    })
}

fn datei_aktion_als_str(aktion: FileAction) -> &'static str {
    match aktion {
        FileAction::Offer => "OFFER",
        FileAction::Accept => "ACCEPT",
    }
}

/// Rekonstruiert eine Frame aus einem persistierten Datensatz
/// (fuer die Historie beim Raumbeitritt)
fn frame_aus_record(record: &NachrichtRecord) -> ChatMessage {
    ChatMessage {
        room_id: record.room_id.clone(),
        user_id: record.user_id.clone(),
        email: record.email.clone(),
        timestamp: record.zeit.parse().unwrap_or(0),
        reply_to: record.reply_to.clone(),
        iv: record.iv.clone(),
        hot_sauce: record.hot_sauce.clone(),
        r#type: MessageType::Text as i32,
        payload: Some(Payload::MessageContent(record.inhalt.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::FileMeta;
    use stillepost_chat::speicher_warteschlange;
    use tokio::sync::mpsc::Receiver;

    async fn dienst() -> (ChatDienst, Receiver<SpeicherAuftrag>) {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let token_dienst = Arc::new(TokenDienst::neu("test-geheimnis").unwrap());
        let verteiler = Arc::new(StreamVerteiler::neu());
        let (queue, rx) = speicher_warteschlange(100);
        (ChatDienst::neu(db, token_dienst, verteiler, queue), rx)
    }

    async fn benutzer_anlegen(dienst: &ChatDienst, email: &str, passwort: &str, rolle: Rolle) {
        let record = BenutzerRecord::neu(
            benutzer_id_generieren(),
            email.into(),
            "Test".into(),
            rolle,
            passwort_hashen(passwort).unwrap(),
        );
        dienst.db.store_user(&record).await.unwrap();
    }

    fn anfrage_mit_token<T>(nachricht: T, token: &str) -> Request<T> {
        let mut request = Request::new(nachricht);
        request
            .metadata_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());
        request
    }

    async fn token_fuer(dienst: &ChatDienst, email: &str, passwort: &str) -> String {
        let antwort = dienst
            .login(Request::new(LoginRequest {
                email: email.into(),
                password: passwort.into(),
            }))
            .await
            .unwrap();
        antwort.into_inner().token
    }

    fn test_benutzer() -> AuthBenutzer {
        AuthBenutzer {
            id: "u1".into(),
            rolle: Rolle::User,
            email: "alice@example.com".into(),
        }
    }

    // -- Login --------------------------------------------------------------

    #[tokio::test]
    async fn login_erfolgreich() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "pw123", Rolle::User).await;

        let antwort = dienst
            .login(Request::new(LoginRequest {
                email: "alice@example.com".into(),
                password: "pw123".into(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(!antwort.token.is_empty());
        assert_eq!(antwort.user.unwrap().email, "alice@example.com");
        assert_eq!(dienst.statistik_anzahl("logins"), 1);
    }

    #[tokio::test]
    async fn login_fehlschlaege_sind_ununterscheidbar() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "pw123", Rolle::User).await;

        let unbekannt = dienst
            .login(Request::new(LoginRequest {
                email: "niemand@example.com".into(),
                password: "egal".into(),
            }))
            .await
            .unwrap_err();
        let falsches_pw = dienst
            .login(Request::new(LoginRequest {
                email: "alice@example.com".into(),
                password: "falsch".into(),
            }))
            .await
            .unwrap_err();

        assert_eq!(unbekannt.code(), tonic::Code::Unauthenticated);
        assert_eq!(falsches_pw.code(), tonic::Code::Unauthenticated);
        assert_eq!(
            unbekannt.message(),
            falsches_pw.message(),
            "Unbekannte E-Mail und falsches Passwort muessen gleich aussehen"
        );
    }

    #[tokio::test]
    async fn login_ohne_felder_abgelehnt() {
        let (dienst, _rx) = dienst().await;
        let status = dienst
            .login(Request::new(LoginRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    // -- CreateUser ---------------------------------------------------------

    #[tokio::test]
    async fn create_user_nur_fuer_admins() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "user@example.com", "pw", Rolle::User).await;
        let token = token_fuer(&dienst, "user@example.com", "pw").await;

        let status = dienst
            .create_user(anfrage_mit_token(
                CreateUserRequest {
                    email: "neu@example.com".into(),
                    password: "pw".into(),
                    first_name: "Neu".into(),
                    role: "user".into(),
                },
                &token,
            ))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::PermissionDenied);
        assert!(dienst
            .db
            .get_user_by_email("neu@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_user_und_login_round_trip() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "admin@example.com", "admin_pw", Rolle::Admin).await;
        let token = token_fuer(&dienst, "admin@example.com", "admin_pw").await;

        let antwort = dienst
            .create_user(anfrage_mit_token(
                CreateUserRequest {
                    email: "neu@example.com".into(),
                    password: "neues_pw".into(),
                    first_name: "Neu".into(),
                    role: "user".into(),
                },
                &token,
            ))
            .await
            .unwrap()
            .into_inner();
        assert!(antwort.success);
        assert_eq!(antwort.user_id.len(), 32);

        // Frisch angelegter Benutzer kann sich anmelden
        let login = dienst
            .login(Request::new(LoginRequest {
                email: "neu@example.com".into(),
                password: "neues_pw".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(login.user.unwrap().role, "user");

        // Doppeltes Anlegen scheitert
        let status = dienst
            .create_user(anfrage_mit_token(
                CreateUserRequest {
                    email: "neu@example.com".into(),
                    password: "anderes".into(),
                    first_name: "Nochmal".into(),
                    role: "user".into(),
                },
                &token,
            ))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn create_user_ohne_token_abgelehnt() {
        let (dienst, _rx) = dienst().await;
        let status = dienst
            .create_user(Request::new(CreateUserRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    // -- UpdatePassword -----------------------------------------------------

    #[tokio::test]
    async fn eigenes_passwort_mit_altem_passwort_aendern() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "alt", Rolle::User).await;
        let token = token_fuer(&dienst, "alice@example.com", "alt").await;

        dienst
            .update_password(anfrage_mit_token(
                UpdatePasswordRequest {
                    email: "alice@example.com".into(),
                    old_password: "alt".into(),
                    new_password: "neu".into(),
                },
                &token,
            ))
            .await
            .unwrap();

        assert!(dienst
            .login(Request::new(LoginRequest {
                email: "alice@example.com".into(),
                password: "neu".into(),
            }))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn falsches_altes_passwort_abgelehnt() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "alt", Rolle::User).await;
        let token = token_fuer(&dienst, "alice@example.com", "alt").await;

        let status = dienst
            .update_password(anfrage_mit_token(
                UpdatePasswordRequest {
                    email: "alice@example.com".into(),
                    old_password: "falsch".into(),
                    new_password: "neu".into(),
                },
                &token,
            ))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn fremdes_passwort_nur_als_admin() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "pw_a", Rolle::User).await;
        benutzer_anlegen(&dienst, "bob@example.com", "pw_b", Rolle::User).await;
        benutzer_anlegen(&dienst, "admin@example.com", "pw_adm", Rolle::Admin).await;

        // Alice darf Bobs Passwort nicht aendern
        let alice_token = token_fuer(&dienst, "alice@example.com", "pw_a").await;
        let status = dienst
            .update_password(anfrage_mit_token(
                UpdatePasswordRequest {
                    email: "bob@example.com".into(),
                    old_password: "pw_b".into(),
                    new_password: "gekapert".into(),
                },
                &alice_token,
            ))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        // Der Admin darf, ohne altes Passwort
        let admin_token = token_fuer(&dienst, "admin@example.com", "pw_adm").await;
        dienst
            .update_password(anfrage_mit_token(
                UpdatePasswordRequest {
                    email: "bob@example.com".into(),
                    old_password: String::new(),
                    new_password: "zurueckgesetzt".into(),
                },
                &admin_token,
            ))
            .await
            .unwrap();

        assert!(dienst
            .login(Request::new(LoginRequest {
                email: "bob@example.com".into(),
                password: "zurueckgesetzt".into(),
            }))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unbekanntes_ziel_gibt_not_found() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "admin@example.com", "pw", Rolle::Admin).await;
        let token = token_fuer(&dienst, "admin@example.com", "pw").await;

        let status = dienst
            .update_password(anfrage_mit_token(
                UpdatePasswordRequest {
                    email: "geist@example.com".into(),
                    old_password: String::new(),
                    new_password: "egal".into(),
                },
                &token,
            ))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    // -- JoinRoom -----------------------------------------------------------

    #[tokio::test]
    async fn join_room_legt_raum_an_und_pflegt_historie() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "pw", Rolle::User).await;
        let token = token_fuer(&dienst, "alice@example.com", "pw").await;

        let antwort = dienst
            .join_room(anfrage_mit_token(
                JoinRoomRequest {
                    email: "alice@example.com".into(),
                    room_name: "raum42".into(),
                },
                &token,
            ))
            .await
            .unwrap()
            .into_inner();

        assert!(antwort.success);
        assert_eq!(antwort.room_id, "raum42");
        assert!(antwort.history.is_empty());

        let raum = dienst.db.get_room("raum42").await.unwrap().unwrap();
        assert_eq!(raum.max_messages, 1000);

        let benutzer = dienst
            .db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(benutzer.history, vec!["raum42"]);
        assert_eq!(benutzer.rooms, vec!["raum42"]);
    }

    #[tokio::test]
    async fn join_room_zweimal_ist_idempotent() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "pw", Rolle::User).await;
        let token = token_fuer(&dienst, "alice@example.com", "pw").await;

        for _ in 0..2 {
            dienst
                .join_room(anfrage_mit_token(
                    JoinRoomRequest {
                        email: "alice@example.com".into(),
                        room_name: "raum42".into(),
                    },
                    &token,
                ))
                .await
                .unwrap();
        }

        let benutzer = dienst
            .db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(benutzer.history, vec!["raum42"]);
        assert_eq!(benutzer.rooms, vec!["raum42"]);
    }

    #[tokio::test]
    async fn join_room_liefert_historie() {
        let (dienst, _rx) = dienst().await;
        benutzer_anlegen(&dienst, "alice@example.com", "pw", Rolle::User).await;
        let token = token_fuer(&dienst, "alice@example.com", "pw").await;

        dienst.db.store_room(&RaumRecord::neu("raum42")).await.unwrap();
        dienst
            .db
            .store_message(
                "raum42",
                &NeueNachricht {
                    room_id: "raum42".into(),
                    user_id: "u9".into(),
                    email: "bob@example.com".into(),
                    inhalt: "aGFsbG8=".into(),
                    zeit: "1700000000".into(),
                    reply_to: String::new(),
                    iv: "AA==".into(),
                    hot_sauce: "k1".into(),
                },
            )
            .await
            .unwrap();

        let antwort = dienst
            .join_room(anfrage_mit_token(
                JoinRoomRequest {
                    email: "alice@example.com".into(),
                    room_name: "raum42".into(),
                },
                &token,
            ))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(antwort.history.len(), 1);
        let frame = &antwort.history[0];
        assert_eq!(frame.timestamp, 1_700_000_000);
        assert_eq!(frame.email, "bob@example.com");
        assert_eq!(frame.iv, "AA==");
        assert_eq!(frame.hot_sauce, "k1");
        assert!(matches!(
            frame.payload,
            Some(Payload::MessageContent(ref inhalt)) if inhalt == "aGFsbG8="
        ));
    }

    // -- Nachrichten-Ebene --------------------------------------------------

    #[tokio::test]
    async fn verarbeiten_stempelt_verteilt_und_reiht_ein() {
        let (dienst, mut rx) = dienst().await;
        let benutzer = test_benutzer();

        let (tx, mut abonnent_rx) = mpsc::channel(8);
        dienst.verteiler.registrieren("raum42", "u1", tx);

        let vorher = Utc::now().timestamp();
        let frame = ChatMessage {
            room_id: "raum42".into(),
            timestamp: 1, // Client-Zeit wird ueberschrieben
            iv: "AA==".into(),
            hot_sauce: "k1".into(),
            r#type: MessageType::Text as i32,
            payload: Some(Payload::MessageContent("aGFsbG8=".into())),
            ..Default::default()
        };
        dienst.nachricht_verarbeiten(&benutzer, frame).await;

        let empfangen = abonnent_rx.try_recv().unwrap().unwrap();
        assert!(empfangen.timestamp >= vorher, "Server-Zeit ist massgeblich");
        assert_eq!(empfangen.email, "alice@example.com");
        assert_eq!(empfangen.iv, "AA==");
        assert_eq!(empfangen.hot_sauce, "k1");

        let auftrag = rx.try_recv().expect("Nachricht muss eingereiht sein");
        assert_eq!(auftrag.raum_id, "raum42");
        assert_eq!(auftrag.nachricht.inhalt, "aGFsbG8=");
        assert_eq!(auftrag.nachricht.zeit, empfangen.timestamp.to_string());
    }

    #[tokio::test]
    async fn datei_chunk_wird_verteilt_aber_nie_eingereiht() {
        let (dienst, mut rx) = dienst().await;
        let benutzer = test_benutzer();

        let (tx, mut abonnent_rx) = mpsc::channel(8);
        dienst.verteiler.registrieren("raum42", "bob", tx);

        let frame = ChatMessage {
            room_id: "raum42".into(),
            r#type: MessageType::FileChunk as i32,
            payload: Some(Payload::DataChunk(vec![0u8; 4096])),
            ..Default::default()
        };
        dienst.nachricht_verarbeiten(&benutzer, frame).await;

        let empfangen = abonnent_rx.try_recv().unwrap().unwrap();
        assert!(matches!(
            empfangen.payload,
            Some(Payload::DataChunk(ref daten)) if daten.len() == 4096
        ));
        assert!(rx.try_recv().is_err(), "Chunks duerfen nie im Speicher-Pfad landen");
    }

    #[tokio::test]
    async fn fan_out_erreicht_alle_abonnenten() {
        let (dienst, _rx) = dienst().await;
        let benutzer = test_benutzer();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        dienst.verteiler.registrieren("raum42", "alice", tx_a);
        dienst.verteiler.registrieren("raum42", "bob", tx_b);

        let frame = ChatMessage {
            room_id: "raum42".into(),
            r#type: MessageType::Text as i32,
            payload: Some(Payload::MessageContent("aGFsbG8=".into())),
            ..Default::default()
        };
        dienst.nachricht_verarbeiten(&benutzer, frame).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let empfangen = rx.try_recv().unwrap().unwrap();
            assert!(matches!(
                empfangen.payload,
                Some(Payload::MessageContent(ref inhalt)) if inhalt == "aGFsbG8="
            ));
        }
    }

    // -- Frame-Abbildung ----------------------------------------------------

    #[test]
    fn datei_kontrolle_ergibt_deskriptor() {
        let frame = ChatMessage {
            room_id: "raum".into(),
            r#type: MessageType::FileControl as i32,
            payload: Some(Payload::FileMeta(FileMeta {
                file_name: "bild.png".into(),
                file_hash: "deadbeef".into(),
                action: FileAction::Offer as i32,
            })),
            ..Default::default()
        };

        let nachricht = nachricht_aus_frame(&test_benutzer(), &frame).unwrap();
        assert_eq!(nachricht.inhalt, "FILE:bild.png|HASH:deadbeef|ACTION:OFFER");
    }

    #[test]
    fn leere_payload_ergibt_keinen_datensatz() {
        let frame = ChatMessage {
            room_id: "raum".into(),
            ..Default::default()
        };
        assert!(nachricht_aus_frame(&test_benutzer(), &frame).is_none());
    }

    #[test]
    fn record_round_trip_zur_frame() {
        let record = NachrichtRecord {
            id: 7,
            room_id: "raum".into(),
            user_id: "u1".into(),
            email: "a@b.c".into(),
            inhalt: "aGFsbG8=".into(),
            zeit: "1700000000".into(),
            reply_to: "3".into(),
            iv: "AA==".into(),
            hot_sauce: "k1".into(),
            created_at: Utc::now(),
        };

        let frame = frame_aus_record(&record);
        assert_eq!(frame.timestamp, 1_700_000_000);
        assert_eq!(frame.reply_to, "3");
        assert_eq!(frame.r#type(), MessageType::Text);
    }
}
