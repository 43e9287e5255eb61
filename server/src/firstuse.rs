//! Erstbenutzung: interaktives Anlegen des ersten Admin-Benutzers
//!
//! Wird ueber das Flag `--firstuse` ausgeloest; fragt E-Mail, Passwort und
//! Namen ab, legt den Admin an und beendet den Prozess danach sauber.

use anyhow::{bail, Result};

use stillepost_auth::passwort_hashen;
use stillepost_core::{benutzer_id_generieren, Rolle};
use stillepost_db::models::BenutzerRecord;
use stillepost_db::{Database, SqliteDb};

/// Fragt die Admin-Daten ab und legt den Bootstrap-Benutzer an
pub async fn ersten_admin_anlegen(db: &SqliteDb) -> Result<()> {
    println!("--- ERSTBENUTZUNG: Admin-Benutzer anlegen ---");

    let email = zeile_einlesen("Admin-E-Mail: ")?;
    let passwort = zeile_einlesen("Admin-Passwort: ")?;
    let name = zeile_einlesen("Admin-Name: ")?;

    if email.is_empty() || passwort.is_empty() {
        bail!("E-Mail und Passwort sind erforderlich");
    }

    if db.get_user_by_email(&email).await?.is_some() {
        bail!("Ein Benutzer mit dieser E-Mail existiert bereits");
    }

    let record = BenutzerRecord::neu(
        benutzer_id_generieren(),
        email.clone(),
        name,
        Rolle::Admin,
        passwort_hashen(&passwort)?,
    );
    db.store_user(&record).await?;

    println!("Admin-Benutzer angelegt: {email}");
    println!("Setup abgeschlossen. Server ohne --firstuse neu starten.");
    Ok(())
}

fn zeile_einlesen(prompt: &str) -> Result<String> {
    use std::io::Write as _;

    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut zeile = String::new();
    std::io::stdin().read_line(&mut zeile)?;
    Ok(zeile.trim().to_string())
}
