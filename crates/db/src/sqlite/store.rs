//! Database-Trait-Implementierung fuer SQLite
//!
//! Nachrichten sind append-only; Aufraeumen laeuft ausschliesslich ueber
//! `prune_messages` und `reap_stale_rooms`. Fehler beim Aufraeumen eines
//! einzelnen Raums brechen den Durchlauf nicht ab.

use chrono::Duration;
use sqlx::Row as _;
use stillepost_core::Rolle;
use tracing::{debug, warn};

use crate::error::DbError;
use crate::models::{BenutzerRecord, NachrichtRecord, NeueNachricht, RaumRecord, RAUM_HISTORIE_LIMIT};
use crate::repository::{Database, DbResult};
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{zeit_jetzt_string, zeit_parsen, ZEIT_FORMAT};

impl Database for SqliteDb {
    async fn get_message(&self, room_id: &str, message_id: i64) -> DbResult<Option<NachrichtRecord>> {
        let row = sqlx::query(
            "SELECT id, room_id, user_id, email, msg_content, time_str,
                    reply_to, iv, hot_sauce, created_at
             FROM messages WHERE room_id = ? AND id = ?",
        )
        .bind(room_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_nachricht(&r)).transpose()
    }

    async fn store_message(&self, room_id: &str, nachricht: &NeueNachricht) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO messages
             (room_id, user_id, email, msg_content, time_str, reply_to, iv, hot_sauce, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(&nachricht.user_id)
        .bind(&nachricht.email)
        .bind(&nachricht.inhalt)
        .bind(&nachricht.zeit)
        .bind(&nachricht.reply_to)
        .bind(&nachricht.iv)
        .bind(&nachricht.hot_sauce)
        .bind(zeit_jetzt_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, name, role, created_at, updated_at,
                    rooms, history, stats, posts
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_benutzer(&r)).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, name, role, created_at, updated_at,
                    rooms, history, stats, posts
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_benutzer(&r)).transpose()
    }

    async fn store_user(&self, benutzer: &BenutzerRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO users
             (id, email, password_hash, name, role, created_at, updated_at,
              rooms, history, stats, posts)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 password_hash = excluded.password_hash,
                 name = excluded.name,
                 role = excluded.role,
                 updated_at = excluded.updated_at,
                 rooms = excluded.rooms,
                 history = excluded.history,
                 stats = excluded.stats,
                 posts = excluded.posts",
        )
        .bind(&benutzer.id)
        .bind(&benutzer.email)
        .bind(&benutzer.password_hash)
        .bind(&benutzer.name)
        .bind(benutzer.role.als_str())
        .bind(benutzer.created_at.format(ZEIT_FORMAT).to_string())
        .bind(benutzer.updated_at.format(ZEIT_FORMAT).to_string())
        .bind(serde_json::to_string(&benutzer.rooms)?)
        .bind(serde_json::to_string(&benutzer.history)?)
        .bind(serde_json::to_string(&benutzer.stats)?)
        .bind(serde_json::to_string(&benutzer.posts)?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") || msg.contains("unique") {
                DbError::Eindeutigkeit(format!("E-Mail '{}' bereits vergeben", benutzer.email))
            } else {
                DbError::Sqlx(e)
            }
        })?;

        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> DbResult<Option<RaumRecord>> {
        let row = sqlx::query("SELECT id, name, max_messages, stats FROM rooms WHERE id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stats_str: String = row.try_get("stats")?;
        let mut raum = RaumRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            max_messages: row.try_get("max_messages")?,
            stats: serde_json::from_str(&stats_str)?,
            nachrichten: Vec::new(),
        };

        // Juengste Nachrichten laden und chronologisch drehen
        let rows = sqlx::query(
            "SELECT id, room_id, user_id, email, msg_content, time_str,
                    reply_to, iv, hot_sauce, created_at
             FROM messages WHERE room_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(room_id)
        .bind(RAUM_HISTORIE_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let mut nachrichten: Vec<NachrichtRecord> =
            rows.iter().map(row_zu_nachricht).collect::<DbResult<_>>()?;
        nachrichten.reverse();
        raum.nachrichten = nachrichten;

        Ok(Some(raum))
    }

    async fn store_room(&self, raum: &RaumRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO rooms (id, name, max_messages, stats)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 max_messages = excluded.max_messages,
                 stats = excluded.stats",
        )
        .bind(&raum.id)
        .bind(&raum.name)
        .bind(raum.max_messages)
        .bind(serde_json::to_string(&raum.stats)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn prune_messages(&self, behalten: i64) -> DbResult<()> {
        let rows = sqlx::query("SELECT DISTINCT room_id FROM messages")
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let raum: String = row.try_get("room_id")?;
            let ergebnis = sqlx::query(
                "DELETE FROM messages
                 WHERE room_id = ?1 AND id NOT IN (
                     SELECT id FROM messages
                     WHERE room_id = ?1
                     ORDER BY id DESC
                     LIMIT ?2
                 )",
            )
            .bind(&raum)
            .bind(behalten)
            .execute(&self.pool)
            .await;

            match ergebnis {
                Ok(r) if r.rows_affected() > 0 => {
                    debug!(raum = %raum, geloescht = r.rows_affected(), "Nachrichten beschnitten");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(raum = %raum, fehler = %e, "Prune fuer Raum fehlgeschlagen");
                }
            }
        }

        Ok(())
    }

    async fn reap_stale_rooms(&self, schwelle: Duration) -> DbResult<()> {
        let grenze = (chrono::Utc::now() - schwelle).format(ZEIT_FORMAT).to_string();

        let rows = sqlx::query(
            "SELECT room_id FROM messages GROUP BY room_id HAVING MAX(created_at) < ?",
        )
        .bind(&grenze)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let raum: String = row.try_get("room_id")?;
            // Nachrichten kaskadieren ueber den Fremdschluessel
            match sqlx::query("DELETE FROM rooms WHERE id = ?")
                .bind(&raum)
                .execute(&self.pool)
                .await
            {
                Ok(_) => {
                    debug!(raum = %raum, "Inaktiven Raum entfernt");
                }
                Err(e) => {
                    warn!(raum = %raum, fehler = %e, "Reap fuer Raum fehlgeschlagen");
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Zeilen-Mapper
// ---------------------------------------------------------------------------

fn row_zu_benutzer(row: &sqlx::sqlite::SqliteRow) -> DbResult<BenutzerRecord> {
    let rolle_str: String = row.try_get("role")?;
    let role = rolle_str
        .parse::<Rolle>()
        .map_err(DbError::intern)?;

    let created_at_str: String = row.try_get("created_at")?;
    let updated_at_str: String = row.try_get("updated_at")?;

    let rooms_str: String = row.try_get("rooms")?;
    let history_str: String = row.try_get("history")?;
    let stats_str: String = row.try_get("stats")?;
    let posts_str: String = row.try_get("posts")?;

    Ok(BenutzerRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        role,
        created_at: zeit_parsen(&created_at_str)?,
        updated_at: zeit_parsen(&updated_at_str)?,
        rooms: serde_json::from_str(&rooms_str)?,
        history: serde_json::from_str(&history_str)?,
        stats: serde_json::from_str(&stats_str)?,
        posts: serde_json::from_str(&posts_str)?,
    })
}

fn row_zu_nachricht(row: &sqlx::sqlite::SqliteRow) -> DbResult<NachrichtRecord> {
    let created_at_str: String = row.try_get("created_at")?;

    Ok(NachrichtRecord {
        id: row.try_get("id")?,
        room_id: row.try_get("room_id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        inhalt: row.try_get("msg_content")?,
        zeit: row.try_get("time_str")?,
        reply_to: row.try_get("reply_to")?,
        iv: row.try_get("iv")?,
        hot_sauce: row.try_get("hot_sauce")?,
        created_at: zeit_parsen(&created_at_str)?,
    })
}
