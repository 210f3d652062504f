use crate::Database;
use crate::models::{MessageRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Row};

const USER_COLUMNS: &str = "id, full_name, email, password, profile_pic, created_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, created_at";

impl Database {
    // -- Users --

    /// Returns false when the email is already registered.
    pub fn create_user(&self, id: &str, full_name: &str, email: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, full_name, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, full_name, email, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_one_user(conn, &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"), email)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_one_user(conn, &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"), id)
        })
    }

    /// Returns false when no user has this id.
    pub fn update_profile_pic(&self, id: &str, profile_pic: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET profile_pic = ?2 WHERE id = ?1",
                (id, profile_pic),
            )?;
            Ok(changed > 0)
        })
    }

    /// Everyone except `user_id`, by name.
    pub fn get_contacts(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id <> ?1 ORDER BY full_name COLLATE NOCASE"
            ))?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users that exchanged at least one message with `user_id`, most recent
    /// conversation first.
    pub fn get_chat_partners(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.full_name, u.email, u.password, u.profile_pic, u.created_at
                 FROM users u
                 JOIN (
                     SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS partner_id,
                            MAX(created_at) AS last_at
                     FROM messages
                     WHERE sender_id = ?1 OR receiver_id = ?1
                     GROUP BY partner_id
                 ) p ON p.partner_id = u.id
                 ORDER BY p.last_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id,
                    message.sender_id,
                    message.receiver_id,
                    message.text,
                    message.image,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Both directions of the conversation between `a` and `b`, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map((a, b), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

fn query_one_user(conn: &Connection, sql: &str, param: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row([param], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
