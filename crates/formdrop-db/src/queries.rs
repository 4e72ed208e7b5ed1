use crate::models::{FormRow, MessageRow, NewMessage, UserRow};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

const FORM_COLUMNS: &str =
    "id, unique_id, user_id, name, email, request_url, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, user_id, form_id, name, email, message, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, name: &str, email: &str, password_hash: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, name, email, password_hash, &now),
            )?;
            Ok(())
        })
    }

    /// Exact, case-sensitive match on the stored email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    // -- Forms --

    /// Fails with a UNIQUE violation (see `is_unique_violation`) when
    /// `unique_id` is already taken.
    pub fn insert_form(&self, form: &FormRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO forms (id, unique_id, user_id, name, email, request_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    form.id,
                    form.unique_id,
                    form.user_id,
                    form.name,
                    form.email,
                    form.request_url,
                    form.created_at,
                    form.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Forms owned by `user_id`, newest first.
    pub fn get_forms_for_user(&self, user_id: &str) -> Result<Vec<FormRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FORM_COLUMNS} FROM forms WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], form_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Joint lookup: a form that exists but belongs to someone else is `None`.
    pub fn get_form_for_owner(&self, unique_id: &str, user_id: &str) -> Result<Option<FormRow>> {
        self.with_conn(|conn| query_form_for_owner(conn, unique_id, user_id))
    }

    /// Public lookup by the token in the submission URL. No ownership filter.
    pub fn get_form_by_unique_id(&self, unique_id: &str) -> Result<Option<FormRow>> {
        self.with_conn(|conn| query_form_by_unique_id(conn, unique_id))
    }

    /// Delete an owned form and all of its messages in one transaction.
    /// Returns the number of messages removed, or `None` if the caller owns
    /// no such form.
    pub fn delete_form_for_owner(&self, unique_id: &str, user_id: &str) -> Result<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(form) = query_form_for_owner(&tx, unique_id, user_id)? else {
                return Ok(None);
            };

            let removed = tx.execute("DELETE FROM messages WHERE form_id = ?1", [&form.id])?;
            tx.execute("DELETE FROM forms WHERE id = ?1", [&form.id])?;
            tx.commit()?;

            Ok(Some(removed))
        })
    }

    // -- Messages --

    /// Store a submission against the form identified by `unique_id`.
    ///
    /// The form is read and the message written while the connection is held,
    /// so a concurrent delete cannot leave an orphan behind. `user_id` is
    /// copied from the form. Returns `None` when no such form exists.
    pub fn insert_message_for_form(
        &self,
        unique_id: &str,
        new: &NewMessage<'_>,
    ) -> Result<Option<(FormRow, MessageRow)>> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            let Some(form) = query_form_by_unique_id(conn, unique_id)? else {
                return Ok(None);
            };

            conn.execute(
                "INSERT INTO messages (id, user_id, form_id, name, email, message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![new.id, form.user_id, form.id, new.name, new.email, new.message, now],
            )?;

            let message = MessageRow {
                id: new.id.to_string(),
                user_id: form.user_id.clone(),
                form_id: form.id.clone(),
                name: new.name.to_string(),
                email: new.email.to_string(),
                message: new.message.to_string(),
                created_at: now,
            };

            Ok(Some((form, message)))
        })
    }

    /// Messages of one form visible to `user_id`, newest first.
    pub fn get_messages_for_form(&self, form_id: &str, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE form_id = ?1 AND user_id = ?2
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([form_id, user_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// A message whose parent form belongs to `user_id`, or `None`.
    pub fn get_message_for_owner(&self, id: &str, user_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT m.id, m.user_id, m.form_id, m.name, m.email, m.message, m.created_at
                     FROM messages m
                     JOIN forms f ON m.form_id = f.id
                     WHERE m.id = ?1 AND f.user_id = ?2",
                    [id, user_id],
                    message_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn count_messages_for_form(&self, form_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE form_id = ?1",
                [form_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, name, email, password, created_at FROM users WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_form_for_owner(conn: &Connection, unique_id: &str, user_id: &str) -> Result<Option<FormRow>> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE unique_id = ?1 AND user_id = ?2");
    let row = conn.query_row(&sql, [unique_id, user_id], form_from_row).optional()?;
    Ok(row)
}

fn query_form_by_unique_id(conn: &Connection, unique_id: &str) -> Result<Option<FormRow>> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE unique_id = ?1");
    let row = conn.query_row(&sql, [unique_id], form_from_row).optional()?;
    Ok(row)
}

fn form_from_row(row: &Row<'_>) -> rusqlite::Result<FormRow> {
    Ok(FormRow {
        id: row.get(0)?,
        unique_id: row.get(1)?,
        user_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        request_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        form_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unique_violation;
    use uuid::Uuid;

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn seed_user(db: &Database, email: &str) -> String {
        let id = new_id();
        db.create_user(&id, "Test", email, "hash").unwrap();
        id
    }

    fn seed_form(db: &Database, user_id: &str) -> FormRow {
        let unique_id = new_id();
        let now = now_timestamp();
        let form = FormRow {
            id: new_id(),
            unique_id: unique_id.clone(),
            user_id: user_id.to_string(),
            name: "Contact".into(),
            email: "a@x.com".into(),
            request_url: format!("http://localhost/api/form/{unique_id}"),
            created_at: now.clone(),
            updated_at: now,
        };
        db.insert_form(&form).unwrap();
        form
    }

    fn submit(db: &Database, unique_id: &str, name: &str) -> Option<(FormRow, MessageRow)> {
        let id = new_id();
        db.insert_message_for_form(
            unique_id,
            &NewMessage { id: &id, name, email: "bob@y.com", message: "hi" },
        )
        .unwrap()
    }

    #[test]
    fn duplicate_unique_id_is_a_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "u1@x.com");
        let form = seed_form(&db, &user);

        let mut dup = form.clone();
        dup.id = new_id();
        let err = db.insert_form(&dup).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn duplicate_email_is_a_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "same@x.com");
        let err = db.create_user(&new_id(), "Other", "same@x.com", "hash").unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn email_lookup_is_case_sensitive() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "Alice@x.com");
        assert!(db.get_user_by_email("Alice@x.com").unwrap().is_some());
        assert!(db.get_user_by_email("alice@x.com").unwrap().is_none());
    }

    #[test]
    fn owner_lookup_hides_foreign_forms() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "u1@x.com");
        let other = seed_user(&db, "u2@x.com");
        let form = seed_form(&db, &owner);

        assert!(db.get_form_for_owner(&form.unique_id, &owner).unwrap().is_some());
        assert!(db.get_form_for_owner(&form.unique_id, &other).unwrap().is_none());
        assert!(db.get_form_by_unique_id(&form.unique_id).unwrap().is_some());
    }

    #[test]
    fn forms_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "u1@x.com");
        let first = seed_form(&db, &owner);
        let second = seed_form(&db, &owner);

        let forms = db.get_forms_for_user(&owner).unwrap();
        let ids: Vec<_> = forms.iter().map(|f| f.unique_id.clone()).collect();
        assert_eq!(ids, vec![second.unique_id, first.unique_id]);
    }

    #[test]
    fn message_copies_owner_from_form() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "u1@x.com");
        let form = seed_form(&db, &owner);

        let (parent, message) = submit(&db, &form.unique_id, "Bob").unwrap();
        assert_eq!(parent.id, form.id);
        assert_eq!(message.user_id, owner);
        assert_eq!(message.form_id, form.id);

        let stored = db.get_message_for_owner(&message.id, &owner).unwrap().unwrap();
        assert_eq!(stored.user_id, form.user_id);
    }

    #[test]
    fn submit_to_unknown_form_stores_nothing() {
        let db = Database::open_in_memory().unwrap();
        assert!(submit(&db, &new_id(), "Bob").is_none());
    }

    #[test]
    fn delete_cascades_to_messages() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "u1@x.com");
        let form = seed_form(&db, &owner);
        let keep = seed_form(&db, &owner);
        submit(&db, &form.unique_id, "Bob").unwrap();
        submit(&db, &form.unique_id, "Eve").unwrap();
        submit(&db, &keep.unique_id, "Kim").unwrap();

        let removed = db.delete_form_for_owner(&form.unique_id, &owner).unwrap();
        assert_eq!(removed, Some(2));
        assert_eq!(db.count_messages_for_form(&form.id).unwrap(), 0);
        assert_eq!(db.count_messages_for_form(&keep.id).unwrap(), 1);
        assert!(db.get_form_by_unique_id(&form.unique_id).unwrap().is_none());
    }

    #[test]
    fn delete_by_non_owner_is_a_miss() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "u1@x.com");
        let other = seed_user(&db, "u2@x.com");
        let form = seed_form(&db, &owner);
        submit(&db, &form.unique_id, "Bob").unwrap();

        assert_eq!(db.delete_form_for_owner(&form.unique_id, &other).unwrap(), None);
        assert_eq!(db.count_messages_for_form(&form.id).unwrap(), 1);
    }

    #[test]
    fn message_owner_lookup_goes_through_form() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "u1@x.com");
        let other = seed_user(&db, "u2@x.com");
        let form = seed_form(&db, &owner);
        let (_, message) = submit(&db, &form.unique_id, "Bob").unwrap();

        assert!(db.get_message_for_owner(&message.id, &owner).unwrap().is_some());
        assert!(db.get_message_for_owner(&message.id, &other).unwrap().is_none());
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| crate::migrations::run(conn)).unwrap();
        let version: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(version, 1);
    }
}
