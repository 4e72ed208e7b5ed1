/// Database row types — these map directly to SQLite rows.
/// Distinct from formdrop-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FormRow {
    pub id: String,
    pub unique_id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub request_url: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub form_id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: String,
}

/// Fields of a public submission, already trimmed and validated.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub message: &'a str,
}
