//! User accounts

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::password::hash_password;
use super::{AUTHENTICATED_ROLE, Page, is_constraint_violation};
use crate::db::{self, DbPool};
use crate::{Error, Result};

/// Registration payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("user name must not be empty".to_string()));
        }
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(Error::Validation("password must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A user as listed by searches; never carries credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// User repository
#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a user and grant the `authenticated` role
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a field is missing or the name or email is
    /// already registered
    pub fn register(&self, user: &NewUser) -> Result<()> {
        user.validate()?;

        let mut conn = db::connect(&self.pool)?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO users (name, email, password, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user.name, user.email, hash_password(&user.password), now],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::Validation("user name or email already registered".to_string())
            } else {
                e.into()
            }
        })?;
        let user_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT OR IGNORE INTO users_in_role (user, role)
             SELECT ?1, id FROM roles WHERE name = ?2",
            params![user_id, AUTHENTICATED_ROLE],
        )?;
        tx.commit()?;

        tracing::info!(user = %user.name, "user registered");
        Ok(())
    }

    /// Whether a user exists
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn exists(&self, name: &str) -> Result<bool> {
        let conn = db::connect(&self.pool)?;
        let found: Option<i64> = conn
            .query_row("SELECT id FROM users WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Change a user's email and/or password
    ///
    /// A password change also clears the user's token.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed or taken email and `NotFound` if
    /// the user does not exist
    pub fn modify(&self, name: &str, email: Option<&str>, password: Option<&str>) -> Result<()> {
        if let Some(email) = email {
            validate_email(email)?;
        }
        if password.is_some_and(str::is_empty) {
            return Err(Error::Validation("password must not be empty".to_string()));
        }

        let mut conn = db::connect(&self.pool)?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        if !Self::touch(&tx, name, &now)? {
            return Err(Error::NotFound(format!("user '{name}'")));
        }
        if let Some(email) = email {
            tx.execute(
                "UPDATE users SET email = ?1 WHERE name = ?2",
                params![email, name],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::Validation("email already registered".to_string())
                } else {
                    e.into()
                }
            })?;
        }
        if let Some(password) = password {
            tx.execute(
                "UPDATE users SET password = ?1, token = NULL, token_expiration = NULL
                 WHERE name = ?2",
                params![hash_password(password), name],
            )?;
        }
        tx.commit()?;

        tracing::info!(user = %name, "user modified");
        Ok(())
    }

    /// Delete a user with their role memberships and reservations
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut conn = db::connect(&self.pool)?;
        let tx = conn.transaction()?;

        let deleted = tx.execute("DELETE FROM users WHERE name = ?1", [name])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("user '{name}'")));
        }
        let reservations = tx.execute(
            "DELETE FROM reservations WHERE json_extract(data, '$.user') = ?1",
            [name],
        )?;
        tx.commit()?;

        tracing::info!(user = %name, reservations, "user deleted");
        Ok(())
    }

    /// List users ordered by name
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search(&self, page: Page, name: Option<&str>) -> Result<Vec<UserRecord>> {
        let conn = db::connect(&self.pool)?;
        let pattern = name.map(|n| format!("%{n}%"));

        let mut stmt = conn.prepare(
            "SELECT u.name, u.email, u.created_at, u.updated_at, GROUP_CONCAT(r.name)
             FROM users u
             LEFT JOIN users_in_role ur ON ur.user = u.id
             LEFT JOIN roles r ON r.id = ur.role
             WHERE ?1 IS NULL OR u.name LIKE ?1
             GROUP BY u.id
             ORDER BY u.name
             LIMIT ?2 OFFSET ?3",
        )?;
        let users = stmt
            .query_map(params![pattern, page.limit(), page.offset()], |row| {
                let roles: Option<String> = row.get(4)?;
                let mut roles: Vec<String> = roles
                    .map(|r| r.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                roles.sort();
                Ok(UserRecord {
                    name: row.get(0)?,
                    email: row.get(1)?,
                    roles,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn touch(conn: &rusqlite::Connection, name: &str, now: &str) -> Result<bool> {
        let updated = conn.execute(
            "UPDATE users SET updated_at = ?1 WHERE name = ?2",
            params![now, name],
        )?;
        Ok(updated > 0)
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid email '{email}'")))
    }
}
