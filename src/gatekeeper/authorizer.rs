//! Token issuance, revocation and resolution
//!
//! A user holds at most one token. Expiry is checked lazily when a token is
//! resolved; an expired token is cleared on that resolution so it can never
//! be resolved again.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use super::password::{generate_token, verify_password};
use crate::db::{self, DbPool};
use crate::thing::{InteractionAuthorization, RoleGrant};
use crate::{Error, Result};

/// A freshly issued token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token store backed by the `users` table
#[derive(Clone)]
pub struct Authorizer {
    pool: DbPool,
    token_ttl: Duration,
}

impl Authorizer {
    #[must_use]
    pub const fn new(pool: DbPool, token_ttl: Duration) -> Self {
        Self { pool, token_ttl }
    }

    /// Issue a token for a username/password pair
    ///
    /// Replaces any token the user already held. Nothing is written when the
    /// credentials do not match.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` if the pair does not match a stored user
    pub fn issue_token(&self, username: &str, password: &str) -> Result<IssuedToken> {
        let conn = db::connect(&self.pool)?;

        let stored: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password FROM users WHERE name = ?1",
                [username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, hash)) = stored else {
            return Err(Error::InvalidCredentials);
        };
        if !verify_password(password, &hash) {
            return Err(Error::InvalidCredentials);
        }

        let issued = IssuedToken {
            token: generate_token(),
            expires_at: Utc::now() + self.token_ttl,
        };
        conn.execute(
            "UPDATE users SET token = ?1, token_expiration = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                issued.token,
                issued.expires_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                user_id
            ],
        )?;

        tracing::info!(user = %username, "token issued");
        Ok(issued)
    }

    /// Invalidate a token
    ///
    /// # Errors
    ///
    /// Returns `TokenNotFound` if no user holds the token
    pub fn revoke_token(&self, token: &str) -> Result<()> {
        let conn = db::connect(&self.pool)?;
        let cleared = conn.execute(
            "UPDATE users SET token = NULL, token_expiration = NULL, updated_at = ?1
             WHERE token = ?2",
            params![Utc::now().to_rfc3339(), token],
        )?;
        if cleared == 0 {
            return Err(Error::TokenNotFound);
        }
        tracing::info!("token revoked");
        Ok(())
    }

    /// Identity and roles of the user holding a token
    ///
    /// # Errors
    ///
    /// Returns `TokenNotFound` if unknown and `TokenExpired` if past its
    /// expiration, in which case the token is cleared
    pub fn resolve_token(&self, token: &str) -> Result<InteractionAuthorization> {
        let conn = db::connect(&self.pool)?;
        let (user_id, username) = Self::valid_holder(&conn, token)?;

        let mut stmt = conn.prepare(
            "SELECT r.name, r.level FROM roles r
             JOIN users_in_role ur ON ur.role = r.id
             WHERE ur.user = ?1
             ORDER BY r.level DESC, r.name",
        )?;
        let roles = stmt
            .query_map([user_id], |row| {
                Ok(RoleGrant {
                    name: row.get(0)?,
                    level: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(InteractionAuthorization { username, roles })
    }

    fn valid_holder(conn: &db::DbConn, token: &str) -> Result<(i64, String)> {
        if token.is_empty() {
            return Err(Error::TokenNotFound);
        }

        let holder: Option<(i64, String, Option<String>)> = conn
            .query_row(
                "SELECT id, name, token_expiration FROM users WHERE token = ?1",
                [token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((user_id, name, expiration)) = holder else {
            return Err(Error::TokenNotFound);
        };

        let expired = expiration
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .is_none_or(|exp| exp.with_timezone(&Utc) <= Utc::now());

        if expired {
            conn.execute(
                "UPDATE users SET token = NULL, token_expiration = NULL WHERE id = ?1",
                [user_id],
            )?;
            tracing::debug!(user = %name, "expired token cleared");
            return Err(Error::TokenExpired);
        }

        Ok((user_id, name))
    }
}
