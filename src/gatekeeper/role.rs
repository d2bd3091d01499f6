//! Roles and role membership

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use super::{Page, is_constraint_violation};
use crate::db::{self, DbPool};
use crate::{Error, Result};

/// A role as listed by searches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub name: String,
    pub level: i64,
}

/// Role repository
#[derive(Clone)]
pub struct RoleStore {
    pool: DbPool,
}

impl RoleStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a role
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the name is empty or already taken
    pub fn add(&self, name: &str, level: i64) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::Validation("role name must not be empty".to_string()));
        }

        let conn = db::connect(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO roles (name, level, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, level, now],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::Validation(format!("role '{name}' already exists"))
            } else {
                e.into()
            }
        })?;

        tracing::info!(role = %name, level, "role added");
        Ok(())
    }

    /// Create a role unless it exists
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn ensure(&self, name: &str, level: i64) -> Result<()> {
        let conn = db::connect(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO roles (name, level, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![name, level, now],
        )?;
        Ok(())
    }

    /// Put a user in a role
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user or role is unknown and `Conflict` if
    /// the user already holds the role
    pub fn grant(&self, user: &str, role: &str) -> Result<()> {
        let conn = db::connect(&self.pool)?;

        let user_id: i64 = conn
            .query_row("SELECT id FROM users WHERE name = ?1", [user], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("user '{user}'")))?;
        let role_id: i64 = conn
            .query_row("SELECT id FROM roles WHERE name = ?1", [role], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("role '{role}'")))?;

        conn.execute(
            "INSERT INTO users_in_role (user, role) VALUES (?1, ?2)",
            params![user_id, role_id],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::Conflict(format!("user '{user}' already has role '{role}'"))
            } else {
                e.into()
            }
        })?;

        tracing::info!(user = %user, role = %role, "role granted");
        Ok(())
    }

    /// List roles ordered by name
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search(&self, page: Page, name: Option<&str>) -> Result<Vec<RoleRecord>> {
        let conn = db::connect(&self.pool)?;
        let pattern = name.map(|n| format!("%{n}%"));

        let mut stmt = conn.prepare(
            "SELECT name, level FROM roles
             WHERE ?1 IS NULL OR name LIKE ?1
             ORDER BY name
             LIMIT ?2 OFFSET ?3",
        )?;
        let roles = stmt
            .query_map(params![pattern, page.limit(), page.offset()], |row| {
                Ok(RoleRecord {
                    name: row.get(0)?,
                    level: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::user::{NewUser, UserStore};

    fn store() -> RoleStore {
        RoleStore::new(db::init_memory().unwrap())
    }

    #[test]
    fn add_rejects_duplicates() {
        let roles = store();
        roles.add("operator", 10).unwrap();
        assert!(matches!(roles.add("operator", 10), Err(Error::Validation(_))));
        assert!(matches!(roles.add("  ", 10), Err(Error::Validation(_))));
    }

    #[test]
    fn ensure_is_idempotent() {
        let roles = store();
        roles.ensure("administrator", 1000).unwrap();
        roles.ensure("administrator", 1).unwrap();

        let listed = roles.search(Page::first(10), None).unwrap();
        assert_eq!(
            listed,
            vec![RoleRecord {
                name: "administrator".into(),
                level: 1000
            }]
        );
    }

    #[test]
    fn search_filters_and_pages() {
        let roles = store();
        for (name, level) in [("astronomer", 20), ("operator", 10), ("observer", 5)] {
            roles.add(name, level).unwrap();
        }

        let matching = roles.search(Page::first(10), Some("o")).unwrap();
        assert_eq!(matching.len(), 3);

        let second = roles.search(Page::new(1, 2), None).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "operator");

        let ops = roles.search(Page::first(10), Some("oper")).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn grant_checks_both_sides() {
        let pool = db::init_memory().unwrap();
        let roles = RoleStore::new(pool.clone());
        roles.add("operator", 10).unwrap();
        UserStore::new(pool)
            .register(&NewUser {
                name: "herschel".into(),
                email: "herschel@example.org".into(),
                password: "uranus".into(),
            })
            .unwrap();

        roles.grant("herschel", "operator").unwrap();
        assert!(matches!(
            roles.grant("herschel", "operator"),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            roles.grant("messier", "operator"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            roles.grant("herschel", "pilot"),
            Err(Error::NotFound(_))
        ));
    }
}
