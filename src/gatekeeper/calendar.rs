//! Reservation calendar
//!
//! Bookings are exclusive: no two reservations may overlap, whoever owns
//! them. Each one is stored as a JSON document keyed by row id.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::db::{self, DbPool};
use crate::{Error, Result};

/// A booked time slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: i64,
    pub user: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Reservation {
    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_date < end && start < self.end_date
    }

    fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now < self.end_date
    }
}

/// Row payload; the id lives in its own column
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredReservation {
    user: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

/// Reservation repository
#[derive(Clone)]
pub struct Calendar {
    pool: DbPool,
}

impl Calendar {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Book a slot for a user
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the slot ends before it starts and `Conflict`
    /// if it overlaps an existing reservation
    pub fn add(&self, user: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Reservation> {
        if start >= end {
            return Err(Error::Validation(
                "reservation must end after it starts".to_string(),
            ));
        }

        let mut conn = db::connect(&self.pool)?;
        let tx = conn.transaction()?;

        if let Some(clash) = load_all(&tx)?.into_iter().find(|r| r.overlaps(start, end)) {
            return Err(Error::Conflict(format!(
                "slot overlaps reservation {}",
                clash.id
            )));
        }

        let data = serde_json::to_string(&StoredReservation {
            user: user.to_string(),
            start_date: start,
            end_date: end,
        })?;
        tx.execute("INSERT INTO reservations (data) VALUES (?1)", [data])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(user = %user, reservation = id, "reservation added");
        Ok(Reservation {
            id,
            user: user.to_string(),
            start_date: start,
            end_date: end,
        })
    }

    /// Fetch one reservation
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no reservation has the id
    pub fn get(&self, id: i64) -> Result<Reservation> {
        let conn = db::connect(&self.pool)?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM reservations WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        let data = data.ok_or_else(|| Error::NotFound(format!("reservation {id}")))?;
        decode(id, &data)
    }

    /// Delete a reservation
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no reservation has the id
    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = db::connect(&self.pool)?;
        let deleted = conn.execute("DELETE FROM reservations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("reservation {id}")));
        }
        tracing::info!(reservation = id, "reservation deleted");
        Ok(())
    }

    /// Reservations that have not ended by `from`, in start order
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn search(&self, from: Option<DateTime<Utc>>) -> Result<Vec<Reservation>> {
        let conn = db::connect(&self.pool)?;
        let mut reservations: Vec<Reservation> = load_all(&conn)?
            .into_iter()
            .filter(|r| from.is_none_or(|from| r.end_date > from))
            .collect();
        reservations.sort_by_key(|r| r.start_date);
        Ok(reservations)
    }

    /// The user's reservation covering `now`, if any
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn active(&self, user: &str, now: DateTime<Utc>) -> Result<Option<Reservation>> {
        let conn = db::connect(&self.pool)?;
        Ok(load_all(&conn)?
            .into_iter()
            .find(|r| r.user == user && r.is_active(now)))
    }
}

fn load_all(conn: &rusqlite::Connection) -> Result<Vec<Reservation>> {
    let mut stmt = conn.prepare("SELECT id, data FROM reservations")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.iter().map(|(id, data)| decode(*id, data)).collect()
}

fn decode(id: i64, data: &str) -> Result<Reservation> {
    let stored: StoredReservation = serde_json::from_str(data)?;
    Ok(Reservation {
        id,
        user: stored.user,
        start_date: stored.start_date,
        end_date: stored.end_date,
    })
}
