//! Ephemeral room records with a sliding expiry.
//!
//! A record is live while `expires_at` lies in the future; every write pushes
//! it forward by the ttl. Expired rows are invisible to reads immediately and
//! are physically removed by [`RoomStore::purge_expired`].

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use serde::Serialize;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    code::RoomCode,
    ids::{PeerAddress, SubjectId},
    now_millis,
};

pub type Participants = BTreeMap<SubjectId, PeerAddress>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoomRecord {
    pub participants: Participants,
    pub last_joined_at: i64,
    pub last_fetched_at: i64,
}

impl RoomRecord {
    /// Someone joined since the participant list was last fetched.
    pub fn has_new_joiners(&self) -> bool {
        self.last_joined_at > self.last_fetched_at
    }
}

#[derive(Clone)]
pub struct RoomStore {
    pool: SqlitePool,
}

fn deadline(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl)
}

impl RoomStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // every pooled connection to an in-memory database would see its own copy
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 16 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rooms (
                code TEXT PRIMARY KEY NOT NULL,
                expires_at INTEGER NOT NULL,
                last_joined_at INTEGER NOT NULL DEFAULT 0,
                last_fetched_at INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS participants (
                code TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                peer_address TEXT NOT NULL,
                PRIMARY KEY (code, subject_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Claims `code` for an empty room. Returns false when a live record already holds it.
    pub async fn create(&self, code: &RoomCode, ttl: Duration) -> Result<bool, sqlx::Error> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "INSERT INTO rooms (code,expires_at,last_joined_at,last_fetched_at) VALUES (?,?,0,0)
            ON CONFLICT(code) DO UPDATE SET
                expires_at=excluded.expires_at, last_joined_at=0, last_fetched_at=0
            WHERE rooms.expires_at <= ?",
        )
        .bind(code.as_str())
        .bind(deadline(ttl))
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !claimed {
            tx.rollback().await?;
            return Ok(false);
        }

        // leftovers of an expired record under the same code
        sqlx::query("DELETE FROM participants WHERE code=?")
            .bind(code.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn get(&self, code: &RoomCode) -> Result<Option<RoomRecord>, sqlx::Error> {
        let Some((last_joined_at, last_fetched_at)): Option<(i64, i64)> =
            sqlx::query_as("SELECT last_joined_at,last_fetched_at FROM rooms WHERE code=? AND expires_at > ?")
                .bind(code.as_str())
                .bind(now_millis())
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT subject_id,peer_address FROM participants WHERE code=?")
                .bind(code.as_str())
                .fetch_all(&self.pool)
                .await?;

        let participants = rows
            .into_iter()
            .filter_map(|(subject, peer)| match SubjectId::parse(&subject) {
                Some(subject) => Some((subject, PeerAddress::new(peer))),
                None => {
                    tracing::warn!(%code, subject, "skipping participant with a malformed subject id");
                    None
                }
            })
            .collect();

        Ok(Some(RoomRecord {
            participants,
            last_joined_at,
            last_fetched_at,
        }))
    }

    pub async fn exists(&self, code: &RoomCode) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM rooms WHERE code=? AND expires_at > ?")
            .bind(code.as_str())
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Maps `subject` to `peer`, replacing any earlier address. Returns false if the room is absent.
    pub async fn upsert_participant(
        &self,
        code: &RoomCode,
        subject: &SubjectId,
        peer: &PeerAddress,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        // last_joined_at must land strictly after the fetch watermark
        let live = sqlx::query(
            "UPDATE rooms SET expires_at=?, last_joined_at=MAX(?, last_fetched_at + 1)
            WHERE code=? AND expires_at > ?",
        )
        .bind(deadline(ttl))
        .bind(now)
        .bind(code.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !live {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO participants (code,subject_id,peer_address) VALUES (?,?,?)
            ON CONFLICT(code,subject_id) DO UPDATE SET peer_address=excluded.peer_address",
        )
        .bind(code.as_str())
        .bind(subject.as_str())
        .bind(peer.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Returns whether an entry was removed. Missing rooms and missing entries are left untouched.
    pub async fn remove_participant(
        &self,
        code: &RoomCode,
        subject: &SubjectId,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM participants WHERE code=? AND subject_id=?
            AND EXISTS (SELECT 1 FROM rooms WHERE code=? AND expires_at > ?)",
        )
        .bind(code.as_str())
        .bind(subject.as_str())
        .bind(code.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if removed {
            sqlx::query("UPDATE rooms SET expires_at=? WHERE code=?")
                .bind(deadline(ttl))
                .bind(code.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Moves the fetch watermark up to the latest join.
    pub async fn mark_fetched(&self, code: &RoomCode, ttl: Duration) -> Result<bool, sqlx::Error> {
        let now = now_millis();
        let updated = sqlx::query(
            "UPDATE rooms SET last_fetched_at=MAX(?, last_joined_at), expires_at=?
            WHERE code=? AND expires_at > ?",
        )
        .bind(now)
        .bind(deadline(ttl))
        .bind(code.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn delete(&self, code: &RoomCode) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM participants WHERE code=?")
            .bind(code.as_str())
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM rooms WHERE code=?")
            .bind(code.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM participants WHERE code IN (SELECT code FROM rooms WHERE expires_at <= ?)")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let purged = sqlx::query("DELETE FROM rooms WHERE expires_at <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(purged)
    }
}

/// Purges expired rooms every `every` until the runtime shuts down.
pub fn spawn_sweeper(store: RoomStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "swept expired rooms"),
                Err(err) => tracing::error!(%err, "sweeping expired rooms failed"),
            }
        }
    })
}
