//! SQLite-backed visit store
//!
//! Timestamps are stored as local wall-clock text (`YYYY-MM-DD HH:MM:SS`), so
//! month and day windows are plain prefix comparisons on `visited_at`.
//! The connection is held behind a mutex; every call is a short synchronous
//! critical section and callers are expected to run it off the async runtime.

use crate::domain::calendar::TIMESTAMP_FORMAT;
use crate::domain::types::{
    Member, MemberFilter, MemberId, MemberType, MemberVisitCount, MonthKey, StoredVisit, VisitId,
};
use crate::io::store::{StoreError, StoreResult, VisitStore};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use tracing::info;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS members (
            line_user_id TEXT PRIMARY KEY,
            display_name TEXT,
            full_name    TEXT,
            poster_id    TEXT,
            member_type  TEXT NOT NULL DEFAULT 'general',
            created_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Visits may reference ids with no members row
        CREATE TABLE IF NOT EXISTS visits (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            line_user_id TEXT NOT NULL,
            visited_at   TEXT NOT NULL,
            paid         INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_visits_member_time
        ON visits(line_user_id, visited_at);

        CREATE INDEX IF NOT EXISTS idx_visits_time
        ON visits(visited_at);
    ";

    /// Member columns, resolved to defaults when the members row is missing.
    /// The last column flags whether the row exists at all.
    const MEMBER_COLUMNS: &'static str = "IFNULL(m.display_name, ''), IFNULL(m.full_name, ''), \
         IFNULL(m.poster_id, ''), IFNULL(m.member_type, 'general'), m.line_user_id IS NOT NULL";

    /// Open or create the database file, creating its parent directory
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }

        let conn = Connection::open(path)?;
        let store = Self::initialize(conn)?;
        info!(path = %path.display(), "database_opened");
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn query_counts<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
        filter: &MemberFilter,
    ) -> StoreResult<Vec<MemberVisitCount>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((read_member_columns(row)?, row.get::<_, u32>(6)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (raw, visit_count) = row?;
            let member = raw.into_member()?;
            if filter.matches(&member) {
                out.push(MemberVisitCount { member, visit_count });
            }
        }
        Ok(out)
    }
}

/// Member row as read from SQLite, before the plan type is validated
struct RawMember {
    member_id: String,
    display_name: String,
    full_name: String,
    poster_id: String,
    member_type: String,
    registered: bool,
}

impl RawMember {
    fn into_member(self) -> StoreResult<Member> {
        Ok(Member {
            member_id: MemberId(self.member_id),
            display_name: self.display_name,
            full_name: self.full_name,
            poster_id: self.poster_id,
            member_type: self.member_type.parse()?,
            registered: self.registered,
        })
    }
}

/// Reads columns 0..=5 as (id, display, full, poster, type, registered)
fn read_member_columns(row: &Row<'_>) -> rusqlite::Result<RawMember> {
    Ok(RawMember {
        member_id: row.get(0)?,
        display_name: row.get(1)?,
        full_name: row.get(2)?,
        poster_id: row.get(3)?,
        member_type: row.get(4)?,
        registered: row.get(5)?,
    })
}

fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(visit_id: i64, value: String) -> StoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT)
        .map_err(|_| StoreError::InvalidTimestamp { visit_id, value })
}

impl VisitStore for SqliteStore {
    fn visits_for_member(
        &self,
        member_id: &MemberId,
        month: MonthKey,
    ) -> StoreResult<Vec<StoredVisit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, visited_at, paid
             FROM visits
             WHERE line_user_id = ?1 AND substr(visited_at, 1, 7) = ?2
             ORDER BY visited_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![member_id.as_str(), month.to_string()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, bool>(2)?))
        })?;

        let mut visits = Vec::new();
        for row in rows {
            let (id, visited_at, paid) = row?;
            visits.push(StoredVisit {
                id: VisitId(id),
                visited_at: parse_timestamp(id, visited_at)?,
                paid,
            });
        }
        Ok(visits)
    }

    fn members_with_visits(
        &self,
        month: MonthKey,
        filter: &MemberFilter,
    ) -> StoreResult<Vec<MemberVisitCount>> {
        let sql = format!(
            "SELECT v.line_user_id, {cols}, COUNT(*) AS cnt
             FROM visits v
             LEFT JOIN members m ON m.line_user_id = v.line_user_id
             WHERE substr(v.visited_at, 1, 7) = ?1
             GROUP BY v.line_user_id",
            cols = Self::MEMBER_COLUMNS
        );
        self.query_counts(&sql, params![month.to_string()], filter)
    }

    fn members_visiting_on(
        &self,
        day: NaiveDate,
        filter: &MemberFilter,
    ) -> StoreResult<Vec<MemberVisitCount>> {
        let sql = format!(
            "WITH monthly AS (
                SELECT line_user_id, COUNT(*) AS cnt
                FROM visits
                WHERE substr(visited_at, 1, 7) = ?1
                GROUP BY line_user_id
             ),
             on_day AS (
                SELECT DISTINCT line_user_id
                FROM visits
                WHERE substr(visited_at, 1, 10) = ?2
             )
             SELECT d.line_user_id, {cols}, IFNULL(mo.cnt, 0)
             FROM on_day d
             LEFT JOIN members m ON m.line_user_id = d.line_user_id
             LEFT JOIN monthly mo ON mo.line_user_id = d.line_user_id",
            cols = Self::MEMBER_COLUMNS
        );
        let month = MonthKey::of(day).to_string();
        let day = day.format("%Y-%m-%d").to_string();
        self.query_counts(&sql, params![month, day], filter)
    }

    fn roster(&self, month: MonthKey, filter: &MemberFilter) -> StoreResult<Vec<MemberVisitCount>> {
        let sql = format!(
            "SELECT m.line_user_id, {cols},
                (SELECT COUNT(*) FROM visits v
                 WHERE v.line_user_id = m.line_user_id
                   AND substr(v.visited_at, 1, 7) = ?1)
             FROM members m",
            cols = Self::MEMBER_COLUMNS
        );
        self.query_counts(&sql, params![month.to_string()], filter)
    }

    fn member(&self, member_id: &MemberId) -> StoreResult<Option<Member>> {
        let sql = format!(
            "SELECT m.line_user_id, {cols} FROM members m WHERE m.line_user_id = ?1",
            cols = Self::MEMBER_COLUMNS
        );
        let conn = self.conn.lock();
        let raw = conn
            .query_row(&sql, params![member_id.as_str()], read_member_columns)
            .optional()?;
        raw.map(RawMember::into_member).transpose()
    }

    fn record_visit(
        &self,
        member_id: &MemberId,
        display_name: &str,
        at: NaiveDateTime,
    ) -> StoreResult<VisitId> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO members (line_user_id, display_name, member_type)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(line_user_id) DO UPDATE SET display_name = excluded.display_name",
            params![member_id.as_str(), display_name, MemberType::General.as_str()],
        )?;
        tx.execute(
            "INSERT INTO visits (line_user_id, visited_at, paid) VALUES (?1, ?2, 0)",
            params![member_id.as_str(), format_timestamp(at)],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(VisitId(id))
    }

    fn insert_visit(&self, member_id: &MemberId, at: NaiveDateTime) -> StoreResult<VisitId> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO visits (line_user_id, visited_at, paid) VALUES (?1, ?2, 0)",
            params![member_id.as_str(), format_timestamp(at)],
        )?;
        Ok(VisitId(conn.last_insert_rowid()))
    }

    fn update_paid(&self, visit_id: VisitId, paid: bool) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed =
            conn.execute("UPDATE visits SET paid = ?1 WHERE id = ?2", params![paid, visit_id.0])?;
        Ok(changed > 0)
    }

    fn delete_visit(&self, visit_id: VisitId) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM visits WHERE id = ?1", params![visit_id.0])?;
        Ok(changed > 0)
    }

    fn upsert_member(
        &self,
        member_id: &MemberId,
        display_name: &str,
        member_type: MemberType,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO members (line_user_id, display_name, member_type)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(line_user_id) DO UPDATE SET display_name = excluded.display_name",
            params![member_id.as_str(), display_name, member_type.as_str()],
        )?;
        Ok(())
    }

    fn set_member_type(&self, member_id: &MemberId, member_type: MemberType) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE members SET member_type = ?1 WHERE line_user_id = ?2",
            params![member_type.as_str(), member_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn set_poster_id(&self, member_id: &MemberId, poster_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE members SET poster_id = ?1 WHERE line_user_id = ?2",
            params![poster_id, member_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn save_profile(
        &self,
        member_id: &MemberId,
        display_name: &str,
        full_name: &str,
        member_type: MemberType,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO members (line_user_id, display_name, full_name, member_type)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(line_user_id) DO UPDATE SET
                display_name = excluded.display_name,
                full_name = excluded.full_name,
                member_type = excluded.member_type",
            params![member_id.as_str(), display_name, full_name, member_type.as_str()],
        )?;
        Ok(())
    }
}
