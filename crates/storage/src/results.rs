//! SQLite result store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline::{AnalysisResult, Member, MemberId, PersistenceError, ResultSink, Timestamp};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

const CREATE_TABLE: &str = "\
    CREATE TABLE IF NOT EXISTS member_analysis (
        member_id             INTEGER PRIMARY KEY,
        name                  TEXT NOT NULL,
        party                 TEXT,
        initial_analysis_text TEXT NOT NULL,
        refined_analysis_text TEXT NOT NULL,
        analyzed_at           TEXT NOT NULL
    )";

// A single statement, so the replacement is atomic.
const UPSERT: &str = "\
    INSERT INTO member_analysis
        (member_id, name, party, initial_analysis_text, refined_analysis_text, analyzed_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(member_id) DO UPDATE SET
        name = excluded.name,
        party = excluded.party,
        initial_analysis_text = excluded.initial_analysis_text,
        refined_analysis_text = excluded.refined_analysis_text,
        analyzed_at = excluded.analyzed_at";

const FETCH: &str = "\
    SELECT member_id, name, party, initial_analysis_text, refined_analysis_text, analyzed_at
    FROM member_analysis
    WHERE member_id = ?";

type ResultRow = (i64, String, Option<String>, String, String, DateTime<Utc>);

/// Keeps the latest analysis per member, keyed by member identifier.
pub struct SqliteResultStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteResultStore {
    /// Opens (creating if needed) the database and its table.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| persistence(path, &e))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| persistence(path, &e))?;

        info!("Result store ready");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored analysis for `member_id`, if any.
    pub async fn fetch(&self, member_id: MemberId) -> Result<Option<AnalysisResult>, PersistenceError> {
        let row: Option<ResultRow> = sqlx::query_as(FETCH)
            .bind(member_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| persistence(&self.path, &e))?;

        Ok(row.map(
            |(id, name, party, initial_analysis, refined_analysis, analyzed_at)| AnalysisResult {
                member: Member {
                    id: MemberId::new(id),
                    name,
                    party,
                },
                initial_analysis,
                refined_analysis,
                analyzed_at: Timestamp::from_utc(analyzed_at),
            },
        ))
    }

    /// Number of members with a stored analysis.
    pub async fn count(&self) -> Result<i64, PersistenceError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM member_analysis")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| persistence(&self.path, &e))
    }
}

#[async_trait]
impl ResultSink for SqliteResultStore {
    #[instrument(skip_all, fields(member_id = %result.member.id))]
    async fn upsert(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        sqlx::query(UPSERT)
            .bind(result.member.id.as_i64())
            .bind(&result.member.name)
            .bind(result.member.party.as_deref())
            .bind(&result.initial_analysis)
            .bind(&result.refined_analysis)
            .bind(result.analyzed_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| persistence(&self.path, &e))?;
        debug!("Result row written");
        Ok(())
    }
}

fn persistence(path: &Path, error: &sqlx::Error) -> PersistenceError {
    PersistenceError::new(format!("{}: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn result(id: i64, initial: &str, refined: &str, second: u32) -> AnalysisResult {
        AnalysisResult {
            member: Member {
                id: MemberId::new(id),
                name: "A. Member".to_string(),
                party: Some("Labour".to_string()),
            },
            initial_analysis: initial.to_string(),
            refined_analysis: refined.to_string(),
            analyzed_at: Timestamp::from_utc(
                Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, second).unwrap(),
            ),
        }
    }

    #[tokio::test]
    async fn upsert_then_fetch_returns_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteResultStore::open(&dir.path().join("analysis.db"))
            .await
            .unwrap();

        store.upsert(&result(1, "T1", "T2", 0)).await.unwrap();

        assert_eq!(
            store.fetch(MemberId::new(1)).await.unwrap(),
            Some(result(1, "T1", "T2", 0))
        );
        assert_eq!(store.fetch(MemberId::new(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_upsert_replaces_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteResultStore::open(&dir.path().join("analysis.db"))
            .await
            .unwrap();

        store.upsert(&result(1, "old initial", "old refined", 0)).await.unwrap();
        store.upsert(&result(1, "new initial", "new refined", 30)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.fetch(MemberId::new(1)).await.unwrap(),
            Some(result(1, "new initial", "new refined", 30))
        );
    }

    #[tokio::test]
    async fn rows_survive_reopening_and_are_kept_per_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.db");
        {
            let store = SqliteResultStore::open(&path).await.unwrap();
            store.upsert(&result(1, "a", "b", 0)).await.unwrap();
            store.upsert(&result(2, "c", "d", 0)).await.unwrap();
        }

        let store = SqliteResultStore::open(&path).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let two = store.fetch(MemberId::new(2)).await.unwrap().unwrap();
        assert_eq!(two.initial_analysis, "c");
    }

    #[tokio::test]
    async fn absent_party_round_trips_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteResultStore::open(&dir.path().join("analysis.db"))
            .await
            .unwrap();
        let mut row = result(5, "x", "y", 0);
        row.member.party = None;

        store.upsert(&row).await.unwrap();

        let stored = store.fetch(MemberId::new(5)).await.unwrap().unwrap();
        assert_eq!(stored.member.party, None);
    }

    #[tokio::test]
    async fn unwritable_location_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("analysis.db");

        assert!(SqliteResultStore::open(&path).await.is_err());
    }
}
