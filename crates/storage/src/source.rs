//! Read-only access to the `speeches` relation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::corpus::join_speeches;
use pipeline::{CorpusSource, Member, MemberCorpus, MemberId, MemberSelection, SourceUnavailable};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument, warn};

/// Proves the relation and every column the reader needs exist.
const PROBE: &str = "SELECT iid, name, party, speech_text FROM speeches LIMIT 0";

/// One row per member, ordered by identifier. A member may own several
/// speech rows; name and party are taken from any of them. Text columns are
/// read as bytes so a row holding invalid UTF-8 cannot fail the selection.
const SELECT_MEMBERS: &str = "\
    SELECT iid, CAST(MIN(name) AS BLOB), CAST(MIN(party) AS BLOB) \
    FROM speeches \
    GROUP BY iid \
    ORDER BY iid \
    LIMIT ? OFFSET ?";

const SELECT_SPEECHES: &str =
    "SELECT CAST(speech_text AS BLOB) FROM speeches WHERE iid = ? ORDER BY rowid";

/// Corpus source over a SQLite database with a
/// `speeches(iid, name, party, speech_text)` relation.
pub struct SqliteCorpusSource {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteCorpusSource {
    /// Opens the database read-only and checks the expected schema.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, SourceUnavailable> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| unavailable(path, &e))?;

        sqlx::query(PROBE)
            .execute(&pool)
            .await
            .map_err(|e| unavailable(path, &e))?;

        info!("Source store opened");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl CorpusSource for SqliteCorpusSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn select_members(
        &self,
        selection: MemberSelection,
    ) -> Result<Vec<MemberCorpus>, SourceUnavailable> {
        let rows: Vec<(i64, Option<Vec<u8>>, Option<Vec<u8>>)> = sqlx::query_as(SELECT_MEMBERS)
            .bind(i64::from(selection.limit))
            .bind(i64::from(selection.start_index))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(&self.path, &e))?;

        let mut members = Vec::with_capacity(rows.len());
        for (iid, name, party) in rows {
            let speeches: Vec<(Option<Vec<u8>>,)> = match sqlx::query_as(SELECT_SPEECHES)
                .bind(iid)
                .fetch_all(&self.pool)
                .await
            {
                Ok(speeches) => speeches,
                Err(e) => {
                    warn!(member_id = iid, error = %e, "Speech rows unreadable; member skipped");
                    continue;
                }
            };
            let speech_text = join_speeches(
                speeches
                    .iter()
                    .filter_map(|(text,)| text.as_deref().map(String::from_utf8_lossy)),
            );
            debug!(
                member_id = iid,
                speech_chars = speech_text.chars().count(),
                "Corpus assembled"
            );

            members.push(MemberCorpus {
                member: Member {
                    id: MemberId::new(iid),
                    name: name.as_deref().map(lossy_trimmed).unwrap_or_default(),
                    party: party
                        .as_deref()
                        .map(lossy_trimmed)
                        .filter(|p| !p.is_empty()),
                },
                speech_text,
            });
        }
        Ok(members)
    }
}

fn lossy_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn unavailable(path: &Path, error: &sqlx::Error) -> SourceUnavailable {
    SourceUnavailable::new(format!("{}: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqliteJournalMode;
    use tempfile::TempDir;

    use super::*;

    async fn fixture(rows: &[(i64, &str, Option<&str>, &str)]) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.db");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .journal_mode(SqliteJournalMode::Delete)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query("CREATE TABLE speeches (iid INTEGER, name TEXT, party TEXT, speech_text TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        for (iid, name, party, text) in rows {
            sqlx::query("INSERT INTO speeches (iid, name, party, speech_text) VALUES (?, ?, ?, ?)")
                .bind(*iid)
                .bind(*name)
                .bind(*party)
                .bind(*text)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
        (dir, path)
    }

    fn ids(members: &[MemberCorpus]) -> Vec<i64> {
        members.iter().map(|m| m.member.id.as_i64()).collect()
    }

    #[tokio::test]
    async fn returns_members_in_identifier_order_up_to_limit() {
        let (_dir, path) = fixture(&[
            (30, "C", Some("Green"), "c"),
            (10, "A", Some("Labour"), "a"),
            (20, "B", None, "b"),
        ])
        .await;
        let source = SqliteCorpusSource::open(&path).await.unwrap();

        let selection = MemberSelection {
            limit: 2,
            start_index: 0,
        };
        let first = source.select_members(selection).await.unwrap();
        let again = source.select_members(selection).await.unwrap();

        assert_eq!(ids(&first), vec![10, 20]);
        assert_eq!(first, again);
        assert_eq!(first[0].member.name, "A");
        assert_eq!(first[0].member.party.as_deref(), Some("Labour"));
        assert_eq!(first[1].member.party, None);
    }

    #[tokio::test]
    async fn start_index_skips_leading_members() {
        let (_dir, path) = fixture(&[(1, "A", None, "a"), (2, "B", None, "b"), (3, "C", None, "c")]).await;
        let source = SqliteCorpusSource::open(&path).await.unwrap();

        let members = source
            .select_members(MemberSelection {
                limit: 10,
                start_index: 1,
            })
            .await
            .unwrap();

        assert_eq!(ids(&members), vec![2, 3]);
    }

    #[tokio::test]
    async fn speech_rows_are_joined_in_row_order() {
        let (_dir, path) = fixture(&[
            (1, "A", Some("Labour"), "first"),
            (2, "B", None, "other"),
            (1, "A", Some("Labour"), "second"),
            (1, "A", Some("Labour"), "   "),
        ])
        .await;
        let source = SqliteCorpusSource::open(&path).await.unwrap();

        let members = source
            .select_members(MemberSelection {
                limit: 1,
                start_index: 0,
            })
            .await
            .unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].speech_text, "first\n\n---\n\nsecond");
    }

    #[tokio::test]
    async fn invalid_utf8_speech_does_not_fail_the_selection() {
        let (_dir, path) = fixture(&[(1, "A", None, "a"), (3, "C", None, "c")]).await;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .journal_mode(SqliteJournalMode::Delete),
            )
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO speeches (iid, name, party, speech_text) \
             VALUES (2, CAST(X'42FF' AS TEXT), NULL, CAST(X'80FF41' AS TEXT))",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
        let source = SqliteCorpusSource::open(&path).await.unwrap();

        let members = source
            .select_members(MemberSelection {
                limit: 10,
                start_index: 0,
            })
            .await
            .unwrap();

        assert_eq!(ids(&members), vec![1, 2, 3]);
        assert_eq!(members[0].speech_text, "a");
        assert_eq!(members[1].member.name, "B\u{FFFD}");
        assert_eq!(members[1].speech_text, "\u{FFFD}\u{FFFD}A");
        assert_eq!(members[2].speech_text, "c");
    }

    #[tokio::test]
    async fn zero_limit_and_empty_store_return_nothing() {
        let (_dir, path) = fixture(&[(1, "A", None, "a")]).await;
        let source = SqliteCorpusSource::open(&path).await.unwrap();
        let none = source
            .select_members(MemberSelection {
                limit: 0,
                start_index: 0,
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        let (_dir, empty) = fixture(&[]).await;
        let source = SqliteCorpusSource::open(&empty).await.unwrap();
        let none = source
            .select_members(MemberSelection {
                limit: 5,
                start_index: 0,
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        assert!(SqliteCorpusSource::open(&path).await.is_err());
        assert!(!path.exists(), "read-only open must not create the file");
    }

    #[tokio::test]
    async fn missing_relation_or_column_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong.db");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .journal_mode(SqliteJournalMode::Delete)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query("CREATE TABLE speeches (iid INTEGER, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let err = SqliteCorpusSource::open(&path).await.err().unwrap();

        assert!(err.message.contains("speech_text"), "{err}");
    }
}
