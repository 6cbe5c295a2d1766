//! SQLite-backed build store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use super::{BuildFilter, BuildStore, StoreError, StoreResult};
use crate::domain::{ArtifactBuild, ArtifactType, BuildState, NewArtifactBuild};

// No UNIQUE on (build_id, type): duplicates must stay detectable.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artifact_builds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    build_id TEXT NOT NULL,
    type TEXT NOT NULL,
    state TEXT NOT NULL,
    time_submitted TEXT NOT NULL,
    time_completed TEXT
);
CREATE INDEX IF NOT EXISTS idx_artifact_builds_build_id
    ON artifact_builds (build_id, type);
";

const SELECT_BUILDS: &str = "
SELECT id, name, build_id, type, state, time_submitted, time_completed
FROM artifact_builds
WHERE (?1 IS NULL OR build_id = ?1) AND (?2 IS NULL OR type = ?2)
ORDER BY id
";

/// Build store persisted in a SQLite database
pub struct SqliteBuildStore {
    conn: Mutex<Connection>,
}

/// Column values as stored, before parsing into domain types
struct BuildRow {
    id: i64,
    name: String,
    build_id: String,
    artifact_type: String,
    state: String,
    time_submitted: String,
    time_completed: Option<String>,
}

impl SqliteBuildStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        debug!(path = %path.display(), "Opening build database");
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BuildStore for SqliteBuildStore {
    fn find_builds(&self, filter: &BuildFilter) -> StoreResult<Vec<ArtifactBuild>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(SELECT_BUILDS)?;

        let rows = stmt
            .query_map(
                params![
                    filter.build_id.as_deref(),
                    filter.artifact_type.map(|ty| ty.as_str())
                ],
                |row| {
                    Ok(BuildRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        build_id: row.get(2)?,
                        artifact_type: row.get(3)?,
                        state: row.get(4)?,
                        time_submitted: row.get(5)?,
                        time_completed: row.get(6)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(BuildRow::into_build).collect()
    }

    fn update_state(
        &self,
        id: i64,
        state: BuildState,
        time_completed: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE artifact_builds SET state = ?1, time_completed = ?2 WHERE id = ?3",
            params![
                state.as_str(),
                time_completed.map(|t| t.to_rfc3339()),
                id
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    fn insert(&self, build: &NewArtifactBuild) -> StoreResult<ArtifactBuild> {
        let time_submitted = Utc::now();
        let state = BuildState::default();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO artifact_builds (name, build_id, type, state, time_submitted)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                build.name,
                build.build_id,
                build.artifact_type.as_str(),
                state.as_str(),
                time_submitted.to_rfc3339()
            ],
        )?;

        Ok(ArtifactBuild {
            id: conn.last_insert_rowid(),
            name: build.name.clone(),
            build_id: build.build_id.clone(),
            artifact_type: build.artifact_type,
            state,
            time_submitted,
            time_completed: None,
        })
    }
}

impl BuildRow {
    fn into_build(self) -> StoreResult<ArtifactBuild> {
        Ok(ArtifactBuild {
            id: self.id,
            name: self.name,
            build_id: self.build_id,
            artifact_type: self.artifact_type.parse::<ArtifactType>().map_err(|_| StoreError::Corrupt {
                column: "type",
                value: self.artifact_type.clone(),
            })?,
            state: self.state.parse::<BuildState>().map_err(|_| StoreError::Corrupt {
                column: "state",
                value: self.state.clone(),
            })?,
            time_submitted: parse_timestamp("time_submitted", &self.time_submitted)?,
            time_completed: self
                .time_completed
                .as_deref()
                .map(|t| parse_timestamp("time_completed", t))
                .transpose()?,
        })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_and_find() {
        let store = SqliteBuildStore::in_memory().unwrap();
        let inserted = store.insert(&NewArtifactBuild::image("foo", "42")).unwrap();
        store
            .insert(&NewArtifactBuild::new("foo", "42", ArtifactType::Rpm))
            .unwrap();

        let found = store
            .find_builds(&BuildFilter::by_build("42", ArtifactType::Image))
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inserted.id);
        assert_eq!(found[0].state, BuildState::Build);
        assert_eq!(found[0].time_completed, None);

        assert_eq!(store.find_builds(&BuildFilter::all()).unwrap().len(), 2);
    }

    #[test]
    fn test_update_state_persists() {
        let store = SqliteBuildStore::in_memory().unwrap();
        let build = store.insert(&NewArtifactBuild::image("foo", "42")).unwrap();
        let completed = Utc::now();

        store
            .update_state(build.id, BuildState::Done, Some(completed))
            .unwrap();

        let found = store.find_builds(&BuildFilter::all()).unwrap();
        assert_eq!(found[0].state, BuildState::Done);
        assert_eq!(
            found[0].time_completed.map(|t| t.timestamp()),
            Some(completed.timestamp())
        );
    }

    #[test]
    fn test_update_missing_build() {
        let store = SqliteBuildStore::in_memory().unwrap();
        let err = store.update_state(99, BuildState::Done, None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 99 }));
    }

    #[test]
    fn test_duplicates_are_storable() {
        let store = SqliteBuildStore::in_memory().unwrap();
        store.insert(&NewArtifactBuild::image("foo", "42")).unwrap();
        store.insert(&NewArtifactBuild::image("bar", "42")).unwrap();

        let found = store
            .find_builds(&BuildFilter::by_build("42", ArtifactType::Image))
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let store = SqliteBuildStore::in_memory().unwrap();
        let build = store.insert(&NewArtifactBuild::image("foo", "42")).unwrap();
        store
            .conn()
            .execute(
                "UPDATE artifact_builds SET state = 'exploded' WHERE id = ?1",
                params![build.id],
            )
            .unwrap();

        let err = store.find_builds(&BuildFilter::all()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { column: "state", .. }));
    }

    #[test]
    fn test_open_creates_parent_and_reopens() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("builds.db");

        {
            let store = SqliteBuildStore::open(&path).unwrap();
            store.insert(&NewArtifactBuild::image("foo", "42")).unwrap();
        }

        let reopened = SqliteBuildStore::open(&path).unwrap();
        assert_eq!(reopened.find_builds(&BuildFilter::all()).unwrap().len(), 1);
    }
}
