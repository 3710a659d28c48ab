//! Run checkpoint persistence.
//!
//! A checkpoint is the whole serialized [`BatchRun`], keyed by its run key.
//! The batch orchestrator saves one after fetching and after every
//! completed batch; a later `triage run` with the same parameters loads it
//! and resumes at `next_offset`.
//!
//! Two backends are provided:
//!
//! - [`FileCheckpointStore`]: one JSON file per run key, replaced
//!   atomically (write to a temp file, then rename).
//! - [`SqliteCheckpointStore`]: a `run_checkpoints` table upserted with
//!   `ON CONFLICT`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use triage_harness_core::run::BatchRun;

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::error::RunError;
use crate::{db, migrate};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored run for `run_key`, if any.
    async fn load(&self, run_key: &str) -> Result<Option<BatchRun>, RunError>;

    /// Persist `run`, replacing any previous checkpoint with the same key.
    async fn save(&self, run: &BatchRun) -> Result<(), RunError>;

    async fn clear(&self, run_key: &str) -> Result<(), RunError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Open the store selected by `[checkpoint]`, creating it if needed.
pub async fn open_store(config: &CheckpointConfig) -> anyhow::Result<Box<dyn CheckpointStore>> {
    match config.backend {
        CheckpointBackend::File => Ok(Box::new(FileCheckpointStore::open(&config.path)?)),
        CheckpointBackend::Sqlite => Ok(Box::new(SqliteCheckpointStore::open(&config.path).await?)),
    }
}

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, run_key: &str) -> PathBuf {
        let safe: String = run_key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.dir.join(format!("run-{}.json", safe))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, run_key: &str) -> Result<Option<BatchRun>, RunError> {
        let path = self.path_for(run_key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RunError::checkpoint(format!("{}: {}", path.display(), e))),
        };
        let run = serde_json::from_slice(&bytes)
            .map_err(|e| RunError::checkpoint(format!("{}: {}", path.display(), e)))?;
        Ok(Some(run))
    }

    async fn save(&self, run: &BatchRun) -> Result<(), RunError> {
        let path = self.path_for(&run.run_key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(run).map_err(RunError::checkpoint)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| RunError::checkpoint(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RunError::checkpoint(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn clear(&self, run_key: &str) -> Result<(), RunError> {
        match tokio::fs::remove_file(self.path_for(run_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RunError::checkpoint(e)),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }
}

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteCheckpointStore {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, run_key: &str) -> Result<Option<BatchRun>, RunError> {
        let row = sqlx::query("SELECT payload FROM run_checkpoints WHERE run_key = ?")
            .bind(run_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(RunError::checkpoint)?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                let run = serde_json::from_str(&payload).map_err(RunError::checkpoint)?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, run: &BatchRun) -> Result<(), RunError> {
        let payload = serde_json::to_string(run).map_err(RunError::checkpoint)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO run_checkpoints (run_key, run_id, phase, next_offset, payload, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_key) DO UPDATE SET
                run_id = excluded.run_id,
                phase = excluded.phase,
                next_offset = excluded.next_offset,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&run.run_key)
        .bind(&run.run_id)
        .bind(run.phase.as_str())
        .bind(run.next_offset as i64)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(RunError::checkpoint)?;

        Ok(())
    }

    async fn clear(&self, run_key: &str) -> Result<(), RunError> {
        sqlx::query("DELETE FROM run_checkpoints WHERE run_key = ?")
            .bind(run_key)
            .execute(&self.pool)
            .await
            .map_err(RunError::checkpoint)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
