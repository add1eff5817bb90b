use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Conversation, Turn};

mod locks;

pub use locks::{SessionGuard, SessionLocks};

pub const SESSION_FILE_VERSION_V1: &str = "2026-10-01";
const SESSION_FILE_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid persisted session data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFile {
    version: String,
    session_id: Uuid,
    turns: Conversation,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub conversation: Conversation,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Conversation storage with one JSON file per session. Every save slides the expiry forward.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    pub async fn open(dir: impl Into<PathBuf>, ttl_seconds: u64) -> Result<Self, SessionStoreError> {
        let ttl_seconds = i64::try_from(ttl_seconds)
            .ok()
            .filter(|seconds| *seconds > 0)
            .ok_or_else(|| {
                SessionStoreError::InvalidData("session ttl must be between 1 and i64::MAX".to_string())
            })?;

        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            ttl: Duration::seconds(ttl_seconds),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub async fn load(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, SessionStoreError> {
        let path = self.path_for(session_id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let file = serde_json::from_slice::<SessionFile>(&raw)
            .map_err(|err| SessionStoreError::InvalidData(format!("session file invalid: {err}")))?;
        if file.session_id != session_id {
            return Err(SessionStoreError::InvalidData(
                "session file id does not match its name".to_string(),
            ));
        }

        if file.expires_at <= now {
            remove_if_present(&path).await?;
            return Ok(None);
        }

        Ok(Some(SessionRecord {
            session_id: file.session_id,
            conversation: file.turns,
            created_at: file.created_at,
            expires_at: file.expires_at,
        }))
    }

    /// Returns the live conversation for `session_id`, creating a greeting-only one if absent.
    pub async fn get_or_create(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        if let Some(record) = self.load(session_id, now).await? {
            return Ok(record);
        }

        let conversation = Conversation::seeded();
        self.write(session_id, &conversation, now, now).await
    }

    /// Appends one turn and persists the result.
    pub async fn append(
        &self,
        session_id: Uuid,
        turn: Turn,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let record = self.get_or_create(session_id, now).await?;
        let mut conversation = record.conversation;
        conversation.push(turn);
        self.write(session_id, &conversation, record.created_at, now)
            .await
    }

    /// Removes every expired or unreadable session file. Returns how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, SessionStoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_FILE_EXTENSION) {
                continue;
            }

            let expired = match fs::read(&path).await {
                Ok(raw) => match serde_json::from_slice::<SessionFile>(&raw) {
                    Ok(file) => file.expires_at <= now,
                    Err(err) => {
                        warn!(path = %path.display(), "removing unreadable session file: {err}");
                        true
                    }
                },
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            if expired {
                remove_if_present(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn write(
        &self,
        session_id: Uuid,
        conversation: &Conversation,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let expires_at = now + self.ttl;
        let file = SessionFile {
            version: SESSION_FILE_VERSION_V1.to_string(),
            session_id,
            turns: conversation.clone(),
            created_at,
            updated_at: now,
            expires_at,
        };
        let raw = serde_json::to_vec(&file)
            .map_err(|err| SessionStoreError::InvalidData(format!("session encode failed: {err}")))?;

        let path = self.path_for(session_id);
        let tmp_path = self
            .dir
            .join(format!("{session_id}.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp_path, raw).await?;
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        Ok(SessionRecord {
            session_id,
            conversation: conversation.clone(),
            created_at,
            expires_at,
        })
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir
            .join(format!("{session_id}.{SESSION_FILE_EXTENSION}"))
    }
}

async fn remove_if_present(path: &Path) -> Result<(), SessionStoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
