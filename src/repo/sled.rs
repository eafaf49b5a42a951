use std::path::PathBuf;

use sled::{Db, Tree};
use uuid::Uuid;

use crate::{
    error_code::ErrorCode,
    repo::{RepoError, VideoRecord, VideoRepo},
};

macro_rules! b {
    ($self:ident.$ident:ident, $expr:expr) => {{
        let $ident = $self.$ident.clone();

        let span = tracing::Span::current();

        tokio::task::spawn_blocking(move || span.in_scope(|| $expr))
            .await
            .map_err(SledError::from)
            .map_err(RepoError::from)?
            .map_err(SledError::from)
            .map_err(RepoError::from)?
    }};
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SledError {
    #[error("Error in database")]
    Sled(#[from] sled::Error),

    #[error("Invalid video json")]
    Record(#[from] serde_json::Error),

    #[error("Operation panicked")]
    Panic,
}

impl SledError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Sled(_) => ErrorCode::SLED_ERROR,
            Self::Record(_) => ErrorCode::EXTRACT_RECORD,
            Self::Panic => ErrorCode::PANIC,
        }
    }
}

impl From<tokio::task::JoinError> for SledError {
    fn from(_: tokio::task::JoinError) -> Self {
        SledError::Panic
    }
}

#[derive(Clone)]
pub(crate) struct SledRepo {
    videos: Tree,
    _db: Db,
}

impl std::fmt::Debug for SledRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledRepo").finish()
    }
}

impl SledRepo {
    #[tracing::instrument]
    pub(crate) fn build(path: PathBuf, cache_capacity: u64) -> Result<Self, SledError> {
        let db = sled::Config::new()
            .cache_capacity(cache_capacity)
            .path(path)
            .open()?;

        Self::new(db)
    }

    pub(crate) fn new(db: Db) -> Result<Self, SledError> {
        Ok(SledRepo {
            videos: db.open_tree("reelhost-videos-tree")?,
            _db: db,
        })
    }
}

fn encode(record: &VideoRecord) -> Result<Vec<u8>, SledError> {
    Ok(serde_json::to_vec(record)?)
}

fn decode(bytes: &[u8]) -> Result<VideoRecord, SledError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for SledRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        let next = self.videos.first().map_err(SledError::from)?;

        tracing::trace!("Repo healthy, first key present: {}", next.is_some());

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn create_video(&self, owner_id: Uuid, title: String) -> Result<VideoRecord, RepoError> {
        let record = VideoRecord::new(owner_id, title);
        let bytes = encode(&record)?;
        let id = record.id;

        b!(self.videos, videos.insert(id.as_bytes(), bytes));

        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    async fn get_video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        let opt = b!(self.videos, videos.get(id.as_bytes()));

        let Some(bytes) = opt else {
            return Ok(None);
        };

        Ok(Some(decode(&bytes)?))
    }

    #[tracing::instrument(skip(self, record), fields(id = %record.id))]
    async fn update_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        let bytes = encode(record)?;
        let id = record.id;

        b!(self.videos, videos.insert(id.as_bytes(), bytes));

        Ok(())
    }
}
