use std::{fmt::Debug, sync::Arc};

use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::{config, error_code::ErrorCode};

pub(crate) mod sled;

pub(crate) type ArcRepo = Arc<dyn VideoRepo>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("Error in sled")]
    SledError(#[from] self::sled::SledError),
}

impl RepoError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SledError(e) => e.error_code(),
        }
    }
}

/// A video as the rest of the application sees it
///
/// `video_url` stays empty until an upload has been stored.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub(crate) struct VideoRecord {
    pub(crate) id: Uuid,
    pub(crate) owner_id: Uuid,
    pub(crate) title: String,
    pub(crate) video_url: Option<Url>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}

impl VideoRecord {
    pub(crate) fn new(owner_id: Uuid, title: String) -> Self {
        let now = OffsetDateTime::now_utc();

        VideoRecord {
            id: Uuid::now_v7(),
            owner_id,
            title,
            video_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    pub(crate) fn attach_url(&mut self, url: Url) {
        self.video_url = Some(url);
        self.updated_at = OffsetDateTime::now_utc();
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait VideoRepo: Debug + Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;

    async fn create_video(&self, owner_id: Uuid, title: String) -> Result<VideoRecord, RepoError>;

    async fn get_video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError>;

    /// Replace the stored record with `record` in a single write
    async fn update_video(&self, record: &VideoRecord) -> Result<(), RepoError>;
}

pub(crate) fn open(config: &config::Repo) -> Result<ArcRepo, RepoError> {
    match config {
        config::Repo::Sled(config::Sled {
            path,
            cache_capacity,
        }) => {
            let repo = self::sled::SledRepo::build(path.clone(), *cache_capacity)?;

            Ok(Arc::new(repo))
        }
    }
}
