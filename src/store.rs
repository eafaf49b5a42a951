use std::fmt::Debug;
use tokio::io::AsyncRead;
use url::Url;

use crate::error_code::ErrorCode;

pub(crate) mod object_store;
pub(crate) mod storage_key;

use self::storage_key::StorageKey;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Failed to configure object store")]
    Build(#[source] ::object_store::Error),

    #[error("Error in object store request")]
    Object(#[source] ::object_store::Error),

    #[error("Failed to read upload body")]
    Read(#[source] std::io::Error),

    #[error("Failed to build public url")]
    Url(#[from] url::ParseError),
}

impl StoreError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Build(_) | Self::Object(_) => ErrorCode::OBJECT_REQUEST_ERROR,
            Self::Read(_) => ErrorCode::OBJECT_IO_ERROR,
            Self::Url(_) => ErrorCode::OBJECT_URL_ERROR,
        }
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait Store: Clone + Debug {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Stream everything `reader` produces into the object named by `key`
    ///
    /// Either the whole object is written or nothing is.
    async fn save_async_read<Reader>(
        &self,
        key: &StorageKey,
        content_type: &str,
        reader: &mut Reader,
    ) -> Result<(), StoreError>
    where
        Reader: AsyncRead + Unpin;

    fn public_url(&self, key: &StorageKey) -> Result<Url, StoreError>;
}

#[async_trait::async_trait(?Send)]
impl<T> Store for actix_web::web::Data<T>
where
    T: Store,
{
    async fn health_check(&self) -> Result<(), StoreError> {
        T::health_check(self).await
    }

    async fn save_async_read<Reader>(
        &self,
        key: &StorageKey,
        content_type: &str,
        reader: &mut Reader,
    ) -> Result<(), StoreError>
    where
        Reader: AsyncRead + Unpin,
    {
        T::save_async_read(self, key, content_type, reader).await
    }

    fn public_url(&self, key: &StorageKey) -> Result<Url, StoreError> {
        T::public_url(self, key)
    }
}
