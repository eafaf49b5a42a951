use std::sync::Arc;

use object_store::{
    aws::AmazonS3Builder, path::Path, Attribute, Attributes, ObjectStore as _, PutMultipartOpts,
    WriteMultipart,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use super::{storage_key::StorageKey, Store, StoreError};

const CHUNK_SIZE: usize = 64 * 1024;
const MAX_CONCURRENT_PARTS: usize = 4;

#[derive(Clone, Debug)]
pub(crate) struct ObjectStore {
    inner: Arc<dyn object_store::ObjectStore>,
    bucket_name: String,
    region: String,
    public_endpoint: Option<Url>,
}

impl ObjectStore {
    pub(crate) fn new(
        inner: Arc<dyn object_store::ObjectStore>,
        bucket_name: String,
        region: String,
        public_endpoint: Option<Url>,
    ) -> Self {
        ObjectStore {
            inner,
            bucket_name,
            region,
            public_endpoint,
        }
    }

    #[tracing::instrument(skip(config), fields(bucket = %config.bucket_name, region = %config.region))]
    pub(crate) fn build(config: &crate::config::Store) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket_name)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint.as_str().trim_end_matches('/'))
                .with_allow_http(endpoint.scheme() == "http");
        }

        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key_id(access_key);
        }

        if let Some(secret_key) = &config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        if let Some(session_token) = &config.session_token {
            builder = builder.with_token(session_token);
        }

        let s3 = builder.build().map_err(StoreError::Build)?;

        Ok(Self::new(
            Arc::new(s3),
            config.bucket_name.clone(),
            config.region.clone(),
            config.public_endpoint.clone(),
        ))
    }
}

async fn write_parts<Reader>(
    reader: &mut Reader,
    writer: &mut WriteMultipart,
) -> Result<u64, StoreError>
where
    Reader: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0;

    loop {
        writer
            .wait_for_capacity(MAX_CONCURRENT_PARTS)
            .await
            .map_err(StoreError::Object)?;

        let n = reader.read(&mut buf).await.map_err(StoreError::Read)?;

        if n == 0 {
            break;
        }

        writer.write(&buf[..n]);
        total += n as u64;
    }

    Ok(total)
}

#[async_trait::async_trait(?Send)]
impl Store for ObjectStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner
            .list_with_delimiter(None)
            .await
            .map_err(StoreError::Object)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, key, reader), fields(key = %key))]
    async fn save_async_read<Reader>(
        &self,
        key: &StorageKey,
        content_type: &str,
        reader: &mut Reader,
    ) -> Result<(), StoreError>
    where
        Reader: AsyncRead + Unpin,
    {
        let path = key.to_object_path();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let upload = self
            .inner
            .put_multipart_opts(
                &path,
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(StoreError::Object)?;

        let mut writer = WriteMultipart::new(upload);

        match write_parts(reader, &mut writer).await {
            Ok(len) => {
                writer.finish().await.map_err(StoreError::Object)?;
                tracing::debug!("Stored {len} bytes at {path}");
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!("Failed to abort upload for {path}: {abort}");
                }
                Err(e)
            }
        }
    }

    fn public_url(&self, key: &StorageKey) -> Result<Url, StoreError> {
        let path: Path = key.to_object_path();

        let url = match &self.public_endpoint {
            Some(endpoint) => format!(
                "{}/{}/{path}",
                endpoint.as_str().trim_end_matches('/'),
                self.bucket_name
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{path}",
                self.bucket_name, self.region
            ),
        };

        Ok(Url::parse(&url)?)
    }
}
