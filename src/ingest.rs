mod stage;

use std::path::Path;

use mime::Mime;
use tokio::io::AsyncRead;
use url::Url;
use uuid::Uuid;

pub(crate) use self::stage::StageError;

use crate::{
    discover::{classify_orientation, Orientation},
    error::{Error, UploadError},
    future::WithMetrics,
    process::ProcessRunner,
    repo::{VideoRecord, VideoRepo},
    store::{storage_key::StorageKey, Store},
    tmp_file::TmpDir,
};

const VIDEO_MP4: &str = "video/mp4";

/// An upload body along with what the client said about it
pub(crate) struct UploadRequest<R> {
    pub(crate) reader: R,
    pub(crate) media_type: Mime,
    pub(crate) filename: Option<String>,
}

impl<R> UploadRequest<R> {
    fn extension(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .and_then(|filename| Path::new(filename).extension())
            .and_then(|ext| ext.to_str())
    }
}

/// Turn an uploaded mp4 into a stored, streamable object and return its public url
#[tracing::instrument(
    name = "Process upload",
    skip_all,
    fields(media_type = %request.media_type, extension = ?request.extension())
)]
pub(crate) async fn process<S, R>(
    tmp_dir: &TmpDir,
    runner: &dyn ProcessRunner,
    store: &S,
    request: UploadRequest<R>,
) -> Result<Url, Error>
where
    S: Store,
    R: AsyncRead + Unpin,
{
    let UploadRequest {
        mut reader,
        media_type,
        ..
    } = request;

    if media_type.essence_str() != VIDEO_MP4 {
        return Err(UploadError::UnsupportedMediaType(media_type.essence_str().to_string()).into());
    }

    process_inner(tmp_dir, runner, store, &mut reader)
        .with_metrics(crate::init_metrics::UPLOAD_DURATION)
        .await
}

async fn process_inner<S, R>(
    tmp_dir: &TmpDir,
    runner: &dyn ProcessRunner,
    store: &S,
    reader: &mut R,
) -> Result<Url, Error>
where
    S: Store,
    R: AsyncRead + Unpin,
{
    let mut staged = stage::stage(tmp_dir, runner, reader).await?;

    let res = store_staged(runner, store, &mut staged).await;

    if let Err(e) = staged.cleanup().await {
        tracing::warn!("Failed to remove staged video: {e}");
    }

    let (orientation, url) = res?;

    metrics::counter!(
        crate::init_metrics::UPLOADS,
        "orientation" => orientation.as_ref().map(Orientation::as_str).unwrap_or("none")
    )
    .increment(1);

    Ok(url)
}

async fn store_staged<S>(
    runner: &dyn ProcessRunner,
    store: &S,
    staged: &mut stage::StagedFile,
) -> Result<(Option<Orientation>, Url), Error>
where
    S: Store,
{
    let orientation = classify_orientation(runner, staged.path()).await?;

    let key = StorageKey::generate(orientation)?;

    store
        .save_async_read(&key, VIDEO_MP4, staged.file_mut())
        .await?;

    let url = store.public_url(&key)?;

    tracing::info!("Stored {key} as {url}");

    Ok((orientation, url))
}

/// Process an upload for `video_id` on behalf of `user_id` and record where it ended up
#[tracing::instrument(name = "Upload video", skip(repo, tmp_dir, runner, store, request))]
pub(crate) async fn upload_video<S, R>(
    repo: &dyn VideoRepo,
    tmp_dir: &TmpDir,
    runner: &dyn ProcessRunner,
    store: &S,
    video_id: Uuid,
    user_id: Uuid,
    request: UploadRequest<R>,
) -> Result<VideoRecord, Error>
where
    S: Store,
    R: AsyncRead + Unpin,
{
    let mut record = repo
        .get_video(video_id)
        .await?
        .ok_or(UploadError::VideoNotFound)?;

    if !record.is_owned_by(user_id) {
        return Err(UploadError::NotOwner.into());
    }

    let url = process(tmp_dir, runner, store, request).await?;

    record.attach_url(url);

    if let Err(e) = repo.update_video(&record).await {
        // the object stays in the bucket without a record pointing at it
        tracing::error!(
            "Failed to record url for {video_id}, orphaned {:?}",
            record.video_url
        );
        return Err(e.into());
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Arc,
    };

    use object_store::{memory::InMemory, ObjectStore as _};
    use tokio::io::{AsyncRead, AsyncReadExt};
    use url::Url;
    use uuid::Uuid;

    use super::{process, upload_video, UploadRequest};
    use crate::{
        error::UploadError,
        process::fake::{FakeRunner, Probe, Remux},
        repo::{sled::SledRepo, VideoRepo},
        store::{object_store::ObjectStore, storage_key::StorageKey, Store, StoreError},
        tmp_file::TmpDir,
    };

    const BODY: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2avc1mp41 not really a video";

    #[derive(Clone, Debug)]
    struct FailingStore;

    #[async_trait::async_trait(?Send)]
    impl Store for FailingStore {
        async fn health_check(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn save_async_read<Reader>(
            &self,
            _: &StorageKey,
            _: &str,
            reader: &mut Reader,
        ) -> Result<(), StoreError>
        where
            Reader: AsyncRead + Unpin,
        {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).await.map_err(StoreError::Read)?;

            Err(StoreError::Read(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "access denied",
            )))
        }

        fn public_url(&self, _: &StorageKey) -> Result<Url, StoreError> {
            unreachable!("Nothing is ever stored")
        }
    }

    fn fixture(case: &str) -> String {
        std::fs::read_to_string(format!("./src/discover/ffprobe_6_0_{case}_streams.json"))
            .expect("Read file")
    }

    fn request(media_type: &str) -> UploadRequest<&'static [u8]> {
        UploadRequest {
            reader: BODY,
            media_type: media_type.parse().expect("Valid mime"),
            filename: Some(String::from("holiday.MP4")),
        }
    }

    fn remaining(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .expect("Read dir")
            .map(|entry| entry.expect("Dir entry").path())
            .collect()
    }

    struct Harness {
        _root: tempfile::TempDir,
        tmp_dir: Arc<TmpDir>,
        objects: Arc<InMemory>,
        store: ObjectStore,
        repo: SledRepo,
    }

    impl Harness {
        async fn new() -> Self {
            let root = tempfile::tempdir().expect("tempdir");
            let tmp_dir = TmpDir::init(root.path()).await.expect("tmp dir");
            let objects = Arc::new(InMemory::new());
            let store = ObjectStore::new(
                objects.clone(),
                String::from("reels"),
                String::from("us-east-1"),
                None,
            );
            let db = sled::Config::new()
                .temporary(true)
                .open()
                .expect("Temporary db");
            let repo = SledRepo::new(db).expect("Repo");

            Harness {
                _root: root,
                tmp_dir,
                objects,
                store,
                repo,
            }
        }

        async fn stored(&self, url: &Url) -> Vec<u8> {
            let path = object_store::path::Path::from(url.path());

            self.objects
                .get(&path)
                .await
                .expect("Object exists")
                .bytes()
                .await
                .expect("Read object")
                .to_vec()
        }
    }

    #[tokio::test]
    async fn landscape_upload() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("landscape_with_audio"));

        let url = process(&harness.tmp_dir, &runner, &harness.store, request("video/mp4"))
            .await
            .expect("Processed");

        let path = url.path().strip_prefix("/landscape/").expect("Landscape key");
        let token = path.strip_suffix(".mp4").expect("mp4 suffix");
        assert_eq!(token.len(), 43);
        assert_eq!(url.host_str(), Some("reels.s3.us-east-1.amazonaws.com"));
        assert_eq!(url.scheme(), "https");

        assert_eq!(harness.stored(&url).await, BODY);
        assert_eq!(runner.calls(), vec!["ffmpeg", "ffprobe"]);
        assert!(remaining(harness.tmp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn media_type_parameters_are_ignored() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("square"));

        let url = process(
            &harness.tmp_dir,
            &runner,
            &harness.store,
            request("video/mp4; codecs=\"avc1.42E01E\""),
        )
        .await
        .expect("Processed");

        assert!(url.path().starts_with("/other/"));
    }

    #[tokio::test]
    async fn unclassified_upload_has_single_segment_url() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("audio_only"));

        let url = process(&harness.tmp_dir, &runner, &harness.store, request("video/mp4"))
            .await
            .expect("Processed");

        assert_eq!(url.path_segments().map(|s| s.count()), Some(1));
        assert_eq!(harness.stored(&url).await, BODY);
    }

    #[tokio::test]
    async fn other_media_types_are_rejected_up_front() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("landscape_with_audio"));

        let err = process(&harness.tmp_dir, &runner, &harness.store, request("video/webm"))
            .await
            .expect_err("Rejected");

        assert!(matches!(
            err.kind(),
            Some(UploadError::UnsupportedMediaType(media_type)) if media_type == "video/webm"
        ));
        assert!(runner.calls().is_empty());
        assert!(remaining(harness.tmp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn probe_failure_cleans_up() {
        let harness = Harness::new().await;
        let runner = FakeRunner::new(Remux::Copy, Probe::Fail);

        let err = process(&harness.tmp_dir, &runner, &harness.store, request("video/mp4"))
            .await
            .expect_err("Failed");

        assert!(matches!(err.kind(), Some(UploadError::Ffmpeg(_))));
        assert!(remaining(harness.tmp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn portrait_upload_updates_record() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("portrait_video_only"));
        let owner = Uuid::new_v4();

        let created = harness
            .repo
            .create_video(owner, String::from("Vertical"))
            .await
            .expect("Created");

        let updated = upload_video(
            &harness.repo,
            &harness.tmp_dir,
            &runner,
            &harness.store,
            created.id,
            owner,
            request("video/mp4"),
        )
        .await
        .expect("Uploaded");

        let url = updated.video_url.clone().expect("Url recorded");
        assert!(url.path().starts_with("/portrait/"));

        let fetched = harness
            .repo
            .get_video(created.id)
            .await
            .expect("Fetched")
            .expect("Present");
        assert_eq!(fetched.video_url, Some(url));
        assert!(remaining(harness.tmp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn only_the_owner_can_upload() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("portrait_video_only"));

        let created = harness
            .repo
            .create_video(Uuid::new_v4(), String::from("Not yours"))
            .await
            .expect("Created");

        let err = upload_video(
            &harness.repo,
            &harness.tmp_dir,
            &runner,
            &harness.store,
            created.id,
            Uuid::new_v4(),
            request("video/mp4"),
        )
        .await
        .expect_err("Rejected");

        assert!(matches!(err.kind(), Some(UploadError::NotOwner)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_video_is_not_found() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("portrait_video_only"));

        let err = upload_video(
            &harness.repo,
            &harness.tmp_dir,
            &runner,
            &harness.store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            request("video/mp4"),
        )
        .await
        .expect_err("Rejected");

        assert!(matches!(err.kind(), Some(UploadError::VideoNotFound)));
    }

    #[tokio::test]
    async fn store_failure_leaves_record_and_disk_untouched() {
        let harness = Harness::new().await;
        let runner = FakeRunner::probing(&fixture("landscape_with_audio"));
        let owner = Uuid::new_v4();

        let created = harness
            .repo
            .create_video(owner, String::from("Unlucky"))
            .await
            .expect("Created");

        let err = upload_video(
            &harness.repo,
            &harness.tmp_dir,
            &runner,
            &FailingStore,
            created.id,
            owner,
            request("video/mp4"),
        )
        .await
        .expect_err("Failed");

        assert!(matches!(err.kind(), Some(UploadError::Store(_))));

        let fetched = harness
            .repo
            .get_video(created.id)
            .await
            .expect("Fetched")
            .expect("Present");
        assert_eq!(fetched, created);
        assert!(remaining(harness.tmp_dir.path()).is_empty());
    }
}
