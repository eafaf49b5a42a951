mod config;
mod discover;
mod error;
mod error_code;
mod ffmpeg;
mod future;
mod ingest;
mod init_metrics;
mod init_tracing;
mod process;
mod repo;
mod serde_str;
mod store;
mod tmp_file;

use actix_form_data::{Field, Form, FormData, Multipart, Value};
use actix_web::{
    dev::Payload,
    guard::{self, GuardContext},
    http::header::CONTENT_TYPE,
    web, App, FromRequest, HttpRequest, HttpResponse, HttpServer,
};
use futures_util::TryStreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    future::{ready, Ready},
    marker::PhantomData,
    net::SocketAddr,
    path::Path,
    sync::Arc,
};
use tokio_util::io::StreamReader;
use tracing::Instrument;
use tracing_actix_web::TracingLogger;
use uuid::Uuid;

use self::{
    config::Configuration,
    error::{Error, UploadError},
    ingest::UploadRequest,
    init_metrics::init_metrics,
    init_tracing::init_tracing,
    process::{ArcRunner, Executor},
    repo::{ArcRepo, VideoRecord},
    store::{object_store::ObjectStore, Store},
    tmp_file::{ArcTmpDir, TmpDir},
};

const MEGABYTES: usize = 1024 * 1024;

const USER_ID_HEADER: &str = "X-User-Id";

/// Limits applied to multipart uploads
#[derive(Clone, Copy, Debug)]
struct UploadLimits {
    /// Largest accepted video file, in megabytes
    max_file_size: usize,
}

fn user_id(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

/// The caller, as identified by the proxy in front of reelhost
#[derive(Clone, Copy, Debug)]
struct UserId(Uuid);

impl FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let res = user_id(req)
            .map(UserId)
            .ok_or_else(|| UploadError::MissingIdentity.into());

        ready(res)
    }
}

fn parse_video_id(video_id: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(video_id).map_err(|_| UploadError::InvalidVideoId.into())
}

#[derive(Debug, serde::Deserialize)]
struct NewVideo {
    title: String,
}

#[tracing::instrument(name = "Create video", skip(repo, new_video))]
async fn create_video(
    user: UserId,
    new_video: web::Json<NewVideo>,
    repo: web::Data<ArcRepo>,
) -> Result<HttpResponse, Error> {
    let NewVideo { title } = new_video.into_inner();

    let record = repo.create_video(user.0, title).await?;

    Ok(HttpResponse::Created().json(&record))
}

#[tracing::instrument(name = "Fetch video", skip(repo))]
async fn get_video(
    video_id: web::Path<String>,
    repo: web::Data<ArcRepo>,
) -> Result<HttpResponse, Error> {
    let video_id = parse_video_id(&video_id)?;

    let record = repo
        .get_video(video_id)
        .await?
        .ok_or(UploadError::VideoNotFound)?;

    Ok(HttpResponse::Ok().json(&record))
}

#[derive(Debug, serde::Deserialize)]
struct UploadQuery {
    filename: Option<String>,
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument(name = "Upload video", skip(req, body, repo, store, tmp_dir, runner))]
async fn upload<S: Store + 'static>(
    req: HttpRequest,
    body: web::Payload,
    video_id: web::Path<String>,
    query: web::Query<UploadQuery>,
    user: UserId,
    repo: web::Data<ArcRepo>,
    store: web::Data<S>,
    tmp_dir: web::Data<ArcTmpDir>,
    runner: web::Data<ArcRunner>,
) -> Result<HttpResponse, Error> {
    let video_id = parse_video_id(&video_id)?;

    let media_type = req
        .headers()
        .get(CONTENT_TYPE)
        .ok_or_else(|| UploadError::UnsupportedMediaType(String::from("none")))?
        .to_str()
        .ok()
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .ok_or_else(|| UploadError::UnsupportedMediaType(String::from("unknown")))?;

    let reader = StreamReader::new(body.map_err(std::io::Error::other));

    let request = UploadRequest {
        reader,
        media_type,
        filename: query.into_inner().filename,
    };

    let record = ingest::upload_video(
        &***repo,
        &tmp_dir,
        &***runner,
        &**store,
        video_id,
        user.0,
        request,
    )
    .await?;

    Ok(HttpResponse::Ok().json(&record))
}

struct VideoForm<S: Store + 'static>(Value<VideoRecord>, PhantomData<S>);

impl<S: Store + 'static> FormData for VideoForm<S> {
    type Item = VideoRecord;
    type Error = Error;

    fn form(req: &HttpRequest) -> Form<Self::Item, Self::Error> {
        // A single file field, 'video', streamed straight into staging
        let repo = req
            .app_data::<web::Data<ArcRepo>>()
            .expect("No repo in request")
            .clone();
        let store = req
            .app_data::<web::Data<S>>()
            .expect("No store in request")
            .clone();
        let tmp_dir = req
            .app_data::<web::Data<ArcTmpDir>>()
            .expect("No tmp dir in request")
            .clone();
        let runner = req
            .app_data::<web::Data<ArcRunner>>()
            .expect("No process runner in request")
            .clone();
        let limits = req
            .app_data::<web::Data<UploadLimits>>()
            .expect("No upload limits in request");

        let video_id = Uuid::parse_str(req.match_info().query("video_id")).ok();
        let user_id = user_id(req);

        Form::new()
            .max_files(1)
            .max_file_size(limits.max_file_size * MEGABYTES)
            .transform_error(transform_error)
            .field(
                "video",
                Field::file(move |filename, content_type, stream| {
                    let repo = repo.clone();
                    let store = store.clone();
                    let tmp_dir = tmp_dir.clone();
                    let runner = runner.clone();

                    let span = tracing::info_span!("file-upload", ?filename, %content_type);

                    let reader = StreamReader::new(
                        stream.map_err(|e| std::io::Error::other(e.to_string())),
                    );

                    Box::pin(
                        async move {
                            let video_id = video_id.ok_or(UploadError::InvalidVideoId)?;
                            let user_id = user_id.ok_or(UploadError::MissingIdentity)?;

                            let request = UploadRequest {
                                reader,
                                media_type: content_type,
                                filename: Some(filename),
                            };

                            ingest::upload_video(
                                &***repo,
                                &tmp_dir,
                                &***runner,
                                &**store,
                                video_id,
                                user_id,
                                request,
                            )
                            .await
                        }
                        .instrument(span),
                    )
                }),
            )
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(VideoForm(value, PhantomData))
    }
}

/// Handle multipart uploads carrying the video in a `video` field
#[tracing::instrument(name = "Upload video form", skip(value))]
async fn upload_form<S: Store + 'static>(
    video_id: web::Path<String>,
    _user: UserId,
    Multipart(VideoForm(value, _)): Multipart<VideoForm<S>>,
) -> Result<HttpResponse, Error> {
    parse_video_id(&video_id)?;

    let record = value
        .map()
        .and_then(|mut m| m.remove("video"))
        .and_then(|video| video.file())
        .ok_or(UploadError::NoVideo)?
        .result;

    Ok(HttpResponse::Ok().json(&record))
}

fn is_multipart(ctx: &GuardContext<'_>) -> bool {
    ctx.head()
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

fn transform_error(error: actix_form_data::Error) -> actix_web::Error {
    let error: Error = error.into();
    let error: actix_web::Error = error.into();
    error
}

async fn healthz<S: Store>(
    repo: web::Data<ArcRepo>,
    store: web::Data<S>,
) -> Result<HttpResponse, Error> {
    repo.health_check().await?;
    store.health_check().await?;
    Ok(HttpResponse::Ok().finish())
}

fn configure_endpoints<S: Store + 'static>(
    config: &mut web::ServiceConfig,
    repo: ArcRepo,
    store: S,
    tmp_dir: ArcTmpDir,
    runner: ArcRunner,
    limits: UploadLimits,
) {
    config
        .app_data(web::Data::new(repo))
        .app_data(web::Data::new(store))
        .app_data(web::Data::new(tmp_dir))
        .app_data(web::Data::new(runner))
        .app_data(web::Data::new(limits))
        .route("/healthz", web::get().to(healthz::<S>))
        .service(
            web::scope("/videos")
                .service(web::resource("").route(web::post().to(create_video)))
                .service(web::resource("/{video_id}").route(web::get().to(get_video)))
                .service(
                    web::resource("/{video_id}/upload")
                        .route(
                            web::post()
                                .guard(guard::fn_guard(is_multipart))
                                .to(upload_form::<S>),
                        )
                        .route(web::post().to(upload::<S>)),
                ),
        );
}

async fn launch<S: Store + Send + 'static>(
    repo: ArcRepo,
    store: S,
    tmp_dir: ArcTmpDir,
    runner: ArcRunner,
    limits: UploadLimits,
    address: SocketAddr,
) -> std::io::Result<()> {
    HttpServer::new(move || {
        let repo = repo.clone();
        let store = store.clone();
        let tmp_dir = tmp_dir.clone();
        let runner = runner.clone();

        App::new()
            .wrap(TracingLogger::default())
            .configure(move |sc| configure_endpoints(sc, repo, store, tmp_dir, runner, limits))
    })
    .bind(address)?
    .run()
    .await
}

/// A fully loaded reelhost configuration, ready to run
pub struct ReelConfiguration {
    config: Configuration,
}

impl ReelConfiguration {
    /// Build the reelhost configuration from commandline arguments
    ///
    /// This is probably not useful for 3rd party applications that handle their own commandline
    pub fn build_default() -> color_eyre::Result<Self> {
        Ok(ReelConfiguration {
            config: config::configure()?,
        })
    }

    /// Load the configuration from defaults, an optional file, and the environment
    ///
    /// When `save_to` is set, the merged configuration is written there as TOML.
    pub fn from_file<P: AsRef<Path>, Q: AsRef<Path>>(
        config_file: Option<P>,
        save_to: Option<Q>,
    ) -> color_eyre::Result<Self> {
        Ok(ReelConfiguration {
            config: config::configure_without_clap(config_file, save_to)?,
        })
    }

    /// Install the default reelhost tracer
    ///
    /// This is probably not useful for 3rd party applications that install their own tracing
    /// subscribers.
    pub fn install_tracing(self) -> color_eyre::Result<Self> {
        init_tracing(&self.config.tracing)?;
        Ok(self)
    }

    pub fn install_metrics(self) -> color_eyre::Result<Self> {
        if let Some(addr) = self.config.metrics.prometheus_address {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;

            init_metrics();
        }

        Ok(self)
    }

    /// Run the reelhost application until the server shuts down
    pub async fn run(self) -> color_eyre::Result<()> {
        let ReelConfiguration { config } = self;

        let tmp_dir = TmpDir::init(&config.server.temporary_directory).await?;
        let runner: ArcRunner = Arc::new(Executor::new(config.media.process_timeout));
        let repo = repo::open(&config.repo)?;
        let store = ObjectStore::build(&config.store)?;

        if let Err(e) = store.health_check().await {
            tracing::warn!("Object storage is not reachable yet: {e}");
        }

        tracing::info!("Starting reelhost on {}", config.server.address);

        let res = launch(
            repo,
            store,
            tmp_dir.clone(),
            runner,
            UploadLimits {
                max_file_size: config.media.max_file_size,
            },
            config.server.address,
        )
        .await;

        tmp_dir.cleanup().await?;

        res?;

        Ok(())
    }
}
