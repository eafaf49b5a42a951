use crate::{
    config::primitives::{LogFormat, Targets},
    serde_str::Serde,
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};
use url::Url;

impl Args {
    pub(super) fn into_output(self) -> Output {
        let Args {
            config_file,
            log_format,
            log_targets,
            opentelemetry_url,
            opentelemetry_service_name,
            opentelemetry_targets,
            save_to,
            address,
            temporary_directory,
            metrics_prometheus_address,
            media_process_timeout,
            media_max_file_size,
            repo_path,
            repo_cache_capacity,
            store_bucket_name,
            store_region,
            store_endpoint,
            store_access_key,
            store_secret_key,
            store_session_token,
            store_public_endpoint,
        } = self;

        let server = Server {
            address,
            temporary_directory,
        };

        let tracing = Tracing {
            logging: Logging {
                format: log_format,
                targets: log_targets.map(Serde::new),
            },
            opentelemetry: OpenTelemetry {
                url: opentelemetry_url,
                service_name: opentelemetry_service_name,
                targets: opentelemetry_targets.map(Serde::new),
            },
        };

        let metrics = Metrics {
            prometheus_address: metrics_prometheus_address,
        };

        let media = Media {
            process_timeout: media_process_timeout,
            max_file_size: media_max_file_size,
        };

        let repo = Sled {
            path: repo_path,
            cache_capacity: repo_cache_capacity,
        }
        .set()
        .map(Repo::Sled);

        let store = Store {
            bucket_name: store_bucket_name,
            region: store_region,
            endpoint: store_endpoint,
            access_key: store_access_key,
            secret_key: store_secret_key,
            session_token: store_session_token,
            public_endpoint: store_public_endpoint,
        };

        Output {
            config_format: ConfigFormat {
                server,
                tracing,
                metrics,
                media,
                repo,
                store,
            },
            save_to,
            config_file,
        }
    }
}

pub(super) struct Output {
    pub(super) config_format: ConfigFormat,
    pub(super) save_to: Option<PathBuf>,
    pub(super) config_file: Option<PathBuf>,
}

/// Everything set on the commandline, ready to be layered over the other sources
#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct ConfigFormat {
    server: Server,
    tracing: Tracing,
    metrics: Metrics,
    media: Media,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo: Option<Repo>,
    store: Store,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Server {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temporary_directory: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Tracing {
    logging: Logging,
    opentelemetry: OpenTelemetry,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Logging {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<LogFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Serde<Targets>>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct OpenTelemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Serde<Targets>>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    prometheus_address: Option<SocketAddr>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Media {
    #[serde(skip_serializing_if = "Option::is_none")]
    process_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_file_size: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum Repo {
    Sled(Sled),
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Sled {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_capacity: Option<u64>,
}

impl Sled {
    fn set(self) -> Option<Self> {
        let any_set = self.path.is_some() || self.cache_capacity.is_some();

        if any_set {
            Some(self)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Store {
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_endpoint: Option<Url>,
}

/// Run the reelhost video upload server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Args {
    /// Path to the reelhost configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Format of logs printed to stdout
    #[arg(long)]
    log_format: Option<LogFormat>,
    /// Log levels to print to stdout, respects RUST_LOG formatting
    #[arg(long)]
    log_targets: Option<Targets>,

    /// URL to send OpenTelemetry metrics
    #[arg(long)]
    opentelemetry_url: Option<Url>,
    /// Service Name to use for OpenTelemetry
    #[arg(long)]
    opentelemetry_service_name: Option<String>,
    /// Log levels to use for OpenTelemetry, respects RUST_LOG formatting
    #[arg(long)]
    opentelemetry_targets: Option<Targets>,

    /// File to save the current configuration for reproducible runs
    #[arg(long)]
    save_to: Option<PathBuf>,

    /// The address and port to bind the reelhost web server
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// The directory uploads are staged in while they are processed
    #[arg(long)]
    temporary_directory: Option<PathBuf>,

    /// Whether to enable the prometheus scrape endpoint
    #[arg(long)]
    metrics_prometheus_address: Option<SocketAddr>,

    /// How long (in seconds) ffmpeg and ffprobe may run before they are killed
    ///
    /// Remuxing copies every sample of the upload, so this has to cover the largest accepted
    /// file. This number defaults to 900
    #[arg(long)]
    media_process_timeout: Option<u64>,
    /// The maximum size, in megabytes, of a video uploaded as multipart/form-data
    ///
    /// This number defaults to 1024
    #[arg(long)]
    media_max_file_size: Option<usize>,

    /// The path to store the sled database
    #[arg(long)]
    repo_path: Option<PathBuf>,
    /// The cache capacity, in bytes, allowed to sled for in-memory operations
    #[arg(long)]
    repo_cache_capacity: Option<u64>,

    /// The bucket in which to store videos
    #[arg(long)]
    store_bucket_name: Option<String>,
    /// The region the bucket is located in
    #[arg(long)]
    store_region: Option<String>,
    /// The base endpoint of an S3-compatible object storage
    ///
    /// Examples:
    /// - `http://localhost:9000`
    /// - `https://s3.dualstack.eu-west-1.amazonaws.com`
    #[arg(long)]
    store_endpoint: Option<Url>,
    /// The Access Key for the user accessing the bucket
    #[arg(long)]
    store_access_key: Option<String>,
    /// The secret key for the user accessing the bucket
    #[arg(long)]
    store_secret_key: Option<String>,
    /// The session token for accessing the bucket
    #[arg(long)]
    store_session_token: Option<String>,
    /// The base of public video URLs, objects are served from {public_endpoint}/{bucket_name}/{key}
    #[arg(long)]
    store_public_endpoint: Option<Url>,
}
