use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use crate::{
    error_code::ErrorCode,
    process::{ProcessError, ProcessRunner},
};

/// Appended to the input path to name the remuxed output
pub(crate) const FASTSTART_SUFFIX: &str = ".faststart";

#[derive(Debug, thiserror::Error)]
pub(crate) enum FfMpegError {
    #[error("Error in ffmpeg process")]
    Process(#[source] ProcessError),

    #[error("Error in ffprobe process")]
    Probe(#[source] ProcessError),

    #[error("Invalid output format")]
    Json(#[source] serde_json::Error),
}

impl FfMpegError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) | Self::Probe(e) => e.error_code(),
            Self::Json(_) => ErrorCode::COMMAND_OUTPUT,
        }
    }
}

pub(crate) fn faststart_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(FASTSTART_SUFFIX);
    PathBuf::from(name)
}

/// Remux `path` so its index sits at the front of the file
///
/// Samples are stream-copied, nothing is re-encoded. The result is written next to the input and
/// the input is left alone: on success the caller owns both files.
#[tracing::instrument(skip(runner))]
pub(crate) async fn normalize_for_streaming(
    runner: &dyn ProcessRunner,
    path: &Path,
) -> Result<PathBuf, FfMpegError> {
    let output = faststart_path(path);

    let args: [&OsStr; 13] = [
        "-nostdin".as_ref(),
        "-hide_banner".as_ref(),
        "-v".as_ref(),
        "warning".as_ref(),
        "-i".as_ref(),
        path.as_os_str(),
        "-c".as_ref(),
        "copy".as_ref(),
        "-movflags".as_ref(),
        "faststart".as_ref(),
        "-f".as_ref(),
        "mp4".as_ref(),
        output.as_os_str(),
    ];

    runner
        .run("ffmpeg", &args)
        .await
        .map_err(FfMpegError::Process)?;

    Ok(output)
}
