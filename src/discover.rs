#[cfg(test)]
mod tests;

use std::{ffi::OsStr, path::Path};

use crate::{ffmpeg::FfMpegError, process::ProcessRunner};

/// The dominant frame shape of a video
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Orientation {
    Landscape,
    Portrait,
    Other,
}

impl Orientation {
    pub(crate) const fn from_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Self::Landscape
        } else if height > width {
            Self::Portrait
        } else {
            Self::Other
        }
    }

    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeStreams {
    #[serde(default)]
    streams: Vec<StreamDescriptor>,
}

/// One entry of ffprobe's `-show_streams` output
///
/// Only `codec_type`, `width` and `height` drive classification, the rest is carried for logging.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct StreamDescriptor {
    #[serde(default)]
    index: u32,
    codec_type: String,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    pix_fmt: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
}

impl StreamDescriptor {
    fn is_video(&self) -> bool {
        self.codec_type == "video"
    }

    #[cfg(test)]
    pub(crate) fn codec_type(&self) -> &str {
        &self.codec_type
    }

    pub(crate) fn dimensions(&self) -> Option<(u32, u32)> {
        self.is_video().then_some((self.width, self.height))
    }
}

/// Classify the orientation of the file at `path` from its first video stream
///
/// A file without any video stream is not an error, it just can't be classified.
#[tracing::instrument(skip(runner))]
pub(crate) async fn classify_orientation(
    runner: &dyn ProcessRunner,
    path: &Path,
) -> Result<Option<Orientation>, FfMpegError> {
    let streams = probe_streams(runner, path).await?;

    Ok(parse_orientation(streams))
}

pub(crate) async fn probe_streams(
    runner: &dyn ProcessRunner,
    path: &Path,
) -> Result<Vec<StreamDescriptor>, FfMpegError> {
    let args: [&OsStr; 6] = [
        "-v".as_ref(),
        "error".as_ref(),
        "-print_format".as_ref(),
        "json".as_ref(),
        "-show_streams".as_ref(),
        path.as_os_str(),
    ];

    let output = runner
        .run("ffprobe", &args)
        .await
        .map_err(FfMpegError::Probe)?;

    let streams: FfProbeStreams = serde_json::from_slice(&output).map_err(FfMpegError::Json)?;

    Ok(streams.streams)
}

fn parse_orientation(streams: Vec<StreamDescriptor>) -> Option<Orientation> {
    let Some(stream) = streams.into_iter().find(StreamDescriptor::is_video) else {
        tracing::debug!("No video stream present");
        return None;
    };

    let orientation = Orientation::from_dimensions(stream.width, stream.height);

    tracing::debug!(
        index = stream.index,
        codec = stream.codec_name.as_deref().unwrap_or("unknown"),
        pix_fmt = stream.pix_fmt.as_deref().unwrap_or("unknown"),
        duration = stream.duration.as_deref().unwrap_or("unknown"),
        frames = stream.nb_frames.as_deref().unwrap_or("unknown"),
        "Classified {}x{} as {orientation}",
        stream.width,
        stream.height,
    );

    Some(orientation)
}
