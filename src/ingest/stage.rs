use std::{
    future::Future,
    io::SeekFrom,
    path::{Path, PathBuf},
};

use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWriteExt};

use crate::{
    error_code::ErrorCode,
    ffmpeg::{faststart_path, FfMpegError},
    process::ProcessRunner,
    tmp_file::{TmpDir, TmpFile},
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StageError {
    #[error("Failed to create staging file")]
    Create(#[source] std::io::Error),

    #[error("Failed to write upload to staging file")]
    Copy(#[source] std::io::Error),

    #[error("Failed to normalize staged video")]
    Normalize(#[source] FfMpegError),

    #[error("Failed to open normalized video")]
    Open(#[source] std::io::Error),

    #[error("Failed to rewind normalized video")]
    Seek(#[source] std::io::Error),
}

impl StageError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Normalize(e) => e.error_code(),
            Self::Create(_) | Self::Copy(_) | Self::Open(_) | Self::Seek(_) => {
                ErrorCode::STAGE_IO_ERROR
            }
        }
    }
}

/// A normalized video, opened and rewound
///
/// The file stays on disk for as long as this value lives so it can still be probed by path.
#[derive(Debug)]
pub(crate) struct StagedFile<F = tokio::fs::File> {
    file: F,
    path: TmpFile,
}

impl<F> StagedFile<F> {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn file_mut(&mut self) -> &mut F {
        &mut self.file
    }

    /// Close the handle and remove the normalized file
    pub(crate) async fn cleanup(self) -> std::io::Result<()> {
        let StagedFile { file, path } = self;
        drop(file);

        path.cleanup().await
    }
}

async fn discard(file: TmpFile) {
    let path = file.to_path_buf();

    if let Err(e) = file.cleanup().await {
        tracing::warn!("Failed to remove {}: {e}", path.display());
    }
}

async fn write_input<R>(reader: &mut R, file: &mut tokio::fs::File) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let written = tokio::io::copy(reader, file).await?;
    file.flush().await?;

    Ok(written)
}

/// Copy `reader` into scratch space and remux it for streaming
///
/// Whatever happens, the raw copy is gone by the time this returns. On error nothing is left
/// behind at all.
pub(crate) async fn stage<R>(
    tmp_dir: &TmpDir,
    runner: &dyn ProcessRunner,
    reader: &mut R,
) -> Result<StagedFile, StageError>
where
    R: AsyncRead + Unpin,
{
    stage_with(tmp_dir, runner, reader, |path| tokio::fs::File::open(path)).await
}

#[tracing::instrument(skip_all)]
async fn stage_with<R, O, Fut, F>(
    tmp_dir: &TmpDir,
    runner: &dyn ProcessRunner,
    reader: &mut R,
    open: O,
) -> Result<StagedFile<F>, StageError>
where
    R: AsyncRead + Unpin,
    O: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<F>>,
    F: AsyncRead + AsyncSeek + Unpin,
{
    let input = tmp_dir.tmp_file(Some(".mp4"));

    let mut file = match tokio::fs::File::create(&input).await {
        Ok(file) => file,
        Err(e) => {
            discard(input).await;
            return Err(StageError::Create(e));
        }
    };

    match write_input(reader, &mut file).await {
        Ok(written) => tracing::debug!("Staged {written} bytes"),
        Err(e) => {
            drop(file);
            discard(input).await;
            return Err(StageError::Copy(e));
        }
    }
    drop(file);

    // guard the output before ffmpeg runs so partial writes are removed too
    let output = input.sibling(faststart_path);

    match crate::ffmpeg::normalize_for_streaming(runner, &input).await {
        Ok(normalized) => debug_assert_eq!(normalized, *output),
        Err(e) => {
            discard(output).await;
            discard(input).await;
            return Err(StageError::Normalize(e));
        }
    }

    let mut file = match open(output.to_path_buf()).await {
        Ok(file) => file,
        Err(e) => {
            discard(output).await;
            discard(input).await;
            return Err(StageError::Open(e));
        }
    };

    discard(input).await;

    if let Err(e) = file.seek(SeekFrom::Start(0)).await {
        drop(file);
        discard(output).await;
        return Err(StageError::Seek(e));
    }

    Ok(StagedFile { file, path: output })
}
