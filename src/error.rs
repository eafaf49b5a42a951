use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use color_eyre::Report;

use crate::error_code::ErrorCode;

/// Shown to clients for every failure that isn't their fault
const GENERIC_MESSAGE: &str = "Unable to process video";

pub(crate) struct Error {
    inner: color_eyre::Report,
}

impl Error {
    pub(crate) fn kind(&self) -> Option<&UploadError> {
        self.inner.downcast_ref()
    }

    pub(crate) fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        self.inner.root_cause()
    }

    pub(crate) fn error_code(&self) -> ErrorCode {
        self.kind()
            .map(|e| e.error_code())
            .unwrap_or(ErrorCode::UNKNOWN_ERROR)
    }

    fn is_client_error(&self) -> bool {
        self.kind().is_some_and(UploadError::is_client_error)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl<T> From<T> for Error
where
    UploadError: From<T>,
{
    fn from(error: T) -> Self {
        Error {
            inner: Report::from(UploadError::from(error)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UploadError {
    #[error("Unsupported media type {0}, only video/mp4 is accepted")]
    UnsupportedMediaType(String),

    #[error("Video id is not a valid UUID")]
    InvalidVideoId,

    #[error("Request does not carry a valid user identity")]
    MissingIdentity,

    #[error("Video belongs to another user")]
    NotOwner,

    #[error("Requested video doesn't exist")]
    VideoNotFound,

    #[error("No video file present in upload")]
    NoVideo,

    #[error("Couldn't upload file")]
    Upload(#[from] actix_form_data::Error),

    #[error("Error in ffmpeg")]
    Ffmpeg(#[from] crate::ffmpeg::FfMpegError),

    #[error("Error staging upload")]
    Stage(#[from] crate::ingest::StageError),

    #[error("Error in store")]
    Store(#[from] crate::store::StoreError),

    #[error("Error generating storage key")]
    Key(#[from] crate::store::storage_key::KeyError),

    #[error("Error in DB")]
    Repo(#[from] crate::repo::RepoError),
}

impl UploadError {
    const fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedMediaType(_) => ErrorCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InvalidVideoId => ErrorCode::INVALID_VIDEO_ID,
            Self::MissingIdentity => ErrorCode::MISSING_IDENTITY,
            Self::NotOwner => ErrorCode::NOT_OWNER,
            Self::VideoNotFound => ErrorCode::VIDEO_NOT_FOUND,
            Self::NoVideo => ErrorCode::NO_VIDEO,
            Self::Upload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::Ffmpeg(e) => e.error_code(),
            Self::Stage(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Key(e) => e.error_code(),
            Self::Repo(e) => e.error_code(),
        }
    }

    const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMediaType(_)
                | Self::InvalidVideoId
                | Self::MissingIdentity
                | Self::NotOwner
                | Self::VideoNotFound
                | Self::NoVideo
                | Self::Upload(_)
        )
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(
                UploadError::UnsupportedMediaType(_)
                | UploadError::InvalidVideoId
                | UploadError::NoVideo
                | UploadError::Upload(_),
            ) => StatusCode::BAD_REQUEST,
            Some(UploadError::MissingIdentity) => StatusCode::UNAUTHORIZED,
            Some(UploadError::NotOwner) => StatusCode::FORBIDDEN,
            Some(UploadError::VideoNotFound) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let msg = if self.is_client_error() {
            self.root_cause().to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        };

        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .body(
                serde_json::to_string(&serde_json::json!({
                    "msg": msg,
                    "code": self.error_code()
                }))
                .unwrap_or_else(|_| {
                    r#"{"msg":"Unable to process video","code":"unknown-error"}"#.to_string()
                }),
            )
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{body::MessageBody, http::StatusCode, ResponseError};

    use super::{Error, UploadError};
    use crate::{
        ffmpeg::FfMpegError,
        ingest::StageError,
        process::ProcessError,
    };

    fn body(error: &Error) -> serde_json::Value {
        let bytes = error
            .error_response()
            .into_body()
            .try_into_bytes()
            .expect("Complete body");

        serde_json::from_slice(&bytes).expect("Json body")
    }

    #[test]
    fn validation_errors_are_specific() {
        let error = Error::from(UploadError::UnsupportedMediaType(String::from("video/webm")));

        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(&error),
            serde_json::json!({
                "msg": "Unsupported media type video/webm, only video/mp4 is accepted",
                "code": "unsupported-media-type"
            })
        );
    }

    #[test]
    fn form_errors_are_client_errors() {
        let error = Error::from(actix_form_data::Error::FileCount);

        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&error)["code"], "file-upload-error");

        let error = Error::from(UploadError::NoVideo);
        assert_eq!(
            body(&error),
            serde_json::json!({
                "msg": "No video file present in upload",
                "code": "no-video"
            })
        );
    }

    #[test]
    fn access_errors() {
        for (error, status) in [
            (UploadError::MissingIdentity, StatusCode::UNAUTHORIZED),
            (UploadError::NotOwner, StatusCode::FORBIDDEN),
            (UploadError::VideoNotFound, StatusCode::NOT_FOUND),
            (UploadError::InvalidVideoId, StatusCode::BAD_REQUEST),
            (UploadError::NoVideo, StatusCode::BAD_REQUEST),
        ] {
            assert_eq!(Error::from(error).status_code(), status);
        }
    }

    #[test]
    fn internal_errors_are_generic() {
        let error = Error::from(StageError::Normalize(FfMpegError::Process(
            ProcessError::NotFound(String::from("ffmpeg")),
        )));

        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(&error),
            serde_json::json!({
                "msg": "Unable to process video",
                "code": "command-not-found"
            })
        );

        let error = Error::from(StageError::Copy(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&error)["msg"], "Unable to process video");
    }
}
