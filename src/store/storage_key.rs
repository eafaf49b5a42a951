use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, CryptoRng, RngCore};

use crate::{discover::Orientation, error_code::ErrorCode};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub(crate) enum KeyError {
    #[error("Failed to read from the system randomness source")]
    Randomness(#[source] rand::Error),
}

impl KeyError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Randomness(_) => ErrorCode::RANDOMNESS_ERROR,
        }
    }
}

/// Where a processed video lives in the object store: `{orientation}/{token}.mp4`
///
/// Tokens are 32 random bytes, so collisions are not checked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StorageKey {
    key: String,
}

impl StorageKey {
    pub(crate) fn generate(orientation: Option<Orientation>) -> Result<Self, KeyError> {
        Self::generate_with(&mut OsRng, orientation)
    }

    fn generate_with<R>(rng: &mut R, orientation: Option<Orientation>) -> Result<Self, KeyError>
    where
        R: RngCore + CryptoRng,
    {
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.try_fill_bytes(&mut bytes)
            .map_err(KeyError::Randomness)?;

        let prefix = orientation.as_ref().map(Orientation::as_str).unwrap_or("");
        let token = URL_SAFE_NO_PAD.encode(bytes);

        Ok(StorageKey {
            key: format!("{prefix}/{token}.mp4"),
        })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.key
    }

    /// The key as an object store location
    ///
    /// Object store paths have no leading delimiter, so an unclassified key `/{token}.mp4`
    /// is stored as `{token}.mp4`. Classified keys keep their orientation prefix.
    pub(crate) fn to_object_path(&self) -> object_store::path::Path {
        object_store::path::Path::from(self.as_str())
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}
