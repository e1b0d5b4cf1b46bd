use serde::{Deserialize, Serialize};

/// Error that a loader reports back to the host
///
/// Variants are serializable since they cross the process boundary.
#[derive(Deserialize, Serialize, Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("{0}")]
    LoadingError(String),
    #[error("Internal error while interpreting image: {0}")]
    InternalLoaderError(String),
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),
    #[error("No more frames available")]
    NoMoreFrames,
    #[error("Dimension too large for system")]
    ConversionTooLarge,
}

impl From<LoaderError> for RemoteError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::LoadingError(msg) => Self::LoadingError(msg),
            LoaderError::InternalLoaderError(msg) => Self::InternalLoaderError(msg),
            LoaderError::UnsupportedImageFormat(msg) => Self::UnsupportedImageFormat(msg),
            LoaderError::NoMoreFrames => Self::NoMoreFrames,
            LoaderError::ConversionTooLarge => Self::ConversionTooLarge,
        }
    }
}

/// Error type for loader implementations
#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    #[error("{0}")]
    LoadingError(String),
    #[error("Internal error while interpreting image: {0}")]
    InternalLoaderError(String),
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),
    #[error("No more frames available")]
    NoMoreFrames,
    #[error("Dimension too large for system")]
    ConversionTooLarge,
}

impl From<crate::safe_math::DimensionTooLargeError> for LoaderError {
    fn from(err: crate::safe_math::DimensionTooLargeError) -> Self {
        eprintln!("Decoding error: {err:?}");
        Self::ConversionTooLarge
    }
}

pub trait GenericContexts<T> {
    fn context_failed(self) -> Result<T, LoaderError>;
    fn context_internal(self) -> Result<T, LoaderError>;
    fn context_unsupported(self, msg: String) -> Result<T, LoaderError>;
}

impl<T, E> GenericContexts<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_failed(self) -> Result<T, LoaderError> {
        self.map_err(|err| LoaderError::LoadingError(err.to_string()))
    }

    fn context_internal(self) -> Result<T, LoaderError> {
        self.map_err(|err| LoaderError::InternalLoaderError(err.to_string()))
    }

    fn context_unsupported(self, msg: String) -> Result<T, LoaderError> {
        self.map_err(|_| LoaderError::UnsupportedImageFormat(msg))
    }
}

impl<T> GenericContexts<T> for Option<T> {
    fn context_failed(self) -> Result<T, LoaderError> {
        self.ok_or(LoaderError::LoadingError(String::new()))
    }

    fn context_internal(self) -> Result<T, LoaderError> {
        self.ok_or(LoaderError::InternalLoaderError(String::new()))
    }

    fn context_unsupported(self, msg: String) -> Result<T, LoaderError> {
        self.ok_or(LoaderError::UnsupportedImageFormat(msg))
    }
}
