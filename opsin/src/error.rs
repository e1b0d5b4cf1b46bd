use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use futures_channel::oneshot;
use opsin_utils::{DimensionTooLargeError, RemoteError};

use crate::MimeType;

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Remote error: {0}")]
    RemoteError(RemoteError),
    #[error("IO error: {err} {info}")]
    StdIoError {
        err: Arc<std::io::Error>,
        info: String,
    },
    #[error("Internal communication was unexpectedly canceled")]
    InternalCommunicationCanceled,
    #[error("Unknown image format: {0}")]
    UnknownImageFormat(MimeType),
    #[error("Loader process exited early with status '{}'. {cmd}", .status.code().unwrap_or_default())]
    PrematureExit { status: ExitStatus, cmd: String },
    #[error("Could not spawn `{cmd}`: {err}")]
    SpawnError {
        cmd: String,
        err: Arc<std::io::Error>,
    },
    #[error("Loader terminated abnormally: {info}")]
    DecoderCrashed { info: String },
    #[error("Loader did not respond within {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },
    #[error("None of the loader's supported memory formats is accepted")]
    NoAcceptableFormat,
    #[error("No more frames available")]
    NoMoreFrames,
    #[error("Operation was canceled")]
    Canceled,
    #[error("Unexpected reply from loader")]
    UnexpectedReply,
    #[error("Conversion too large")]
    ConversionTooLarge,
    #[error("Texture is only {texture_size} B but was announced differently: {frame}")]
    TextureTooSmall { texture_size: usize, frame: String },
    #[error("Stride is smaller than possible: {0}")]
    StrideTooSmall(String),
    #[error("Width or height is zero: {0}")]
    WidthOrHeightZero(String),
}

impl Error {
    pub fn unsupported_format(&self) -> Option<String> {
        match self {
            Self::UnknownImageFormat(mime_type) => Some(mime_type.clone()),
            Self::RemoteError(RemoteError::UnsupportedImageFormat(msg)) => Some(msg.clone()),
            _ => None,
        }
    }

    /// Whether the error leaves the loader in an unusable state
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DecoderCrashed { .. }
                | Self::PrematureExit { .. }
                | Self::Timeout { .. }
                | Self::Canceled
        )
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NoMoreFrames => Self::NoMoreFrames,
            RemoteError::ConversionTooLarge => Self::ConversionTooLarge,
            other => Self::RemoteError(other),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::StdIoError {
            err: Arc::new(err),
            info: String::new(),
        }
    }
}

impl From<oneshot::Canceled> for Error {
    fn from(_err: oneshot::Canceled) -> Self {
        Self::InternalCommunicationCanceled
    }
}

impl From<DimensionTooLargeError> for Error {
    fn from(_err: DimensionTooLargeError) -> Self {
        Self::ConversionTooLarge
    }
}
