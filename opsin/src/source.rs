use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_global_executor::spawn_blocking;
use futures_channel::oneshot;
use futures_util::future::{self, FutureExt};

use crate::error::Error;
use crate::Cancellable;

/// Number of bytes read for MIME type detection
const BUF_SIZE: usize = u16::MAX as usize;

/// Where the encoded image data comes from
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send + Sync>),
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => f
                .debug_tuple("Bytes")
                .field(&format!("{} B", bytes.len()))
                .finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

impl Source {
    pub(crate) fn info(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(_) => String::from("<bytes>"),
            Self::Stream(_) => String::from("<stream>"),
        }
    }
}

/// Reads a [`Source`] to completion on a worker thread
///
/// The first [`BUF_SIZE`] bytes become available early for MIME type
/// detection, the complete data follows once the source is drained.
pub struct SourceWorker {
    info: String,
    head_recv: future::Shared<oneshot::Receiver<Arc<Vec<u8>>>>,
    data_recv: Mutex<Option<oneshot::Receiver<Vec<u8>>>>,
    error_recv: future::Shared<oneshot::Receiver<Result<(), Error>>>,
}

impl SourceWorker {
    pub fn spawn(source: Source, cancellable: Cancellable) -> SourceWorker {
        let info = source.info();

        let (error_send, error_recv) = oneshot::channel();
        let (head_send, head_recv) = oneshot::channel();
        let (data_send, data_recv) = oneshot::channel();

        let read_info = info.clone();
        spawn_blocking(move || {
            Self::handle_errors(error_send, move || {
                let data = Self::read_source(source, &cancellable, &read_info)?;

                let head_len = usize::min(data.len(), BUF_SIZE);
                head_send
                    .send(Arc::new(data[..head_len].to_vec()))
                    .or(Err(Error::InternalCommunicationCanceled))?;

                data_send
                    .send(data)
                    .or(Err(Error::InternalCommunicationCanceled))?;

                Ok(())
            })
        })
        .detach();

        SourceWorker {
            info,
            head_recv: head_recv.shared(),
            data_recv: Mutex::new(Some(data_recv)),
            error_recv: error_recv.shared(),
        }
    }

    fn read_source(
        source: Source,
        cancellable: &Cancellable,
        info: &str,
    ) -> Result<Vec<u8>, Error> {
        if cancellable.is_canceled() {
            return Err(Error::Canceled);
        }

        let mut data = Vec::new();
        match source {
            Source::Bytes(bytes) => data = bytes,
            Source::Path(path) => {
                let mut file = File::open(&path).map_err(|err| Error::StdIoError {
                    err: Arc::new(err),
                    info: info.to_string(),
                })?;
                file.read_to_end(&mut data)
                    .map_err(|err| Error::StdIoError {
                        err: Arc::new(err),
                        info: info.to_string(),
                    })?;
            }
            Source::Stream(mut reader) => {
                reader
                    .read_to_end(&mut data)
                    .map_err(|err| Error::StdIoError {
                        err: Arc::new(err),
                        info: info.to_string(),
                    })?;
            }
        }

        if cancellable.is_canceled() {
            return Err(Error::Canceled);
        }

        Ok(data)
    }

    fn handle_errors(
        error_send: oneshot::Sender<Result<(), Error>>,
        f: impl FnOnce() -> Result<(), Error>,
    ) {
        let result = f();
        let _result = error_send.send(result);
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub async fn error(&self) -> Result<(), Error> {
        match self.error_recv.clone().await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// First bytes of the source, for MIME type detection
    pub async fn head(&self) -> Result<Arc<Vec<u8>>, Error> {
        futures_util::select!(
            err = self.error_recv.clone() => err?,
            _bytes = self.head_recv.clone() => Ok(()),
        )?;

        match self.head_recv.clone().await {
            Err(_) => self.error_recv.clone().await?.map(|_| Default::default()),
            Ok(bytes) => Ok(bytes),
        }
    }

    /// Complete source data, available once the worker thread has finished
    ///
    /// Can only be taken once.
    pub async fn data(&self) -> Result<Vec<u8>, Error> {
        let recv = std::mem::take(&mut *self.data_recv.lock().unwrap())
            .ok_or(Error::InternalCommunicationCanceled)?;

        let mut recv = recv.fuse();
        futures_util::select!(
            err = self.error_recv.clone() => err?,
            data = &mut recv => return data.map_err(Into::into),
        )?;

        recv.await.map_err(Into::into)
    }
}
