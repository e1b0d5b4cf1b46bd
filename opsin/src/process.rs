use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use async_io::{Async, Timer};
use futures_lite::{AsyncReadExt, AsyncWriteExt};
use futures_util::{pin_mut, FutureExt};
use opsin_utils::{
    decode_message, encode_message, FrameRequest, ImageInfo, InitRequest, Reply, Request,
    SafeConversion, SafeMath, MAX_MESSAGE_SIZE,
};

use crate::config::ImageLoaderConfig;
use crate::sandbox::{RemoteWorker, Sandbox, SandboxMechanism};
use crate::{Cancellable, Error, MimeType};

/// Host end of the loader protocol socket
struct Connection {
    stream: Async<UnixStream>,
}

impl Connection {
    async fn send(&mut self, request: &Request) -> std::io::Result<()> {
        let framed = encode_message(request)?;
        self.stream.write_all(&framed).await?;
        self.stream.flush().await
    }

    async fn receive(&mut self) -> std::io::Result<Reply> {
        let mut len = [0; 4];
        self.stream.read_exact(&mut len).await?;
        let len = u32::from_le_bytes(len);

        if len > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        let mut body = vec![0; len.try_usize().map_err(std::io::Error::other)?];
        self.stream.read_exact(&mut body).await?;

        decode_message(&body)
    }
}

/// Drives one running loader
///
/// Requests are serialized over the connection, one reply per request.
pub struct DecoderProcess {
    connection: async_lock::Mutex<Connection>,
    /// Second handle to the socket, for teardown while a request is pending
    socket: UnixStream,
    worker: std::sync::Mutex<RemoteWorker>,
    cmd_debug: String,
    mime_type: MimeType,
}

impl std::fmt::Debug for DecoderProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderProcess")
            .field("cmd_debug", &self.cmd_debug)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

impl DecoderProcess {
    pub fn new(
        mime_type: MimeType,
        loader_config: &ImageLoaderConfig,
        sandbox_mechanism: SandboxMechanism,
    ) -> crate::Result<Self> {
        let (local, remote) = UnixStream::pair()?;

        let sandbox = Sandbox::new(sandbox_mechanism, loader_config.clone(), remote);
        let (worker, cmd_debug) = sandbox.spawn()?;

        let socket = local.try_clone()?;
        let connection = Connection {
            stream: Async::new(local)?,
        };

        Ok(Self {
            connection: async_lock::Mutex::new(connection),
            socket,
            worker: std::sync::Mutex::new(worker),
            cmd_debug,
            mime_type,
        })
    }

    pub async fn init(
        &self,
        init_request: InitRequest,
        cancellable: &Cancellable,
        timeout: Option<Duration>,
    ) -> crate::Result<ImageInfo> {
        match self
            .request(Request::Init(init_request), cancellable, timeout)
            .await?
        {
            Reply::Image(image_info) => Ok(image_info),
            Reply::Error(err) => Err(err.into()),
            Reply::Frame(_) => Err(Error::UnexpectedReply),
        }
    }

    pub async fn request_frame(
        &self,
        frame_request: FrameRequest,
        cancellable: &Cancellable,
        timeout: Option<Duration>,
    ) -> crate::Result<opsin_utils::Frame> {
        let frame = match self
            .request(Request::Frame(frame_request), cancellable, timeout)
            .await?
        {
            Reply::Frame(frame) => frame,
            Reply::Error(err) => return Err(err.into()),
            Reply::Image(_) => return Err(Error::UnexpectedReply),
        };

        if frame.width < 1 || frame.height < 1 {
            return Err(Error::WidthOrHeightZero(format!("{frame:?}")));
        }

        let min_stride = frame.memory_format.n_bytes().u32().smul(frame.width)?;
        if frame.stride < min_stride {
            return Err(Error::StrideTooSmall(format!("{frame:?}")));
        }

        if frame.data.len() < frame.n_bytes()? {
            return Err(Error::TextureTooSmall {
                texture_size: frame.data.len(),
                frame: format!("{frame:?}"),
            });
        }

        Ok(frame)
    }

    /// Sends one request and waits for its reply
    ///
    /// Cancellation and the timeout tear the loader down since a reply might
    /// still arrive later.
    async fn request(
        &self,
        request: Request,
        cancellable: &Cancellable,
        timeout: Option<Duration>,
    ) -> crate::Result<Reply> {
        let communication = async {
            let mut connection = self.connection.lock().await;
            connection.send(&request).await?;
            connection.receive().await
        }
        .fuse();

        let canceled = cancellable.canceled().fuse();
        let deadline = match timeout {
            Some(duration) => Timer::after(duration),
            None => Timer::never(),
        }
        .fuse();

        pin_mut!(communication);
        pin_mut!(canceled);
        pin_mut!(deadline);

        let result = futures_util::select! {
            reply = communication => reply,
            () = canceled => {
                self.kill();
                return Err(Error::Canceled);
            }
            _instant = deadline => {
                self.kill();
                return Err(Error::Timeout {
                    timeout: timeout.unwrap_or_default(),
                });
            }
        };

        result.map_err(|err| self.communication_error(err))
    }

    /// Interprets a broken connection
    ///
    /// A hung up socket usually means the loader crashed or was killed by
    /// its memory limit. Depending on whether the loader died before or
    /// after our request was written, the failure shows up as EOF or as a
    /// broken pipe.
    fn communication_error(&self, err: std::io::Error) -> Error {
        let hangup = matches!(
            err.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
        );

        if hangup {
            if let RemoteWorker::Process(child) = &mut *self.worker.lock().unwrap() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Error::PrematureExit {
                        status,
                        cmd: self.cmd_debug.clone(),
                    };
                }
            }

            return Error::DecoderCrashed {
                info: self.cmd_debug.clone(),
            };
        }

        err.into()
    }

    /// Tears the loader down
    ///
    /// Loader processes are killed. Worker threads only have their socket
    /// shut down, which unblocks them the next time they touch it.
    fn kill(&self) {
        let _result = self.socket.shutdown(Shutdown::Both);

        if let RemoteWorker::Process(child) = &mut *self.worker.lock().unwrap() {
            if let Ok(pid) = i32::try_from(child.id()) {
                let _result = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid),
                    nix::sys::signal::Signal::SIGKILL,
                );
            }
            let _result = child.try_wait();
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        if let RemoteWorker::Process(child) = &mut *self.worker.lock().unwrap() {
            let _result = child.kill();
            let _result = child.wait();
        }
    }
}
