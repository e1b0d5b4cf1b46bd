use std::os::fd::{AsRawFd, FromRawFd};
use std::os::unix::net::UnixStream;

use crate::error::*;
use crate::ipc::*;

/// Connects a decoder to the host and serves its requests
pub struct Communication;

impl Communication {
    /// Entry point for loader binaries
    ///
    /// The host passes the protocol socket as stdin.
    pub fn spawn(decoder: impl LoaderImplementation) {
        let unix_stream = unsafe { UnixStream::from_raw_fd(std::io::stdin().as_raw_fd()) };

        Self::handle(unix_stream, decoder);
    }

    /// Serves requests from `stream` until the host hangs up
    ///
    /// A panicking decoder unwinds through this loop and closes the stream,
    /// which the host observes as a crashed loader.
    pub fn handle(mut stream: UnixStream, mut decoder: impl LoaderImplementation) {
        loop {
            let request: Request = match read_message(&mut stream) {
                Ok(request) => request,
                Err(_) => break,
            };

            let reply = match request {
                Request::Init(init_request) => {
                    match decoder.init(init_request.data, init_request.mime_type) {
                        Ok(image_info) => Reply::Image(image_info),
                        Err(err) => Reply::Error(err.into()),
                    }
                }
                Request::Frame(frame_request) => match decoder.frame(frame_request) {
                    Ok(frame) => Reply::Frame(frame),
                    Err(err) => Reply::Error(err.into()),
                },
            };

            if write_message(&mut stream, &reply).is_err() {
                break;
            }
        }
    }
}

pub trait LoaderImplementation: 'static {
    /// Prepares decoding and returns image information and metadata
    fn init(&mut self, data: Vec<u8>, mime_type: String) -> Result<ImageInfo, LoaderError>;
    /// Decodes one frame according to `frame_request`
    fn frame(&mut self, frame_request: FrameRequest) -> Result<Frame, LoaderError>;
}

impl LoaderImplementation for Box<dyn LoaderImplementation> {
    fn init(&mut self, data: Vec<u8>, mime_type: String) -> Result<ImageInfo, LoaderError> {
        (**self).init(data, mime_type)
    }

    fn frame(&mut self, frame_request: FrameRequest) -> Result<Frame, LoaderError> {
        (**self).frame(frame_request)
    }
}

/// Generates a `main` function for a loader binary
#[macro_export]
macro_rules! init_main {
    ($decoder:expr) => {
        fn main() {
            $crate::Communication::spawn($decoder);
        }
    };
}
