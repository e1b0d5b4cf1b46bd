use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opsin_utils::{ImageInfo, InitRequest, MemoryFormat, MemoryFormatSelection};

use crate::config::Config;
use crate::process::DecoderProcess;
use crate::sandbox::{SandboxMechanism, SandboxSelector};
use crate::source::{Source, SourceWorker};
use crate::{Cancellable, Error, MimeType};

pub type Result<T> = std::result::Result<T, Error>;

/// Watchdog timeout applied to sandboxed loaders
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Image request builder
#[derive(Debug)]
pub struct Loader {
    source: Source,
    cancellable: Cancellable,
    mime_type_override: Option<MimeType>,
    sandbox_selector: SandboxSelector,
    memory_format_selection: MemoryFormatSelection,
    timeout: Option<Duration>,
}

impl Loader {
    /// Creates a loader for an image file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::for_source(Source::Path(path.as_ref().to_path_buf()))
    }

    /// Creates a loader for image data already in memory
    pub fn new_for_bytes(bytes: Vec<u8>) -> Self {
        Self::for_source(Source::Bytes(bytes))
    }

    /// Creates a loader that drains a reader
    pub fn new_for_stream(stream: impl Read + Send + Sync + 'static) -> Self {
        Self::for_source(Source::Stream(Box::new(stream)))
    }

    fn for_source(source: Source) -> Self {
        Self {
            source,
            cancellable: Cancellable::new(),
            mime_type_override: None,
            sandbox_selector: SandboxSelector::default(),
            memory_format_selection: MemoryFormatSelection::default(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Changes the sandbox strategy
    ///
    /// The default is to automatically select a mechanism. The sandbox is
    /// never disabled automatically.
    pub fn sandbox_selector(&mut self, sandbox_selector: SandboxSelector) -> &mut Self {
        self.sandbox_selector = sandbox_selector;
        self
    }

    /// Restricts the memory formats frames may use
    ///
    /// The default is to accept every format. Loading fails with
    /// [`Error::NoAcceptableFormat`] if the loader supports none of the
    /// accepted formats.
    pub fn accepted_memory_formats(
        &mut self,
        memory_format_selection: MemoryFormatSelection,
    ) -> &mut Self {
        self.memory_format_selection = memory_format_selection;
        self
    }

    /// Sets a [`Cancellable`] to cancel any loader operations
    pub fn cancellable(&mut self, cancellable: Cancellable) -> &mut Self {
        self.cancellable = cancellable;
        self
    }

    /// Changes the watchdog timeout for loader operations
    ///
    /// `None` disables the watchdog. The timeout is ignored for unsandboxed
    /// loaders since they cannot be torn down reliably.
    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Skips MIME type detection and forces a specific format
    pub fn force_mime_type(&mut self, mime_type: &str) -> &mut Self {
        self.mime_type_override = Some(mime_type.to_string());
        self
    }

    /// Load basic image information and enable further operations
    pub async fn load(mut self) -> Result<Image> {
        let config = Config::cached().await;

        let source = std::mem::replace(&mut self.source, Source::Bytes(Vec::new()));
        let source_worker = SourceWorker::spawn(source, self.cancellable.clone());

        let mime_type = match &self.mime_type_override {
            Some(mime_type) => mime_type.clone(),
            None => {
                let head = source_worker.head().await?;
                crate::mime::guess_mime_type(&head)
                    .unwrap_or_else(|| String::from("application/octet-stream"))
            }
        };

        let loader_config = config.get(&mime_type)?;
        let sandbox_mechanism = self
            .sandbox_selector
            .determine_sandbox_mechanism(loader_config);

        // An unsandboxed loader cannot be torn down reliably
        let timeout = if sandbox_mechanism == SandboxMechanism::NotSandboxed {
            None
        } else {
            self.timeout
        };

        let process = DecoderProcess::new(mime_type.clone(), loader_config, sandbox_mechanism)?;

        let data = source_worker.data().await?;
        let info = process
            .init(
                InitRequest {
                    mime_type: mime_type.clone(),
                    data,
                },
                &self.cancellable,
                timeout,
            )
            .await?;

        let memory_format = self
            .memory_format_selection
            .best_match(&info.preferred_formats)
            .ok_or(Error::NoAcceptableFormat)?;

        Ok(Image {
            loader: self,
            process,
            info,
            mime_type,
            memory_format,
            active_sandbox_mechanism: sandbox_mechanism,
            timeout,
            failed: Mutex::new(None),
        })
    }

    /// Blocking variant of [`load`](Self::load)
    pub fn load_sync(self) -> Result<Image> {
        async_global_executor::block_on(self.load())
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.cancellable.cancel();
    }
}

/// Image handle containing metadata and allowing frame requests
#[derive(Debug)]
pub struct Image {
    pub(crate) loader: Loader,
    process: DecoderProcess,
    info: ImageInfo,
    mime_type: MimeType,
    /// Negotiated memory format, every frame is delivered in it
    memory_format: MemoryFormat,
    active_sandbox_mechanism: SandboxMechanism,
    timeout: Option<Duration>,
    /// Fatal error the loader ran into, all further operations fail with it
    failed: Mutex<Option<Error>>,
}

impl Image {
    /// Loads the next frame
    ///
    /// Loads texture and information of the next frame. For still images,
    /// every call returns the same single frame. For animated images, this
    /// function advances through the animation and loops back to the first
    /// frame after the last one.
    pub async fn next_frame(&self) -> Result<Frame> {
        self.frame(opsin_utils::FrameRequest::default()).await
    }

    /// Blocking variant of [`next_frame`](Self::next_frame)
    pub fn next_frame_sync(&self) -> Result<Frame> {
        async_global_executor::block_on(self.next_frame())
    }

    /// Loads a specific frame
    ///
    /// Loaders can ignore parts of the instructions in the `FrameRequest`.
    pub async fn specific_frame(&self, frame_request: FrameRequest) -> Result<Frame> {
        self.frame(frame_request.request).await
    }

    /// Blocking variant of [`specific_frame`](Self::specific_frame)
    pub fn specific_frame_sync(&self, frame_request: FrameRequest) -> Result<Frame> {
        async_global_executor::block_on(self.specific_frame(frame_request))
    }

    async fn frame(&self, mut request: opsin_utils::FrameRequest) -> Result<Frame> {
        if let Some(err) = &*self.failed.lock().unwrap() {
            return Err(err.clone());
        }

        request.memory_format = Some(self.memory_format);

        let result = self
            .process
            .request_frame(request, &self.loader.cancellable, self.timeout)
            .await;

        match result {
            // The loader has to deliver the negotiated format
            Ok(frame) if frame.memory_format != self.memory_format => Err(Error::UnexpectedReply),
            Ok(frame) => Ok(Frame {
                buffer: Arc::new(frame.data),
                width: frame.width,
                height: frame.height,
                stride: frame.stride,
                memory_format: frame.memory_format,
                delay: frame.delay,
            }),
            Err(err) => {
                if err.is_fatal() {
                    *self.failed.lock().unwrap() = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Returns already obtained info
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Returns detected MIME type of the file
    pub fn mime_type(&self) -> MimeType {
        self.mime_type.clone()
    }

    /// A textual representation of the image format
    pub fn format_name(&self) -> String {
        self.info.format_name.clone()
    }

    /// Memory format negotiated with the loader
    pub fn memory_format(&self) -> MemoryFormat {
        self.memory_format
    }

    /// Whether the image carries more than one frame
    pub fn is_animated(&self) -> bool {
        self.info.animated
    }

    /// Metadata value for `key`, for example `exif:Model`
    pub fn metadata_key_value(&self, key: &str) -> Option<String> {
        self.info.metadata.get(key).cloned()
    }

    /// Available metadata keys, sorted
    pub fn metadata_keys(&self) -> Vec<String> {
        self.info.metadata.keys().cloned().collect()
    }

    /// [`Cancellable`] that cancels operations within this image
    pub fn cancellable(&self) -> Cancellable {
        self.loader.cancellable.clone()
    }

    /// Active sandbox mechanism
    pub fn active_sandbox_mechanism(&self) -> SandboxMechanism {
        self.active_sandbox_mechanism
    }
}

/// A frame of an image often being the complete image
#[derive(Debug, Clone)]
pub struct Frame {
    buffer: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    /// Line stride
    stride: u32,
    memory_format: MemoryFormat,
    delay: Option<Duration>,
}

impl Frame {
    pub fn buf_bytes(&self) -> Arc<Vec<u8>> {
        self.buffer.clone()
    }

    pub fn buf_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Line stride in bytes
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn memory_format(&self) -> MemoryFormat {
        self.memory_format
    }

    /// Duration to show frame for animations.
    ///
    /// If the value is not set, the image is not animated.
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

/// Request information to get a specific frame
#[derive(Default, Debug)]
#[must_use]
pub struct FrameRequest {
    request: opsin_utils::FrameRequest,
}

impl FrameRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale the frame to fit into `width` × `height`, keeping aspect ratio
    ///
    /// Images are never scaled up.
    pub fn scale(mut self, width: u32, height: u32) -> Self {
        self.request.scale = Some((width, height));
        self
    }

    /// Only decode the given region, in image coordinates
    pub fn clip(mut self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.request.clip = Some((x, y, width, height));
        self
    }
}

/// Returns a list of mime types for which loaders are configured
pub async fn supported_mime_types() -> Vec<MimeType> {
    Config::cached().await.mime_types()
}

/// Blocking variant of [`supported_mime_types`]
pub fn supported_mime_types_sync() -> Vec<MimeType> {
    async_global_executor::block_on(supported_mime_types())
}

#[cfg(test)]
mod test {
    use super::*;

    #[allow(dead_code)]
    fn ensure_futures_are_send() {
        let task = async_global_executor::spawn(async {
            let loader = Loader::new("does-not-exist.png");
            let image = loader.load().await.unwrap();
            image.next_frame().await.unwrap();
        });
        task.detach();
    }
}
