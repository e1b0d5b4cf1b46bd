#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]

//! Opsin decodes images into memory buffers and extracts image metadata. The
//! decoding happens in sandboxed modular image loaders, either on an isolated
//! worker thread inside the host process or in a separate loader process.
//!
//! # Example
//!
//! ```no_run
//! # use opsin::*;
//! # async_global_executor::block_on(async {
//! let loader = Loader::new("image.jpg");
//! let image = loader.load().await?;
//!
//! let height = image.info().height;
//! let frame = image.next_frame().await?;
//! # Ok::<(), Error>(()) });
//! ```

mod api;
mod cancellable;
mod config;
mod default_formats;
mod error;
mod mime;
mod process;
mod sandbox;
mod source;

pub use api::*;
pub use cancellable::Cancellable;
pub use config::{COMPAT_VERSION, LOADERS_DIR_ENV};
pub use default_formats::DEFAULT_MIME_TYPES;
pub use error::Error;
pub use mime::MimeType;
pub use opsin_utils::{ImageInfo, MemoryFormat, MemoryFormatSelection, RemoteError};
pub use sandbox::{SandboxMechanism, SandboxSelector};
pub use source::Source;
