//! Utilities for building opsin loaders
//!
//! Loaders implement [`LoaderImplementation`] and hand the implementation to
//! [`Communication::spawn`] (out-of-process binaries use [`init_main!`]).
//! The host talks to them over a private socket using the length-prefixed
//! message framing from [`ipc`].

pub mod error;
pub mod instruction_handler;
pub mod ipc;
pub mod memory_format;
pub mod safe_math;

pub use error::*;
pub use instruction_handler::*;
pub use ipc::*;
pub use memory_format::*;
pub use safe_math::*;
