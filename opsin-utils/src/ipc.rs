//! Wire protocol between host and loader
//!
//! Every message is a u32 little-endian length prefix followed by a
//! MessagePack encoded body. The host sends [`Request`]s and receives one
//! [`Reply`] per request, in order. Pixel data travels inline in the reply.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::memory_format::MemoryFormat;
use crate::safe_math::*;

/// Upper bound for a single message body
///
/// Larger frames indicate a broken or malicious loader.
pub const MAX_MESSAGE_SIZE: u32 = 1 << 30;

#[derive(Deserialize, Serialize, Debug)]
pub enum Request {
    Init(InitRequest),
    Frame(FrameRequest),
}

#[derive(Deserialize, Serialize, Debug)]
pub enum Reply {
    Image(ImageInfo),
    Frame(Frame),
    Error(RemoteError),
}

#[derive(Deserialize, Serialize)]
pub struct InitRequest {
    pub mime_type: String,
    /// Complete image data
    pub data: Vec<u8>,
}

impl std::fmt::Debug for InitRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitRequest")
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("{} B", self.data.len()))
            .finish()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct FrameRequest {
    /// Maximum output dimensions, aspect ratio is preserved
    pub scale: Option<(u32, u32)>,
    /// Instruction to only decode part of the image
    pub clip: Option<(u32, u32, u32, u32)>,
    /// Memory format the frame data must be converted to
    pub memory_format: Option<MemoryFormat>,
}

/// Various image metadata
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format_name: String,
    /// Namespaced key-value metadata, e.g. `exif:Model`
    pub metadata: BTreeMap<String, String>,
    /// Output formats, from most to least preferred by the decoder
    pub preferred_formats: Vec<MemoryFormat>,
    pub animated: bool,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32, format_name: String) -> Self {
        Self {
            width,
            height,
            format_name,
            metadata: BTreeMap::new(),
            preferred_formats: Vec::new(),
            animated: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Line stride in bytes
    pub stride: u32,
    pub memory_format: MemoryFormat,
    pub data: Vec<u8>,
    pub delay: Option<Duration>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("memory_format", &self.memory_format)
            .field("data", &format_args!("{} B", self.data.len()))
            .field("delay", &self.delay)
            .finish()
    }
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        memory_format: MemoryFormat,
        data: Vec<u8>,
    ) -> Result<Self, DimensionTooLargeError> {
        let stride = memory_format.n_bytes().u32().smul(width)?;

        Ok(Self {
            width,
            height,
            stride,
            memory_format,
            data,
            delay: None,
        })
    }

    pub fn n_bytes(&self) -> Result<usize, DimensionTooLargeError> {
        self.stride.try_usize()?.smul(self.height.try_usize()?)
    }
}

/// Encodes a message as one complete length-prefixed frame
pub fn encode_message<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    let body = rmp_serde::to_vec(message)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    let len = body
        .len()
        .try_u32()
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Message too large"))?;

    let mut framed = Vec::with_capacity(body.len().saturating_add(4));
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(&body);

    Ok(framed)
}

pub fn write_message<T: Serialize>(writer: &mut impl Write, message: &T) -> io::Result<()> {
    writer.write_all(&encode_message(message)?)?;
    writer.flush()
}

pub fn read_message<T: DeserializeOwned>(reader: &mut impl Read) -> io::Result<T> {
    let mut len = [0; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len);

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut body = vec![0; len.try_usize().map_err(io::Error::other)?];
    reader.read_exact(&mut body)?;

    rmp_serde::from_slice(&body).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Decodes a message body that was read with an external length prefix
pub fn decode_message<T: DeserializeOwned>(body: &[u8]) -> io::Result<T> {
    rmp_serde::from_slice(body).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut buf = Vec::new();

        let request = Request::Frame(FrameRequest {
            scale: Some((32, 32)),
            clip: None,
            memory_format: Some(MemoryFormat::R8g8b8),
        });
        write_message(&mut buf, &request).unwrap();

        let decoded: Request = read_message(&mut buf.as_slice()).unwrap();
        match decoded {
            Request::Frame(frame_request) => {
                assert_eq!(frame_request.scale, Some((32, 32)));
                assert_eq!(frame_request.memory_format, Some(MemoryFormat::R8g8b8));
            }
            other => panic!("Unexpected message: {other:?}"),
        }
    }

    #[test]
    fn frame_stride() {
        let frame = Frame::new(600, 400, MemoryFormat::R8g8b8, vec![0; 600 * 400 * 3]).unwrap();
        assert_eq!(frame.stride, 1800);
        assert_eq!(frame.n_bytes().unwrap(), 600 * 400 * 3);
    }

    #[test]
    fn oversized_message_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        buf.extend_from_slice(&[0; 16]);

        let result: io::Result<Request> = read_message(&mut buf.as_slice());
        assert!(result.is_err());
    }
}
