//! Decoder for the formats handled by the image-rs codecs
//!
//! Runs either inside an in-process sandbox thread or as the standalone
//! `opsin-image-rs` binary.

use std::collections::BTreeMap;
use std::io::Cursor;

use image::{codecs, AnimationDecoder, ColorType, DynamicImage, ImageDecoder};
use opsin_utils::*;

/// Content types this loader can decode
pub const MIME_TYPES: &[&str] = &[
    "image/bmp",
    "image/gif",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "image/vnd.microsoft.icon",
    "image/webp",
    "image/x-ff",
    "image/x-portable-anymap",
    "image/x-portable-bitmap",
    "image/x-portable-graymap",
    "image/x-portable-pixmap",
    "image/x-qoi",
    "image/x-targa",
    "image/x-tga",
];

type Reader = Cursor<Vec<u8>>;

#[derive(Default)]
pub struct ImgDecoder {
    state: Option<DecoderState>,
}

struct DecoderState {
    data: Reader,
    mime_type: String,
    animated: bool,
    /// Decoded still image, kept so repeated frame requests are cheap
    still: Option<DynamicImage>,
    frames: Option<image::Frames<'static>>,
}

impl LoaderImplementation for ImgDecoder {
    fn init(&mut self, data: Vec<u8>, mime_type: String) -> Result<ImageInfo, LoaderError> {
        let data = Cursor::new(data);

        let mut format = ImageRsFormat::create(data.clone(), &mime_type)?;
        if let Err(err) = format.decoder.set_no_limits() {
            eprintln!("Failed to unset decoder limits: {err}");
        }

        let (width, height) = format.decoder.dimensions();
        let color_type = format.decoder.color_type();
        let animated = format.decoder.is_animated();

        let mut image_info = ImageInfo::new(width, height, format.format_name.to_string());
        image_info.preferred_formats = preferred_formats(color_type);
        image_info.animated = animated;
        image_info.metadata = exif_metadata(&mut data.clone());

        self.state = Some(DecoderState {
            data,
            mime_type,
            animated,
            still: None,
            frames: None,
        });

        Ok(image_info)
    }

    fn frame(&mut self, frame_request: FrameRequest) -> Result<Frame, LoaderError> {
        let state = self.state.as_mut().ok_or_else(|| {
            LoaderError::InternalLoaderError(String::from("Frame requested before init"))
        })?;

        let (image, delay) = if state.animated {
            state.next_animation_frame()?
        } else {
            (state.still_image()?, None)
        };

        let image = apply_geometry(image, &frame_request);
        let (width, height) = (image.width(), image.height());

        let target = match frame_request.memory_format {
            Some(format) => format,
            None => *preferred_formats(image.color())
                .first()
                .context_internal()?,
        };
        let (memory_format, data) = convert_memory_format(image, target)?;

        let mut frame = Frame::new(width, height, memory_format, data)?;
        frame.delay = delay;

        Ok(frame)
    }
}

impl DecoderState {
    fn still_image(&mut self) -> Result<DynamicImage, LoaderError> {
        if self.still.is_none() {
            let format = ImageRsFormat::create(self.data.clone(), &self.mime_type)?;
            self.still = Some(format.decoder.decode()?);
        }

        self.still.clone().context_internal()
    }

    /// Advances the animation cursor, looping back after the last frame
    fn next_animation_frame(
        &mut self,
    ) -> Result<(DynamicImage, Option<std::time::Duration>), LoaderError> {
        for _ in 0..2 {
            if self.frames.is_none() {
                let format = ImageRsFormat::create(self.data.clone(), &self.mime_type)?;
                self.frames = format.decoder.into_frames();
            }

            if let Some(frames) = &mut self.frames {
                for frame in frames.by_ref() {
                    match frame {
                        Err(err) => eprintln!("Skipping frame: {err}"),
                        Ok(frame) => {
                            let (delay_num, delay_den) = frame.delay().numer_denom_ms();

                            let delay = if delay_num == 0 || delay_den == 0 {
                                // Other decoders default to this value as well
                                std::time::Duration::from_millis(100)
                            } else {
                                let micros =
                                    f64::round(delay_num as f64 * 1000. / delay_den as f64) as u64;
                                std::time::Duration::from_micros(micros)
                            };

                            let image = DynamicImage::ImageRgba8(frame.into_buffer());
                            return Ok((image, Some(delay)));
                        }
                    }
                }
            }

            // Cursor exhausted, recreate it to loop to the first frame
            self.frames = None;
        }

        Err(LoaderError::NoMoreFrames)
    }
}

fn apply_geometry(mut image: DynamicImage, frame_request: &FrameRequest) -> DynamicImage {
    if let Some((x, y, width, height)) = frame_request.clip {
        let x = x.min(image.width());
        let y = y.min(image.height());
        let width = width.min(image.width().saturating_sub(x));
        let height = height.min(image.height().saturating_sub(y));
        image = image.crop_imm(x, y, width, height);
    }

    if let Some((width, height)) = frame_request.scale {
        // Never upscale, a scale request is an upper bound
        let width = width.min(image.width());
        let height = height.min(image.height());
        if (width, height) != (image.width(), image.height()) {
            image = image.thumbnail(width, height);
        }
    }

    image
}

fn preferred_formats(color_type: ColorType) -> Vec<MemoryFormat> {
    match color_type {
        ColorType::L8 => vec![
            MemoryFormat::G8,
            MemoryFormat::G8a8,
            MemoryFormat::R8g8b8,
            MemoryFormat::R8g8b8a8,
        ],
        ColorType::La8 => vec![
            MemoryFormat::G8a8,
            MemoryFormat::R8g8b8a8,
            MemoryFormat::G8,
            MemoryFormat::R8g8b8,
        ],
        ColorType::L16 => vec![
            MemoryFormat::G16,
            MemoryFormat::G16a16,
            MemoryFormat::R16g16b16,
            MemoryFormat::R16g16b16a16,
            MemoryFormat::G8,
            MemoryFormat::R8g8b8,
        ],
        ColorType::La16 => vec![
            MemoryFormat::G16a16,
            MemoryFormat::R16g16b16a16,
            MemoryFormat::G8a8,
            MemoryFormat::R8g8b8a8,
        ],
        ColorType::Rgb16 => vec![
            MemoryFormat::R16g16b16,
            MemoryFormat::R16g16b16a16,
            MemoryFormat::R8g8b8,
            MemoryFormat::R8g8b8a8,
            MemoryFormat::G8,
        ],
        ColorType::Rgba16 => vec![
            MemoryFormat::R16g16b16a16,
            MemoryFormat::R16g16b16,
            MemoryFormat::R8g8b8a8,
            MemoryFormat::R8g8b8,
        ],
        ColorType::Rgb32F => vec![
            MemoryFormat::R32g32b32Float,
            MemoryFormat::R32g32b32a32Float,
            MemoryFormat::R8g8b8,
        ],
        ColorType::Rgba32F => vec![
            MemoryFormat::R32g32b32a32Float,
            MemoryFormat::R32g32b32Float,
            MemoryFormat::R8g8b8a8,
        ],
        ColorType::Rgba8 => vec![
            MemoryFormat::R8g8b8a8,
            MemoryFormat::R8g8b8,
            MemoryFormat::G8a8,
            MemoryFormat::G8,
        ],
        // Rgb8 and anything the image crate adds later
        _ => vec![
            MemoryFormat::R8g8b8,
            MemoryFormat::R8g8b8a8,
            MemoryFormat::G8,
            MemoryFormat::G8a8,
        ],
    }
}

fn convert_memory_format(
    image: DynamicImage,
    target: MemoryFormat,
) -> Result<(MemoryFormat, Vec<u8>), LoaderError> {
    let data = match target {
        MemoryFormat::G8 => image.to_luma8().into_raw(),
        MemoryFormat::G8a8 => image.to_luma_alpha8().into_raw(),
        MemoryFormat::R8g8b8 => image.to_rgb8().into_raw(),
        MemoryFormat::R8g8b8a8 => image.to_rgba8().into_raw(),
        MemoryFormat::G16 => bytes_u16(image.to_luma16().into_raw()),
        MemoryFormat::G16a16 => bytes_u16(image.to_luma_alpha16().into_raw()),
        MemoryFormat::R16g16b16 => bytes_u16(image.to_rgb16().into_raw()),
        MemoryFormat::R16g16b16a16 => bytes_u16(image.to_rgba16().into_raw()),
        MemoryFormat::R32g32b32Float => bytes_f32(image.to_rgb32f().into_raw()),
        MemoryFormat::R32g32b32a32Float => bytes_f32(image.to_rgba32f().into_raw()),
        unsupported => {
            return Err(LoaderError::UnsupportedImageFormat(format!(
                "Cannot convert to {unsupported:?}"
            )))
        }
    };

    Ok((target, data))
}

fn bytes_u16(raw: Vec<u16>) -> Vec<u8> {
    raw.into_iter().flat_map(u16::to_ne_bytes).collect()
}

fn bytes_f32(raw: Vec<f32>) -> Vec<u8> {
    raw.into_iter().flat_map(f32::to_ne_bytes).collect()
}

fn exif_metadata(data: &mut Reader) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if let Ok(exif) = exif::Reader::new().read_from_container(data) {
        for field in exif.fields() {
            if field.ifd_num != exif::In::PRIMARY {
                continue;
            }

            let key = format!("exif:{}", field.tag);
            let value = field.display_value().to_string();
            metadata.entry(key).or_insert(value);
        }
    }

    metadata
}

pub enum ImageRsDecoder<T: std::io::BufRead + std::io::Seek> {
    Bmp(codecs::bmp::BmpDecoder<T>),
    Farbfeld(codecs::farbfeld::FarbfeldDecoder<T>),
    Gif(codecs::gif::GifDecoder<T>),
    Ico(codecs::ico::IcoDecoder<T>),
    Jpeg(codecs::jpeg::JpegDecoder<T>),
    Png(codecs::png::PngDecoder<T>),
    Pnm(codecs::pnm::PnmDecoder<T>),
    Qoi(codecs::qoi::QoiDecoder<T>),
    Tga(codecs::tga::TgaDecoder<T>),
    Tiff(codecs::tiff::TiffDecoder<T>),
    WebP(codecs::webp::WebPDecoder<T>),
}

pub struct ImageRsFormat<T: std::io::BufRead + std::io::Seek> {
    pub decoder: ImageRsDecoder<T>,
    pub format_name: &'static str,
}

macro_rules! dispatch {
    ($self:expr, $decoder:ident => $body:expr) => {
        match $self {
            ImageRsDecoder::Bmp($decoder) => $body,
            ImageRsDecoder::Farbfeld($decoder) => $body,
            ImageRsDecoder::Gif($decoder) => $body,
            ImageRsDecoder::Ico($decoder) => $body,
            ImageRsDecoder::Jpeg($decoder) => $body,
            ImageRsDecoder::Png($decoder) => $body,
            ImageRsDecoder::Pnm($decoder) => $body,
            ImageRsDecoder::Qoi($decoder) => $body,
            ImageRsDecoder::Tga($decoder) => $body,
            ImageRsDecoder::Tiff($decoder) => $body,
            ImageRsDecoder::WebP($decoder) => $body,
        }
    };
}

impl ImageRsFormat<Reader> {
    pub fn create(data: Reader, mime_type: &str) -> Result<Self, LoaderError> {
        Ok(match mime_type {
            "image/bmp" => Self::new(
                ImageRsDecoder::Bmp(codecs::bmp::BmpDecoder::new(data).context_failed()?),
                "BMP",
            ),
            "image/x-ff" => Self::new(
                ImageRsDecoder::Farbfeld(
                    codecs::farbfeld::FarbfeldDecoder::new(data).context_failed()?,
                ),
                "Farbfeld",
            ),
            "image/gif" => Self::new(
                ImageRsDecoder::Gif(codecs::gif::GifDecoder::new(data).context_failed()?),
                "GIF",
            ),
            "image/vnd.microsoft.icon" => Self::new(
                ImageRsDecoder::Ico(codecs::ico::IcoDecoder::new(data).context_failed()?),
                "ICO",
            ),
            "image/jpeg" => Self::new(
                ImageRsDecoder::Jpeg(codecs::jpeg::JpegDecoder::new(data).context_failed()?),
                "JPEG",
            ),
            "image/png" => Self::new(
                ImageRsDecoder::Png(codecs::png::PngDecoder::new(data).context_failed()?),
                "PNG",
            ),
            "image/x-portable-bitmap"
            | "image/x-portable-graymap"
            | "image/x-portable-pixmap"
            | "image/x-portable-anymap" => Self::new(
                ImageRsDecoder::Pnm(codecs::pnm::PnmDecoder::new(data).context_failed()?),
                "PNM",
            ),
            "image/x-qoi" => Self::new(
                ImageRsDecoder::Qoi(codecs::qoi::QoiDecoder::new(data).context_failed()?),
                "QOI",
            ),
            "image/x-targa" | "image/x-tga" => Self::new(
                ImageRsDecoder::Tga(codecs::tga::TgaDecoder::new(data).context_failed()?),
                "TGA",
            ),
            "image/tiff" => Self::new(
                ImageRsDecoder::Tiff(codecs::tiff::TiffDecoder::new(data).context_failed()?),
                "TIFF",
            ),
            "image/webp" => Self::new(
                ImageRsDecoder::WebP(codecs::webp::WebPDecoder::new(data).context_failed()?),
                "WebP",
            ),
            mime_type => return Err(LoaderError::UnsupportedImageFormat(mime_type.to_string())),
        })
    }

    fn new(decoder: ImageRsDecoder<Reader>, format_name: &'static str) -> Self {
        Self {
            decoder,
            format_name,
        }
    }
}

impl ImageRsDecoder<Reader> {
    pub fn dimensions(&self) -> (u32, u32) {
        dispatch!(self, d => d.dimensions())
    }

    pub fn color_type(&self) -> ColorType {
        dispatch!(self, d => d.color_type())
    }

    pub fn decode(self) -> Result<DynamicImage, LoaderError> {
        dispatch!(self, d => DynamicImage::from_decoder(d).context_failed())
    }

    pub fn set_no_limits(&mut self) -> image::ImageResult<()> {
        let limits = image::Limits::no_limits();
        dispatch!(self, d => d.set_limits(limits))
    }

    pub fn is_animated(&self) -> bool {
        match self {
            Self::Gif(_) => true,
            Self::Png(d) => d.is_apng().unwrap_or(false),
            Self::WebP(d) => d.has_animation(),
            _ => false,
        }
    }

    pub fn into_frames(self) -> Option<image::Frames<'static>> {
        match self {
            Self::Gif(d) => Some(d.into_frames()),
            Self::Png(d) => Some(d.apng().ok()?.into_frames()),
            Self::WebP(d) => Some(d.into_frames()),
            _ => None,
        }
    }
}
