use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use opsin::*;

fn block_on<T>(future: impl std::future::Future<Output = T>) -> T {
    async_global_executor::block_on(future)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut data = Cursor::new(Vec::new());
    image.write_to(&mut data, format).unwrap();
    data.into_inner()
}

/// 600×400 RGB gradient
fn test_jpeg() -> Vec<u8> {
    let buffer = RgbImage::from_fn(600, 400, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
    encode(DynamicImage::ImageRgb8(buffer), ImageFormat::Jpeg)
}

fn gray_png() -> Vec<u8> {
    let buffer = image::GrayImage::from_fn(64, 32, |x, y| image::Luma([((x + y) % 256) as u8]));
    encode(DynamicImage::ImageLuma8(buffer), ImageFormat::Png)
}

/// 20×10 GIF with one solid colored frame per entry, 100 ms delay each
fn animated_gif(colors: &[[u8; 3]]) -> Vec<u8> {
    let mut data = Vec::new();

    let mut encoder = GifEncoder::new(&mut data);
    encoder.set_repeat(Repeat::Infinite).unwrap();
    for [r, g, b] in colors {
        let buffer = RgbaImage::from_pixel(20, 10, Rgba([*r, *g, *b, 255]));
        let frame = image::Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1));
        encoder.encode_frame(frame).unwrap();
    }
    drop(encoder);

    data
}

/// Minimal Exif APP1 segment: little-endian TIFF with `Make` and `Model`
/// in the primary IFD
fn exif_app1() -> Vec<u8> {
    let make = b"Opsin\0";
    let model = b"Test Camera\0";

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II\x2a\x00");
    tiff.extend_from_slice(&8_u32.to_le_bytes());

    // Header + entry count + two entries + next-IFD offset
    let value_area = 8 + 2 + 2 * 12 + 4;

    tiff.extend_from_slice(&2_u16.to_le_bytes());
    for (tag, value, offset) in [
        (0x010f_u16, make.as_slice(), value_area),
        (0x0110, model.as_slice(), value_area + make.len()),
    ] {
        tiff.extend_from_slice(&tag.to_le_bytes());
        // ASCII
        tiff.extend_from_slice(&2_u16.to_le_bytes());
        tiff.extend_from_slice(&(value.len() as u32).to_le_bytes());
        tiff.extend_from_slice(&(offset as u32).to_le_bytes());
    }
    tiff.extend_from_slice(&0_u32.to_le_bytes());
    tiff.extend_from_slice(make);
    tiff.extend_from_slice(model);

    let mut app1 = Vec::new();
    app1.extend_from_slice(b"\xff\xe1");
    app1.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);
    app1
}

/// `test_jpeg` with an Exif APP1 segment spliced in after SOI
fn exif_jpeg() -> Vec<u8> {
    let jpeg = test_jpeg();

    let mut data = jpeg[..2].to_vec();
    data.extend_from_slice(&exif_app1());
    data.extend_from_slice(&jpeg[2..]);
    data
}

fn load(data: Vec<u8>) -> Image {
    block_on(Loader::new_for_bytes(data).load()).unwrap()
}

#[test]
fn jpeg_info_and_frame() {
    let image = load(test_jpeg());

    assert_eq!(image.mime_type(), "image/jpeg");
    assert_eq!(image.format_name(), "JPEG");
    assert_eq!(image.info().width, 600);
    assert_eq!(image.info().height, 400);
    assert!(!image.is_animated());
    assert_eq!(image.memory_format(), MemoryFormat::R8g8b8);
    assert_eq!(
        image.active_sandbox_mechanism(),
        SandboxMechanism::InProcessRestricted
    );

    let frame = block_on(image.next_frame()).unwrap();
    assert_eq!(frame.width(), 600);
    assert_eq!(frame.height(), 400);
    assert_eq!(frame.stride(), 1800);
    assert_eq!(frame.memory_format(), MemoryFormat::R8g8b8);
    assert_eq!(frame.buf_slice().len(), 600 * 400 * 3);
    assert_eq!(frame.delay(), None);
}

#[test]
fn still_image_frames_are_identical() {
    let image = load(test_jpeg());

    let first = block_on(image.next_frame()).unwrap();
    let second = block_on(image.next_frame()).unwrap();

    assert_eq!(first.buf_slice(), second.buf_slice());
}

#[test]
fn sync_api_matches_async() {
    let image_async = load(test_jpeg());
    let frame_async = block_on(image_async.next_frame()).unwrap();

    let image_sync = Loader::new_for_bytes(test_jpeg()).load_sync().unwrap();
    let frame_sync = image_sync.next_frame_sync().unwrap();

    assert_eq!(image_sync.info().width, image_async.info().width);
    assert_eq!(frame_sync.buf_slice(), frame_async.buf_slice());
}

#[test]
fn grayscale_negotiation() {
    let mut loader = Loader::new_for_bytes(gray_png());
    loader.accepted_memory_formats(MemoryFormatSelection::G8);
    let image = block_on(loader.load()).unwrap();

    assert_eq!(image.memory_format(), MemoryFormat::G8);

    let frame = block_on(image.next_frame()).unwrap();
    assert_eq!(frame.memory_format(), MemoryFormat::G8);
    assert_eq!(frame.buf_slice().len(), 64 * 32);
}

#[test]
fn rgb_converted_to_gray_on_request() {
    let mut loader = Loader::new_for_bytes(test_jpeg());
    loader.accepted_memory_formats(MemoryFormatSelection::G8 | MemoryFormatSelection::G8A8);
    let image = block_on(loader.load()).unwrap();

    // G8 comes before G8a8 in the loader's preference for RGB input
    assert_eq!(image.memory_format(), MemoryFormat::G8);

    let frame = block_on(image.next_frame()).unwrap();
    assert_eq!(frame.buf_slice().len(), 600 * 400);
}

#[test]
fn no_acceptable_format() {
    let mut loader = Loader::new_for_bytes(test_jpeg());
    loader.accepted_memory_formats(MemoryFormatSelection::G16);
    let result = block_on(loader.load());

    assert!(matches!(result, Err(Error::NoAcceptableFormat)));
}

#[test]
fn unknown_format() {
    let result = Loader::new_for_bytes(b"clearly not an image".to_vec()).load_sync();

    match result {
        Err(err @ Error::UnknownImageFormat(_)) => {
            assert_eq!(
                err.unsupported_format().as_deref(),
                Some("application/octet-stream")
            );
        }
        other => panic!("Unexpected result: {other:?}"),
    }
}

#[test]
fn corrupt_data_after_magic() {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&[0xab; 64]);

    let result = Loader::new_for_bytes(data).load_sync();
    assert!(matches!(result, Err(Error::RemoteError(_))));
}

#[test]
fn scale_request() {
    let image = load(test_jpeg());

    let frame = block_on(image.specific_frame(FrameRequest::new().scale(32, 32))).unwrap();
    assert_eq!(frame.width(), 32);
    assert_eq!(frame.height(), 21);
}

#[test]
fn scale_never_upscales() {
    let image = load(test_jpeg());

    let frame = block_on(image.specific_frame(FrameRequest::new().scale(10_000, 10_000))).unwrap();
    assert_eq!(frame.width(), 600);
    assert_eq!(frame.height(), 400);
}

#[test]
fn clip_request() {
    let image = load(test_jpeg());

    let frame = block_on(image.specific_frame(FrameRequest::new().clip(10, 10, 100, 100))).unwrap();
    assert_eq!(frame.width(), 100);
    assert_eq!(frame.height(), 100);

    // Clip regions are clamped to the image
    let frame =
        block_on(image.specific_frame(FrameRequest::new().clip(590, 390, 100, 100))).unwrap();
    assert_eq!(frame.width(), 10);
    assert_eq!(frame.height(), 10);
}

#[test]
fn animation_advances_and_loops() {
    let image = load(animated_gif(&[[255, 0, 0], [0, 255, 0], [0, 0, 255]]));

    assert!(image.is_animated());
    assert_eq!(image.memory_format(), MemoryFormat::R8g8b8a8);

    let first = block_on(image.next_frame()).unwrap();
    let second = block_on(image.next_frame()).unwrap();
    let third = block_on(image.next_frame()).unwrap();
    let looped = block_on(image.next_frame()).unwrap();

    assert_eq!(first.delay(), Some(Duration::from_millis(100)));
    assert_eq!(first.buf_slice().len(), 20 * 10 * 4);

    assert_ne!(first.buf_slice(), second.buf_slice());
    assert_ne!(second.buf_slice(), third.buf_slice());
    assert_eq!(first.buf_slice(), looped.buf_slice());
}

#[test]
fn exif_metadata() {
    let image = load(exif_jpeg());

    assert_eq!(image.mime_type(), "image/jpeg");
    assert!(image.metadata_keys().iter().any(|key| key == "exif:Model"));

    let model = image.metadata_key_value("exif:Model").unwrap();
    assert!(model.contains("Test Camera"), "Unexpected value: {model}");
    let make = image.metadata_key_value("exif:Make").unwrap();
    assert!(make.contains("Opsin"), "Unexpected value: {make}");

    // The extra segment does not disturb decoding
    let frame = block_on(image.next_frame()).unwrap();
    assert_eq!(frame.width(), 600);
}

#[test]
fn absent_metadata_key() {
    let image = load(test_jpeg());

    assert_eq!(image.metadata_key_value("exif:Model"), None);
    assert!(image.metadata_keys().is_empty());
}

#[test]
fn cancellation_poisons_image() {
    let cancellable = Cancellable::new();
    cancellable.cancel();

    let mut loader = Loader::new_for_bytes(test_jpeg());
    loader.cancellable(cancellable);
    let result = block_on(loader.load());
    assert!(matches!(result, Err(Error::Canceled)));

    // Canceling after load poisons all further frame requests
    let image = load(test_jpeg());
    image.cancellable().cancel();

    let result = block_on(image.next_frame());
    assert!(matches!(result, Err(Error::Canceled)));
    let result = block_on(image.next_frame());
    assert!(matches!(result, Err(Error::Canceled)));
}

#[test]
fn forced_mime_type_mismatch() {
    let mut loader = Loader::new_for_bytes(test_jpeg());
    loader.force_mime_type("image/png");
    let result = block_on(loader.load());

    assert!(matches!(
        result,
        Err(Error::RemoteError(RemoteError::LoadingError(_)))
    ));
}

#[test]
fn supported_mime_types_listed() {
    let mime_types = supported_mime_types_sync();

    assert!(mime_types.iter().any(|m| m == "image/png"));
    assert!(mime_types.iter().any(|m| m == "image/jpeg"));

    let mut sorted = mime_types.clone();
    sorted.sort();
    assert_eq!(mime_types, sorted);
}

#[test]
fn loading_from_file() {
    let dir = std::env::temp_dir().join("opsin-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("gradient.jpg");
    std::fs::write(&path, test_jpeg()).unwrap();

    let image = Loader::new(&path).load_sync().unwrap();
    assert_eq!(image.mime_type(), "image/jpeg");
    assert_eq!(image.info().width, 600);

    let missing = Loader::new(dir.join("missing.jpg")).load_sync();
    assert!(matches!(missing, Err(Error::StdIoError { .. })));
}

#[test]
fn loading_from_stream() {
    let image = Loader::new_for_stream(Cursor::new(test_jpeg()))
        .load_sync()
        .unwrap();
    assert_eq!(image.info().height, 400);
}
