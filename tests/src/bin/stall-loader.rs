//! Loader that never answers a frame request
//!
//! Only useful to test the host's watchdog timeout.

use opsin_utils::*;

struct StallDecoder;

impl LoaderImplementation for StallDecoder {
    fn init(&mut self, _data: Vec<u8>, _mime_type: String) -> Result<ImageInfo, LoaderError> {
        let mut info = ImageInfo::new(2, 2, String::from("Stall"));
        info.preferred_formats = vec![MemoryFormat::R8g8b8];
        Ok(info)
    }

    fn frame(&mut self, _frame_request: FrameRequest) -> Result<Frame, LoaderError> {
        std::thread::sleep(std::time::Duration::from_secs(60));
        Err(LoaderError::InternalLoaderError(String::from(
            "Never reached",
        )))
    }
}

init_main!(StallDecoder);
