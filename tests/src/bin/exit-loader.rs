//! Loader that dies during the first frame request
//!
//! Only useful to test how the host reacts to a loader exiting without a
//! reply.

use opsin_utils::*;

struct ExitDecoder;

impl LoaderImplementation for ExitDecoder {
    fn init(&mut self, _data: Vec<u8>, _mime_type: String) -> Result<ImageInfo, LoaderError> {
        let mut info = ImageInfo::new(2, 2, String::from("Exit"));
        info.preferred_formats = vec![MemoryFormat::R8g8b8];
        Ok(info)
    }

    fn frame(&mut self, _frame_request: FrameRequest) -> Result<Frame, LoaderError> {
        std::process::exit(1);
    }
}

init_main!(ExitDecoder);
