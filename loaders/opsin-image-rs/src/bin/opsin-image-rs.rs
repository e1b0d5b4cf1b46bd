use opsin_image_rs::ImgDecoder;
use opsin_utils::init_main;

init_main!(ImgDecoder::default());
