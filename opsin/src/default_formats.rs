/// MIME types the builtin loader handles
///
/// Additional loaders can be registered via config files, see
/// [`LOADERS_DIR_ENV`](crate::LOADERS_DIR_ENV).
pub const DEFAULT_MIME_TYPES: &[&str] = opsin_image_rs::MIME_TYPES;
