//! Content based MIME type detection
//!
//! The type is always sniffed from the first bytes of the source, never from
//! a file name.

pub type MimeType = String;

/// Magic byte table, checked in order
const MAGIC: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"qoif", "image/x-qoi"),
    (b"farbfeld", "image/x-ff"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/vnd.microsoft.icon"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
];

pub(crate) fn guess_mime_type(head: &[u8]) -> Option<MimeType> {
    for (magic, mime_type) in MAGIC {
        if head.starts_with(magic) {
            return Some((*mime_type).to_string());
        }
    }

    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return Some(String::from("image/webp"));
    }

    if let [b'P', kind @ b'1'..=b'7', b' ' | b'\t' | b'\n' | b'\r', ..] = head {
        let mime_type = match kind {
            b'1' | b'4' => "image/x-portable-bitmap",
            b'2' | b'5' => "image/x-portable-graymap",
            b'3' | b'6' => "image/x-portable-pixmap",
            _ => "image/x-portable-anymap",
        };
        return Some(mime_type.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_formats() {
        assert_eq!(
            guess_mime_type(b"\x89PNG\r\n\x1a\n\x00\x00").as_deref(),
            Some("image/png")
        );
        assert_eq!(
            guess_mime_type(b"\xff\xd8\xff\xe0rest").as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            guess_mime_type(b"GIF89a\x01\x00").as_deref(),
            Some("image/gif")
        );
        assert_eq!(
            guess_mime_type(b"RIFF\x00\x00\x00\x00WEBPVP8 ").as_deref(),
            Some("image/webp")
        );
        assert_eq!(
            guess_mime_type(b"P6\n2 2\n255\n").as_deref(),
            Some("image/x-portable-pixmap")
        );
    }

    #[test]
    fn rejects_unknown_content() {
        assert_eq!(guess_mime_type(b"not an image"), None);
        assert_eq!(guess_mime_type(b""), None);
        // Truncated magic
        assert_eq!(guess_mime_type(b"\x89PN"), None);
    }
}
