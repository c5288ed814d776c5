//! Extension to mime type table.

/// Mime type for files the table does not know.
pub const FALLBACK_MIME: &str = "application/octet-stream";

const MIME_TABLE: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("avif", "image/avif"),
    ("ico", "image/x-icon"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("pdf", "application/pdf"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
];

/// Infer a mime type from the extension of `reference`.
pub fn mime_for(reference: &str) -> &'static str {
    let name = reference.rsplit(['/', '\\']).next().unwrap_or(reference);
    let Some((_, extension)) = name.rsplit_once('.') else {
        return FALLBACK_MIME;
    };
    let extension = extension.to_ascii_lowercase();
    MIME_TABLE
        .iter()
        .find(|(known, _)| *known == extension)
        .map_or(FALLBACK_MIME, |&(_, mime)| mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_for("portraits/ember.PNG"), "image/png");
        assert_eq!(mime_for("map.jpeg"), "image/jpeg");
        assert_eq!(mime_for("theme.mp3"), "audio/mpeg");
    }

    #[test]
    fn test_unknown_extensions() {
        assert_eq!(mime_for("blob.xyz"), FALLBACK_MIME);
        assert_eq!(mime_for("no_extension"), FALLBACK_MIME);
        assert_eq!(mime_for("dir.d/file"), FALLBACK_MIME);
    }
}
