use chrono::{DateTime, Utc};

use crate::record::DEFAULT_CONTENT_TYPE;

/// Maximum number of characters kept from the client's filename stem.
pub const MAX_STEM_CHARS: usize = 100;

/// Maximum number of characters kept from the client's extension (dot included).
const MAX_EXTENSION_CHARS: usize = 16;

/// Build the blob path for an upload.
///
/// The layout is `{prefix}/{YYYYmmdd_HHMMSS_ffffff}_{stem}{ext}`. `attempt`
/// is zero for the first try; later attempts append `_{attempt}` to the stem
/// so a clash on the exact microsecond still yields a fresh path.
pub fn storage_path_for(prefix: &str, filename: &str, now: DateTime<Utc>, attempt: u32) -> String {
    let (stem, ext) = split_filename(filename);
    let stamp = now.format("%Y%m%d_%H%M%S_%6f");
    let prefix = prefix.trim_matches('/');

    let name = if attempt == 0 {
        format!("{stamp}_{stem}{ext}")
    } else {
        format!("{stamp}_{stem}_{attempt}{ext}")
    };

    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Split a client filename into a sanitized stem and extension.
///
/// Only the final path component is considered. A leading dot does not start
/// an extension (`.env` has stem `.env` and no extension).
fn split_filename(filename: &str) -> (String, String) {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let (stem, ext) = match base.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < base.len() => base.split_at(idx),
        _ => (base, ""),
    };

    let mut stem: String = stem.chars().map(sanitize_char).take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        stem.push_str("file");
    }

    let ext: String = if ext.chars().count() <= MAX_EXTENSION_CHARS {
        ext.chars().map(sanitize_char).collect()
    } else {
        String::new()
    };

    (stem, ext)
}

fn sanitize_char(c: char) -> char {
    if c.is_control() || matches!(c, '/' | '\\' | ':' | '\0') {
        '_'
    } else {
        c
    }
}

/// Resolve the content type served for a record.
///
/// A concrete stored type wins. When the uploader sent nothing useful the type
/// is guessed from the original filename's extension.
pub fn effective_content_type<'a>(stored: &'a str, filename: &str) -> &'a str {
    let stored_trimmed = stored.trim();
    if !stored_trimmed.is_empty() && stored_trimmed != DEFAULT_CONTENT_TYPE {
        return stored_trimmed;
    }
    guess_content_type(filename)
}

/// Guess a MIME type from a filename's extension.
pub fn guess_content_type(filename: &str) -> &'static str {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "md" => "text/markdown",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/vnd.microsoft.icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + chrono::Duration::microseconds(42)
    }

    #[test]
    fn path_keeps_stem_and_extension() {
        assert_eq!(
            storage_path_for("uploads", "report.final.pdf", now(), 0),
            "uploads/20240309_140507_000042_report.final.pdf"
        );
    }

    #[test]
    fn collision_suffix_goes_before_extension() {
        assert_eq!(
            storage_path_for("uploads/", "a.txt", now(), 2),
            "uploads/20240309_140507_000042_a_2.txt"
        );
    }

    #[test]
    fn directory_components_are_dropped() {
        let path = storage_path_for("uploads", "../../etc/passwd", now(), 0);
        assert_eq!(path, "uploads/20240309_140507_000042_passwd");

        let path = storage_path_for("uploads", r"C:\Users\me\photo.JPG", now(), 0);
        assert_eq!(path, "uploads/20240309_140507_000042_photo.JPG");
    }

    #[test]
    fn dotfiles_and_empty_names() {
        assert_eq!(
            storage_path_for("uploads", ".env", now(), 0),
            "uploads/20240309_140507_000042_.env"
        );
        assert_eq!(
            storage_path_for("uploads", "", now(), 0),
            "uploads/20240309_140507_000042_file"
        );
    }

    #[test]
    fn long_stems_are_truncated() {
        let name = format!("{}.bin", "x".repeat(300));
        let path = storage_path_for("uploads", &name, now(), 0);
        let file = path.rsplit('/').next().unwrap();
        assert_eq!(file.len(), "20240309_140507_000042_".len() + MAX_STEM_CHARS + ".bin".len());
        assert!(file.ends_with(".bin"));
    }

    #[test]
    fn control_characters_are_replaced() {
        let path = storage_path_for("uploads", "a\nb\tc.txt", now(), 0);
        assert!(path.ends_with("_a_b_c.txt"));
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(guess_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("notes"), DEFAULT_CONTENT_TYPE);
        assert_eq!(guess_content_type("archive.unknownext"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn stored_content_type_wins_unless_generic() {
        assert_eq!(effective_content_type("text/csv", "x.pdf"), "text/csv");
        assert_eq!(effective_content_type(DEFAULT_CONTENT_TYPE, "x.pdf"), "application/pdf");
        assert_eq!(effective_content_type("", "x.png"), "image/png");
    }
}
