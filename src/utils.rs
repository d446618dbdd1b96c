//! Utility functions for file naming and path safety

use crate::error::{Error, Result};
use std::path::{Component, Path};

/// Name used when neither the response nor the URL yields one
const FALLBACK_FILE_NAME: &str = "download";

/// Characters that are unsafe in a file name on common filesystems
const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Extract a file name from a response's Content-Disposition header,
/// falling back to the last URL path segment.
///
/// The extension is kept. The result is passed through
/// [`sanitize_file_name`], and `"download"` is returned as a last resort.
///
/// # Examples
///
/// ```ignore
/// let response = reqwest::get("https://example.com/clip.mp4").await?;
/// let name = filename_from_response(&response, "https://example.com/clip.mp4");
/// // Returns "clip.mp4"
/// ```
pub fn filename_from_response(response: &reqwest::Response, url: &str) -> String {
    if let Some(content_disposition) = response.headers().get(reqwest::header::CONTENT_DISPOSITION)
        && let Ok(value) = content_disposition.to_str()
        && let Some(name) = filename_from_content_disposition(value)
    {
        return sanitize_file_name(&name);
    }

    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        let decoded = urlencoding::decode(last_segment)
            .map(|d| d.into_owned())
            .unwrap_or_else(|_| last_segment.to_string());
        return sanitize_file_name(&decoded);
    }

    FALLBACK_FILE_NAME.to_string()
}

/// Parse `filename=` or RFC 5987 `filename*=` out of a Content-Disposition value
fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // charset'lang'encoded-filename
            let encoded = encoded.rsplit('\'').next().unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            plain = Some(name.trim_matches('"').to_string());
        }
    }
    plain.filter(|name| !name.is_empty())
}

/// Make `name` safe to use as a single path component.
///
/// Separators, reserved and control characters become `_`; leading and
/// trailing dots and whitespace are trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if UNSAFE_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reject public file names that could escape the download directory.
///
/// A name is accepted only if it is exactly one normal path component.
/// Dots inside the name (`Wait... what.mp4`) are fine.
///
/// # Errors
///
/// Returns [`Error::InvalidFileName`] for empty names, names containing a
/// path separator or NUL, and the special names `.` and `..`.
pub fn ensure_plain_file_name(name: &str) -> Result<()> {
    let invalid = || Error::InvalidFileName(name.to_string());

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}
