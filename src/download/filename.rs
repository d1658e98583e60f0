//! Filename sanitization and path derivation for playlist items.
//!
//! Item titles come from remote metadata and may contain characters that are
//! invalid on common filesystems, so they are cleaned before becoming paths.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Splits a filename into everything before the last dot and the extension.
#[allow(clippy::expect_used)]
static EXTENSION_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)(\..*)$").expect("extension regex is valid") // Static pattern, safe to panic
});

/// Fallback used when a title sanitizes to nothing.
const EMPTY_TITLE_FALLBACK: &str = "untitled";

/// Longest title kept in a filename, in characters.
const MAX_TITLE_CHARS: usize = 180;

/// Turns an item title into a filesystem-safe file stem.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_TITLE_CHARS)
        .collect();
    let trimmed = sanitized.trim().trim_end_matches('.');

    if trimmed.is_empty() || !is_safe_filename_segment(trimmed) {
        return EMPTY_TITLE_FALLBACK.to_string();
    }
    trimmed.to_string()
}

/// Final output path for an item: `<output_dir>/<sanitized title>.<extension>`.
#[must_use]
pub fn item_output_path(output_dir: &Path, title: &str, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    let stem = sanitize_title(title);
    if extension.is_empty() {
        output_dir.join(stem)
    } else {
        output_dir.join(format!("{stem}.{extension}"))
    }
}

/// Intermediate paths for a DASH pair, as `(audio, video)`.
///
/// `out/clip.mp4` becomes `out/clip_audio.mp4` and `out/clip_video.mp4`. Only
/// the file name is rewritten, so dots in directory names are left alone.
#[must_use]
pub fn dash_pair_paths(final_file: &Path) -> (PathBuf, PathBuf) {
    let file_name = final_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (stem, extension) = match EXTENSION_SPLIT.captures(&file_name) {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).map_or("", |m| m.as_str()).to_string(),
        ),
        None => (file_name.clone(), String::new()),
    };

    let audio = final_file.with_file_name(format!("{stem}_audio{extension}"));
    let video = final_file.with_file_name(format!("{stem}_video{extension}"));
    (audio, video)
}

fn is_safe_filename_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}
