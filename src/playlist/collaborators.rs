//! Boundaries to the systems a playlist run depends on but does not implement.
//!
//! - [`PlaylistSource`] / [`PlaylistReader`] enumerate a playlist's items
//! - [`FormatResolver`] picks the playable format(s) for an item
//! - [`Remuxer`] merges a DASH audio/video pair into one container

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ResolveError;

/// How a format's streams are packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Audio and video in one file.
    Muxed,
    /// DASH video stream without audio.
    VideoOnly,
    /// DASH audio stream without video.
    AudioOnly,
}

/// A downloadable encoding of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// Direct media URL.
    #[serde(rename = "url")]
    pub download_url: String,
    /// Container extension without the dot, e.g. `mp4`.
    pub extension: String,
    /// Size in bytes, `0` when unknown.
    #[serde(default)]
    pub file_size: u64,
    /// Vertical resolution for video streams.
    #[serde(default)]
    pub quality: Option<u32>,
    /// Bitrate in kbit/s for audio streams.
    #[serde(default)]
    pub audio_bitrate: Option<u32>,
    /// Stream packaging.
    pub kind: StreamKind,
}

impl MediaFormat {
    /// Whether this stream needs a partner stream to be playable.
    #[must_use]
    pub fn is_dash(&self) -> bool {
        self.kind != StreamKind::Muxed
    }
}

/// The format(s) chosen for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    /// The video (or muxed) stream.
    pub video: MediaFormat,
    /// Paired audio stream when `video` is DASH.
    pub audio: Option<MediaFormat>,
}

impl ResolvedFormat {
    /// A single muxed file.
    #[must_use]
    pub fn single(format: MediaFormat) -> Self {
        Self {
            video: format,
            audio: None,
        }
    }

    /// A DASH pair that must be remuxed after download.
    #[must_use]
    pub fn dash(video: MediaFormat, audio: MediaFormat) -> Self {
        Self {
            video,
            audio: Some(audio),
        }
    }

    /// Whether the item arrives as separate audio and video files.
    #[must_use]
    pub fn is_dash(&self) -> bool {
        self.audio.is_some()
    }
}

/// One entry of a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Identifier or page URL understood by the resolver.
    #[serde(default)]
    pub id: String,
    /// Human-readable title, also used for the output file name.
    pub title: String,
    /// Play length.
    #[serde(default, with = "duration_secs")]
    pub duration: Duration,
    /// Known formats; may be empty when the resolver looks them up itself.
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

/// Playlist metadata available before items are enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistInfo {
    /// Playlist name.
    pub name: String,
}

/// Picks the format to download for an item.
#[async_trait]
pub trait FormatResolver: Send + Sync {
    /// Returns the preferred format for `item`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if nothing playable can be found.
    async fn preferred_format(
        &self,
        item: &PlaylistItem,
        prefer_dash: bool,
        preferred_quality: u32,
    ) -> Result<ResolvedFormat, ResolveError>;
}

/// Opens playlist readers. Each call starts enumeration from the beginning.
pub trait PlaylistSource: Send + Sync {
    /// Opens a reader for the playlist at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the playlist cannot be opened.
    fn open(&self, url: &str) -> Result<Box<dyn PlaylistReader>, ResolveError>;
}

/// Lazy enumeration of one playlist.
#[async_trait]
pub trait PlaylistReader: Send {
    /// Waits until the playlist metadata is known.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the metadata cannot be retrieved.
    async fn wait_for_playlist(&mut self) -> Result<PlaylistInfo, ResolveError>;

    /// Returns the next item, or `None` at the end.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the next item cannot be retrieved.
    async fn next(&mut self) -> Result<Option<PlaylistItem>, ResolveError>;

    /// Ends enumeration early.
    fn stop(&mut self);
}

/// Outcome of merging a DASH pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemuxResult {
    /// Whether the merged file was written.
    pub success: bool,
    /// Diagnostic lines explaining a failure.
    pub errors: Vec<String>,
}

impl RemuxResult {
    /// A successful merge.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    /// A failed merge with its diagnostics.
    #[must_use]
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// Merges separate audio and video streams into one container without re-encoding.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Writes `output` from `video` and `audio`.
    async fn combine_dash(&self, video: &Path, audio: &Path, output: &Path) -> RemuxResult;
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_deserializes_with_defaults() {
        let item: PlaylistItem = serde_json::from_str(
            r#"{"title": "Intro", "duration": 62, "formats": [
                {"url": "https://cdn.example.com/intro.mp4", "extension": "mp4", "kind": "muxed", "quality": 720}
            ]}"#,
        )
        .unwrap();

        assert_eq!(item.title, "Intro");
        assert_eq!(item.duration, Duration::from_secs(62));
        assert!(item.id.is_empty());
        assert_eq!(item.formats[0].file_size, 0);
        assert!(!item.formats[0].is_dash());
    }

    #[test]
    fn test_resolved_format_dash_flag() {
        let video = MediaFormat {
            download_url: "https://cdn.example.com/v".into(),
            extension: "mp4".into(),
            file_size: 10,
            quality: Some(1080),
            audio_bitrate: None,
            kind: StreamKind::VideoOnly,
        };
        let audio = MediaFormat {
            kind: StreamKind::AudioOnly,
            quality: None,
            audio_bitrate: Some(128),
            ..video.clone()
        };

        assert!(ResolvedFormat::dash(video.clone(), audio).is_dash());
        assert!(!ResolvedFormat::single(video).is_dash());
    }
}
