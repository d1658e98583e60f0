//! JSON playlist manifests.
//!
//! A manifest names a playlist and lists its items with the formats each one
//! is available in:
//!
//! ```json
//! {
//!   "name": "Road trip",
//!   "items": [
//!     {
//!       "title": "Intro",
//!       "duration": 62,
//!       "formats": [
//!         { "url": "https://cdn.example.com/intro-720.mp4", "extension": "mp4", "kind": "muxed", "quality": 720 },
//!         { "url": "https://cdn.example.com/intro-v1080.mp4", "extension": "mp4", "kind": "video_only", "quality": 1080 },
//!         { "url": "https://cdn.example.com/intro-a128.mp4", "extension": "mp4", "kind": "audio_only", "audio_bitrate": 128 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! [`ManifestSource`] enumerates the items and [`ManifestResolver`] picks a
//! format for each, so a playlist can be downloaded without any metadata
//! service.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::playlist::{
    FormatResolver, MediaFormat, PlaylistInfo, PlaylistItem, PlaylistReader, PlaylistSource,
    ResolveError, ResolvedFormat, StreamKind,
};

/// Parsed manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistManifest {
    /// Playlist name.
    pub name: String,
    /// Items in download order.
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

impl PlaylistManifest {
    /// Parses a manifest; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Manifest`] if `raw` is not a valid manifest.
    pub fn parse(path: &Path, raw: &str) -> Result<Self, ResolveError> {
        serde_json::from_str(raw).map_err(|e| ResolveError::manifest(path, e))
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] if the file does not exist and
    /// [`ResolveError::Manifest`] if it cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, ResolveError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResolveError::NotFound {
                    what: path.display().to_string(),
                }
            } else {
                ResolveError::manifest(path, e)
            }
        })?;
        Self::parse(path, &raw)
    }
}

/// Opens manifests from the local filesystem; the playlist URL is a file path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestSource;

impl PlaylistSource for ManifestSource {
    fn open(&self, url: &str) -> Result<Box<dyn PlaylistReader>, ResolveError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        if path.trim().is_empty() {
            return Err(ResolveError::NotFound {
                what: "empty manifest path".to_string(),
            });
        }
        Ok(Box::new(ManifestReader::new(PathBuf::from(path))))
    }
}

/// Reads one manifest lazily: the file is loaded on [`PlaylistReader::wait_for_playlist`].
#[derive(Debug)]
pub struct ManifestReader {
    path: PathBuf,
    pending: VecDeque<PlaylistItem>,
    loaded: bool,
    stopped: bool,
}

impl ManifestReader {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            pending: VecDeque::new(),
            loaded: false,
            stopped: false,
        }
    }
}

#[async_trait]
impl PlaylistReader for ManifestReader {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn wait_for_playlist(&mut self) -> Result<PlaylistInfo, ResolveError> {
        let manifest = PlaylistManifest::load(&self.path).await?;
        debug!(name = %manifest.name, items = manifest.items.len(), "manifest loaded");
        self.pending = manifest.items.into();
        self.loaded = true;
        Ok(PlaylistInfo {
            name: manifest.name,
        })
    }

    async fn next(&mut self) -> Result<Option<PlaylistItem>, ResolveError> {
        if !self.loaded {
            self.wait_for_playlist().await?;
        }
        if self.stopped {
            return Ok(None);
        }
        Ok(self.pending.pop_front())
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.pending.clear();
    }
}

/// Chooses among the formats listed for each item.
///
/// Quality selection takes the highest quality not above the preference and
/// otherwise the lowest one available. With DASH preferred, the chosen
/// video-only stream is paired with the highest-bitrate audio-only stream in
/// the same container; items without such a pair fall back to a muxed format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestResolver;

#[async_trait]
impl FormatResolver for ManifestResolver {
    async fn preferred_format(
        &self,
        item: &PlaylistItem,
        prefer_dash: bool,
        preferred_quality: u32,
    ) -> Result<ResolvedFormat, ResolveError> {
        select_format(item, prefer_dash, preferred_quality)
    }
}

fn select_format(
    item: &PlaylistItem,
    prefer_dash: bool,
    preferred_quality: u32,
) -> Result<ResolvedFormat, ResolveError> {
    if item.formats.is_empty() {
        return Err(ResolveError::unavailable(&item.title, "no formats listed"));
    }

    let pair = || dash_pair(&item.formats, preferred_quality);
    let muxed = || {
        pick_by_quality(of_kind(&item.formats, StreamKind::Muxed), preferred_quality)
            .map(|f| ResolvedFormat::single(f.clone()))
    };

    let chosen = if prefer_dash {
        pair().or_else(muxed)
    } else {
        muxed().or_else(pair)
    };
    chosen.ok_or_else(|| {
        ResolveError::unavailable(
            &item.title,
            "no muxed format and no video stream with a matching audio stream",
        )
    })
}

fn dash_pair(formats: &[MediaFormat], preferred_quality: u32) -> Option<ResolvedFormat> {
    let video = pick_by_quality(of_kind(formats, StreamKind::VideoOnly), preferred_quality)?;
    let audio = of_kind(formats, StreamKind::AudioOnly)
        .filter(|a| a.extension.eq_ignore_ascii_case(&video.extension))
        .max_by_key(|a| a.audio_bitrate.unwrap_or(0))?;
    Some(ResolvedFormat::dash(video.clone(), audio.clone()))
}

fn of_kind(formats: &[MediaFormat], kind: StreamKind) -> impl Iterator<Item = &MediaFormat> {
    formats.iter().filter(move |f| f.kind == kind)
}

fn pick_by_quality<'a>(
    candidates: impl Iterator<Item = &'a MediaFormat>,
    preferred_quality: u32,
) -> Option<&'a MediaFormat> {
    let candidates: Vec<&MediaFormat> = candidates.collect();
    let quality = |f: &&MediaFormat| f.quality.unwrap_or(0);

    candidates
        .iter()
        .copied()
        .filter(|f| quality(f) <= preferred_quality)
        .max_by_key(quality)
        .or_else(|| candidates.iter().copied().min_by_key(quality))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn format(kind: StreamKind, extension: &str, quality: Option<u32>, bitrate: Option<u32>) -> MediaFormat {
        MediaFormat {
            download_url: format!(
                "https://cdn.example.com/{kind:?}-{}-{}.{extension}",
                quality.unwrap_or(0),
                bitrate.unwrap_or(0)
            ),
            extension: extension.to_string(),
            file_size: 0,
            quality,
            audio_bitrate: bitrate,
            kind,
        }
    }

    fn item(formats: Vec<MediaFormat>) -> PlaylistItem {
        PlaylistItem {
            id: "abc".into(),
            title: "Clip".into(),
            duration: Duration::from_secs(30),
            formats,
        }
    }

    #[test]
    fn test_quality_picks_highest_not_above_preference() {
        let it = item(vec![
            format(StreamKind::Muxed, "mp4", Some(360), None),
            format(StreamKind::Muxed, "mp4", Some(720), None),
            format(StreamKind::Muxed, "mp4", Some(1080), None),
        ]);

        let chosen = select_format(&it, false, 720).unwrap();
        assert_eq!(chosen.video.quality, Some(720));
        assert!(!chosen.is_dash());
    }

    #[test]
    fn test_quality_falls_back_to_lowest_when_all_exceed_preference() {
        let it = item(vec![
            format(StreamKind::Muxed, "mp4", Some(1080), None),
            format(StreamKind::Muxed, "mp4", Some(720), None),
        ]);

        let chosen = select_format(&it, false, 240).unwrap();
        assert_eq!(chosen.video.quality, Some(720));
    }

    #[test]
    fn test_dash_pairs_video_with_best_matching_audio() {
        let it = item(vec![
            format(StreamKind::Muxed, "mp4", Some(720), None),
            format(StreamKind::VideoOnly, "mp4", Some(1080), None),
            format(StreamKind::AudioOnly, "webm", None, Some(160)),
            format(StreamKind::AudioOnly, "mp4", None, Some(128)),
            format(StreamKind::AudioOnly, "mp4", None, Some(48)),
        ]);

        let chosen = select_format(&it, true, 1080).unwrap();
        assert!(chosen.is_dash());
        assert_eq!(chosen.video.quality, Some(1080));
        let audio = chosen.audio.unwrap();
        assert_eq!(audio.extension, "mp4");
        assert_eq!(audio.audio_bitrate, Some(128));
    }

    #[test]
    fn test_dash_without_matching_audio_falls_back_to_muxed() {
        let it = item(vec![
            format(StreamKind::Muxed, "mp4", Some(480), None),
            format(StreamKind::VideoOnly, "mp4", Some(1080), None),
            format(StreamKind::AudioOnly, "webm", None, Some(160)),
        ]);

        let chosen = select_format(&it, true, 1080).unwrap();
        assert!(!chosen.is_dash());
        assert_eq!(chosen.video.quality, Some(480));
    }

    #[test]
    fn test_no_usable_format_is_unavailable() {
        let err = select_format(&item(Vec::new()), true, 720).unwrap_err();
        assert!(matches!(err, ResolveError::Unavailable { .. }));

        let audio_only = item(vec![format(StreamKind::AudioOnly, "mp4", None, Some(128))]);
        let err = select_format(&audio_only, false, 720).unwrap_err();
        assert!(err.to_string().contains("Clip"));
    }

    #[tokio::test]
    async fn test_reader_enumerates_manifest_items() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("playlist.json");
        std::fs::write(
            &path,
            r#"{"name": "Road trip", "items": [
                {"title": "One", "formats": []},
                {"title": "Two", "formats": []}
            ]}"#,
        )
        .unwrap();

        let mut reader = ManifestSource.open(path.to_str().unwrap()).unwrap();
        let info = reader.wait_for_playlist().await.unwrap();
        assert_eq!(info.name, "Road trip");
        assert_eq!(reader.next().await.unwrap().unwrap().title, "One");
        reader.stop();
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_and_malformed_manifests() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");
        let err = PlaylistManifest::load(&missing).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));

        let broken = temp_dir.path().join("broken.json");
        std::fs::write(&broken, "{\"items\": [").unwrap();
        let err = PlaylistManifest::load(&broken).await.unwrap_err();
        assert!(matches!(err, ResolveError::Manifest { .. }));
    }
}
