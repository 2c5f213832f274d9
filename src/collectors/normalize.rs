//! Canonical display names for codecs and file types.

use super::{bump, Breakdown};
use serde::Deserialize;

pub const UNKNOWN: &str = "Unknown";

/// Map encoder/codec aliases onto one display name. Anything not in the
/// table passes through untouched, so already-canonical names are stable.
pub fn video_codec(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => UNKNOWN.to_string(),
        Some("x265") | Some("h265") => "HEVC".to_string(),
        Some("x264") | Some("h264") => "H.264".to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn audio_codec(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => UNKNOWN.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Lower-cased text after the last `.`; a name without a dot is taken whole.
pub fn file_extension(relative_path: &str) -> Option<String> {
    if relative_path.is_empty() {
        return None;
    }
    relative_path
        .rsplit('.')
        .next()
        .map(|ext| ext.to_lowercase())
}

/// File metadata attached to a movie or an episode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub relative_path: Option<String>,
    pub media_info: Option<MediaInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

/// Per-file-type and per-codec tallies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileProfile {
    pub filetypes: Breakdown,
    pub video_codecs: Breakdown,
    pub audio_codecs: Breakdown,
    pub files: usize,
}

impl FileProfile {
    pub fn record(&mut self, file: &MediaFile) {
        self.files += 1;
        if let Some(ext) = file.relative_path.as_deref().and_then(file_extension) {
            bump(&mut self.filetypes, ext, 1.0);
        }
        let info = file.media_info.as_ref();
        bump(
            &mut self.video_codecs,
            video_codec(info.and_then(|i| i.video_codec.as_deref())),
            1.0,
        );
        bump(
            &mut self.audio_codecs,
            audio_codec(info.and_then(|i| i.audio_codec.as_deref())),
            1.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_codec_aliases() {
        assert_eq!(video_codec(Some("x265")), "HEVC");
        assert_eq!(video_codec(Some("h265")), "HEVC");
        assert_eq!(video_codec(Some("x264")), "H.264");
        assert_eq!(video_codec(Some("h264")), "H.264");
        assert_eq!(video_codec(None), "Unknown");
    }

    #[test]
    fn test_video_codec_is_idempotent() {
        for raw in ["x265", "h264", "HEVC", "H.264", "AV1", "VC1", "mpeg4"] {
            let once = video_codec(Some(raw));
            assert_eq!(video_codec(Some(&once)), once);
        }
        assert_eq!(video_codec(Some("AV1")), "AV1");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("Movie (2020)/Movie.MKV").as_deref(), Some("mkv"));
        assert_eq!(file_extension("a.b.mp4").as_deref(), Some("mp4"));
        assert_eq!(file_extension("noext").as_deref(), Some("noext"));
        assert_eq!(file_extension(""), None);
    }

    #[test]
    fn test_profile_record_without_media_info() {
        let mut profile = FileProfile::default();
        profile.record(&MediaFile {
            relative_path: Some("Show.S01E01.avi".into()),
            media_info: None,
        });
        assert_eq!(profile.files, 1);
        assert_eq!(profile.filetypes["avi"], 1.0);
        assert_eq!(profile.video_codecs["Unknown"], 1.0);
        assert_eq!(profile.audio_codecs["Unknown"], 1.0);
    }
}
