//! Codec alias tables and container compatibility sets.

use crate::media::{Container, TrackKind};

/// Alias families: every spelling in a family names the same codec.
const CODEC_FAMILIES: &[&[&str]] = &[
    &["hevc", "h265", "h.265", "x265", "hvc1", "hev1"],
    &["h264", "h.264", "avc", "avc1", "x264"],
    &["vp9", "vp09"],
    &["av1", "av01", "libaom-av1"],
    &["mpeg4", "mp4v"],
    &["truehd", "dolby truehd", "mlp"],
    &["dts-hd", "dts-hd ma", "dtshd", "dts_hd", "dts-hd.ma"],
    &["dts", "dca"],
    &["flac"],
    &["pcm", "pcm_s16le", "pcm_s24le", "pcm_s32le", "pcm_f32le"],
    &["aac", "aac_latm", "mp4a"],
    &["ac3", "ac-3", "a52"],
    &["eac3", "e-ac-3", "ec3"],
    &["opus"],
    &["mp3", "mp3float"],
    &["vorbis"],
    &["alac"],
    &["subrip", "srt"],
    &["ass", "ssa"],
    &["hdmv_pgs_subtitle", "pgssub", "pgs"],
    &["dvd_subtitle", "dvdsub", "vobsub"],
    &["mov_text", "tx3g"],
    &["webvtt"],
];

const MP4_VIDEO: &[&str] = &[
    "h264", "avc", "avc1", "hevc", "h265", "hvc1", "hev1", "av1", "av01", "mpeg4", "mp4v", "vp9",
];

const MP4_AUDIO: &[&str] = &[
    "aac", "mp4a", "ac3", "eac3", "mp3", "mp3float", "flac", "opus", "alac",
];

const MP4_SUBTITLE: &[&str] = &["mov_text", "tx3g", "webvtt"];

/// Text subtitle codecs that can be converted to `mov_text`.
pub const TEXT_SUBTITLE_CODECS: &[&str] = &["subrip", "srt", "ass", "ssa"];

/// Bitmap subtitle codecs; converting them would require OCR.
pub const BITMAP_SUBTITLE_CODECS: &[&str] = &[
    "hdmv_pgs_subtitle",
    "dvd_subtitle",
    "dvdsub",
    "pgssub",
    "pgs",
    "vobsub",
];

/// A default re-encode target for an audio codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeTarget {
    pub codec: &'static str,
    pub bitrate: &'static str,
}

/// Fallback target for audio codecs without a specific default.
pub const DEFAULT_AUDIO_TRANSCODE_TARGET: TranscodeTarget = TranscodeTarget {
    codec: "aac",
    bitrate: "192k",
};

/// Lowercase and trim a codec name.
pub fn normalize_codec(codec: &str) -> String {
    codec.trim().to_lowercase()
}

fn family(codec: &str) -> Option<&'static [&'static str]> {
    CODEC_FAMILIES.iter().copied().find(|f| f.contains(&codec))
}

/// Alias-aware codec comparison (`hevc` matches `h265`, `x265`, ...).
pub fn codec_matches(actual: &str, pattern: &str) -> bool {
    let actual = normalize_codec(actual);
    let pattern = normalize_codec(pattern);
    if actual == pattern {
        return true;
    }
    match (family(&actual), family(&pattern)) {
        (Some(a), Some(b)) => std::ptr::eq(a, b),
        _ => false,
    }
}

/// Whether a codec of the given track kind can be stored in `container`.
///
/// MKV accepts everything; MP4 uses fixed per-kind sets and never accepts
/// attachments. Other containers are assumed compatible.
pub fn is_codec_compatible(codec: &str, container: Container, kind: TrackKind) -> bool {
    match container {
        Container::Mp4 => {
            let codec = normalize_codec(codec);
            let set = match kind {
                TrackKind::Video => MP4_VIDEO,
                TrackKind::Audio => MP4_AUDIO,
                TrackKind::Subtitle => MP4_SUBTITLE,
                TrackKind::Attachment => return false,
            };
            set.contains(&codec.as_str())
        }
        Container::Mkv | Container::Mov | Container::Avi => true,
    }
}

/// Default MP4 transcode target for an incompatible audio codec.
pub fn audio_transcode_default(codec: &str) -> TranscodeTarget {
    let codec = normalize_codec(codec);
    let bitrate = match codec.as_str() {
        "truehd" | "dts" => "256k",
        "dts-hd ma" | "dts-hd" => "320k",
        "vorbis" | "pcm_s16le" | "pcm_s24le" | "pcm_s32le" => "192k",
        _ => return DEFAULT_AUDIO_TRANSCODE_TARGET,
    };
    TranscodeTarget {
        codec: "aac",
        bitrate,
    }
}

/// Whether a subtitle codec is text-based (convertible to `mov_text`).
pub fn is_text_subtitle(codec: &str) -> bool {
    TEXT_SUBTITLE_CODECS.contains(&normalize_codec(codec).as_str())
}

/// Whether a subtitle codec is bitmap-based.
pub fn is_bitmap_subtitle(codec: &str) -> bool {
    BITMAP_SUBTITLE_CODECS.contains(&normalize_codec(codec).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_matching() {
        assert!(codec_matches("HEVC", "h265"));
        assert!(codec_matches("x265", "hevc"));
        assert!(codec_matches("dca", "dts"));
        assert!(!codec_matches("dts", "dts-hd"));
        assert!(!codec_matches("h264", "hevc"));
        assert!(codec_matches("weird", "WEIRD"));
    }

    #[test]
    fn mp4_compatibility() {
        assert!(is_codec_compatible("hevc", Container::Mp4, TrackKind::Video));
        assert!(is_codec_compatible("AAC", Container::Mp4, TrackKind::Audio));
        assert!(!is_codec_compatible("truehd", Container::Mp4, TrackKind::Audio));
        assert!(!is_codec_compatible("subrip", Container::Mp4, TrackKind::Subtitle));
        assert!(!is_codec_compatible("ttf", Container::Mp4, TrackKind::Attachment));
    }

    #[test]
    fn mkv_accepts_everything() {
        assert!(is_codec_compatible("truehd", Container::Mkv, TrackKind::Audio));
        assert!(is_codec_compatible("ttf", Container::Mkv, TrackKind::Attachment));
    }

    #[test]
    fn transcode_defaults() {
        assert_eq!(audio_transcode_default("truehd").bitrate, "256k");
        assert_eq!(audio_transcode_default("DTS-HD MA").bitrate, "320k");
        assert_eq!(audio_transcode_default("pcm_s24le").bitrate, "192k");
        assert_eq!(audio_transcode_default("wmav2"), DEFAULT_AUDIO_TRANSCODE_TARGET);
    }

    #[test]
    fn subtitle_kinds() {
        assert!(is_text_subtitle("SRT"));
        assert!(is_bitmap_subtitle("hdmv_pgs_subtitle"));
        assert!(!is_bitmap_subtitle("ass"));
    }
}
