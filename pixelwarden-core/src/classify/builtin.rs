//! The stock rule table. Order matters: specific benign patterns sit ahead of
//! the generic error fallbacks that would otherwise mark the same output
//! corrupted.

use once_cell::sync::Lazy;
use pixelwarden_model::VerdictKind;
use regex::Regex;

use super::rules::{Matcher, REFERENCE_FRAMES, Rule};

pub const NAL_AND_REFERENCE_WARNING: &str = "NAL unit errors detected and H.264 reference frame count exceeds profile limit (video may have minor playback issues)";
pub const NAL_WARNING: &str = "NAL unit errors detected (video may have minor playback issues)";
pub const REFERENCE_FRAME_WARNING: &str =
    "H.264 reference frame count exceeds profile limit (video may have minor playback issues)";
pub const UTF8_METADATA_WARNING: &str =
    "ImageMagick metadata contains non-UTF8 characters (not actual corruption)";
pub const GIF_HEADER_WARNING: &str =
    "GIF header warning: Non-standard header detected (file may still be playable)";
pub const GIF_FORMAT_WARNING: &str =
    "GIF format warning: PIL cannot identify format (file may still be playable)";
pub const WEBP_EXIF_WARNING: &str =
    "WebP EXIF warning: Invalid metadata detected (image displays correctly)";
pub const HEIC_COMPAT_WARNING: &str =
    "HEIC compatibility warning: FFmpeg/PIL may not fully support this HEIC file (image is valid)";
pub const HEVC_MAIN10_WARNING: &str =
    "HEVC Main 10 profile (10-bit) - requires hardware/software support for proper playback";
pub const TIMESTAMP_WARNING: &str = "Non-monotonous timestamps detected";

static UTF8_DECODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)utf-8.*codec.*decode|UnicodeDecodeError")
        .expect("utf-8 decode regex should compile")
});

static HEVC_MAIN10: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bMain 10\b").expect("hevc profile regex should compile"));

/// Rules specific enough to run ahead of caller-supplied additions.
pub(crate) static SPECIFIC_RULES: Lazy<Vec<Rule>> = Lazy::new(specific_rules);

/// Generic fallbacks that close the table.
pub(crate) static FALLBACK_RULES: Lazy<Vec<Rule>> = Lazy::new(fallback_rules);

fn nal() -> Matcher {
    Matcher::contains("invalid nal unit")
}

fn reference_frames() -> Matcher {
    Matcher::Regex(REFERENCE_FRAMES.clone())
}

fn specific_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "ffmpeg-nal-and-reference-frames",
            Matcher::only_benign(Matcher::All(vec![nal(), reference_frames()]), &[]),
            VerdictKind::Warning,
        )
        .for_tool("ffmpeg")
        .detail(NAL_AND_REFERENCE_WARNING),
        Rule::new(
            "ffmpeg-nal-only",
            Matcher::only_benign(nal(), &[]),
            VerdictKind::Warning,
        )
        .for_tool("ffmpeg")
        .detail(NAL_WARNING),
        Rule::new(
            "ffmpeg-reference-frames-only",
            Matcher::only_benign(reference_frames(), &[]),
            VerdictKind::Warning,
        )
        .for_tool("ffmpeg")
        .detail(REFERENCE_FRAME_WARNING),
        Rule::new(
            "imagemagick-profile-warning",
            Matcher::only_benign(
                Matcher::All(vec![
                    Matcher::contains("CorruptImageProfile"),
                    Matcher::contains("@ warning/profile.c"),
                ]),
                &["@ warning/profile.c"],
            ),
            VerdictKind::Healthy,
        )
        .for_tool("imagemagick"),
        Rule::new(
            "imagemagick-utf8-metadata",
            Matcher::Regex(UTF8_DECODE.clone()),
            VerdictKind::Warning,
        )
        .for_tool("imagemagick")
        .detail(UTF8_METADATA_WARNING),
        Rule::new(
            "gif-improper-header",
            Matcher::All(vec![
                Matcher::extension(&["gif"]),
                Matcher::contains("improper image header"),
                Matcher::contains("ReadGIFImage"),
            ]),
            VerdictKind::Warning,
        )
        .detail(GIF_HEADER_WARNING),
        Rule::new(
            "gif-unidentified",
            Matcher::All(vec![
                Matcher::extension(&["gif"]),
                Matcher::contains("cannot identify image file"),
            ]),
            VerdictKind::Warning,
        )
        .detail(GIF_FORMAT_WARNING),
        Rule::new(
            "no-tile-data-only",
            Matcher::only_benign(
                Matcher::contains("Image has no tile data"),
                &["image has no tile data"],
            ),
            VerdictKind::Healthy,
        ),
        Rule::new(
            "webp-exif-header",
            Matcher::All(vec![
                Matcher::extension(&["webp"]),
                Matcher::contains("invalid tiff header"),
            ]),
            VerdictKind::Warning,
        )
        .detail(WEBP_EXIF_WARNING),
        Rule::new(
            "heic-compatibility",
            Matcher::All(vec![
                Matcher::extension(&["heic", "heif"]),
                Matcher::Any(vec![
                    Matcher::contains("moov atom not found"),
                    Matcher::contains("invalid data found"),
                    Matcher::contains("could not find codec parameters"),
                    Matcher::contains("no decoder found"),
                    Matcher::contains("unrecognized file format"),
                ]),
            ]),
            VerdictKind::Warning,
        )
        .detail(HEIC_COMPAT_WARNING),
        Rule::new(
            "hevc-main10",
            Matcher::All(vec![
                Matcher::Regex(HEVC_MAIN10.clone()),
                Matcher::not(Matcher::SignificantErrors),
                Matcher::not(Matcher::ExitFailed),
            ]),
            VerdictKind::Warning,
        )
        .detail(HEVC_MAIN10_WARNING),
        Rule::new(
            "non-monotonous-timestamps",
            Matcher::only_benign(
                Matcher::contains("non-monotonous dts"),
                &["non-monotonous"],
            ),
            VerdictKind::Warning,
        )
        .detail(TIMESTAMP_WARNING),
    ]
}

fn fallback_rules() -> Vec<Rule> {
    vec![
        Rule::new("significant-errors", Matcher::SignificantErrors, VerdictKind::Corrupted)
            .detail("{tool} errors: {errors}"),
        Rule::new("exit-failure", Matcher::ExitFailed, VerdictKind::Corrupted)
            .detail("{tool} validation failed"),
        Rule::new("clean", Matcher::All(Vec::new()), VerdictKind::Healthy),
    ]
}
