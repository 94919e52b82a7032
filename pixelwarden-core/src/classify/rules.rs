use std::path::Path;

use once_cell::sync::Lazy;
use pixelwarden_model::{Verdict, VerdictKind};
use regex::Regex;

pub(crate) static REFERENCE_FRAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)number of reference frames.*exceeds max")
        .expect("reference frame regex should compile")
});

const NAL_MARKER: &str = "invalid nal unit";
const NAL_SUMMARY: &str = "Invalid NAL unit errors detected";

/// Everything the classifier may look at for one file.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub tool: &'a str,
    pub path: &'a str,
    pub exit_ok: bool,
    pub output: &'a str,
}

/// Line-level facts derived from the raw output once per classification.
#[derive(Debug, Clone, Default)]
pub struct OutputAnalysis {
    lowered: String,
    significant: Vec<String>,
    has_nal_errors: bool,
    has_reference_frame_noise: bool,
}

impl OutputAnalysis {
    pub fn new(output: &str) -> Self {
        let mut analysis = OutputAnalysis {
            lowered: output.to_lowercase(),
            ..Default::default()
        };

        for line in output.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lower = trimmed.to_lowercase();
            if lower.contains(NAL_MARKER) {
                analysis.has_nal_errors = true;
            } else if REFERENCE_FRAMES.is_match(trimmed) {
                analysis.has_reference_frame_noise = true;
            } else if is_significant_line(&lower) {
                analysis.significant.push(trimmed.to_string());
            }
        }
        analysis
    }

    pub fn has_nal_errors(&self) -> bool {
        self.has_nal_errors
    }

    pub fn has_reference_frame_noise(&self) -> bool {
        self.has_reference_frame_noise
    }

    /// Error lines that are not NAL or reference-frame noise.
    pub fn significant_lines(&self) -> &[String] {
        &self.significant
    }

    /// Significant lines, plus a NAL summary once real errors or a failed
    /// exit make the NAL noise relevant.
    pub fn error_summary(&self, exit_ok: bool) -> Vec<String> {
        let mut errors = self.significant.clone();
        if self.has_nal_errors && (!errors.is_empty() || !exit_ok) {
            errors.push(NAL_SUMMARY.to_string());
        }
        errors
    }
}

/// Lowercased line counts as a real error indicator.
pub fn is_significant_line(lower: &str) -> bool {
    (lower.contains("error") && !lower.contains("duration"))
        || lower.contains("corrupt")
        || lower.contains("broken")
        || lower.contains("no frame")
}

/// Human-facing label for a probe name in detail messages.
pub fn tool_label(tool: &str) -> String {
    match tool.to_ascii_lowercase().as_str() {
        "ffmpeg" => "FFmpeg".to_string(),
        "ffprobe" => "FFprobe".to_string(),
        "imagemagick" | "magick" => "ImageMagick".to_string(),
        "pil" | "pillow" => "PIL".to_string(),
        _ => tool.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub enum ToolFilter {
    #[default]
    Any,
    /// Matches any of the listed tool names, case-insensitively.
    Named(Vec<String>),
}

impl ToolFilter {
    pub fn named(tool: &str) -> Self {
        ToolFilter::Named(vec![tool.to_string()])
    }

    pub fn accepts(&self, tool: &str) -> bool {
        match self {
            ToolFilter::Any => true,
            ToolFilter::Named(names) => names.iter().any(|name| name.eq_ignore_ascii_case(tool)),
        }
    }
}

/// Predicate over a classifier input.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Case-insensitive substring.
    Contains(String),
    Regex(Regex),
    /// File extension, case-insensitive, without the dot.
    PathExtension(Vec<String>),
    ExitFailed,
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
    Not(Box<Matcher>),
    /// `trigger` holds, the tool exited cleanly, and every significant line
    /// contains one of the `benign` substrings.
    OnlyBenign {
        trigger: Box<Matcher>,
        benign: Vec<String>,
    },
    /// At least one real error line, or NAL noise on a failed exit.
    SignificantErrors,
}

impl Matcher {
    pub fn contains(needle: &str) -> Self {
        Matcher::Contains(needle.to_lowercase())
    }

    pub fn extension(exts: &[&str]) -> Self {
        Matcher::PathExtension(exts.iter().map(|e| e.to_ascii_lowercase()).collect())
    }

    pub fn only_benign(trigger: Matcher, benign: &[&str]) -> Self {
        Matcher::OnlyBenign {
            trigger: Box::new(trigger),
            benign: benign.iter().map(|b| b.to_lowercase()).collect(),
        }
    }

    pub fn not(inner: Matcher) -> Self {
        Matcher::Not(Box::new(inner))
    }

    pub fn matches(&self, input: &ClassifierInput<'_>, analysis: &OutputAnalysis) -> bool {
        match self {
            Matcher::Contains(needle) => analysis.lowered.contains(&needle.to_lowercase()),
            Matcher::Regex(re) => re.is_match(input.output),
            Matcher::PathExtension(exts) => Path::new(input.path)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext))),
            Matcher::ExitFailed => !input.exit_ok,
            Matcher::All(all) => all.iter().all(|m| m.matches(input, analysis)),
            Matcher::Any(any) => any.iter().any(|m| m.matches(input, analysis)),
            Matcher::Not(inner) => !inner.matches(input, analysis),
            Matcher::OnlyBenign { trigger, benign } => {
                input.exit_ok
                    && trigger.matches(input, analysis)
                    && analysis.significant.iter().all(|line| {
                        let lower = line.to_lowercase();
                        benign.iter().any(|b| lower.contains(b.as_str()))
                    })
            }
            Matcher::SignificantErrors => !analysis.error_summary(input.exit_ok).is_empty(),
        }
    }
}

/// Detail text with `{tool}`, `{line}` and `{errors}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailTemplate(String);

impl DetailTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn render(&self, input: &ClassifierInput<'_>, analysis: &OutputAnalysis) -> String {
        if !self.0.contains('{') {
            return self.0.clone();
        }
        let errors = analysis.error_summary(input.exit_ok);
        let first = errors.first().map(String::as_str).unwrap_or_default();
        let joined = errors.iter().take(3).cloned().collect::<Vec<_>>().join("; ");

        self.0
            .replace("{tool}", &tool_label(input.tool))
            .replace("{line}", first)
            .replace("{errors}", &joined)
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub tool: ToolFilter,
    pub matcher: Matcher,
    pub verdict: VerdictKind,
    pub detail: DetailTemplate,
}

impl Rule {
    pub fn new(name: impl Into<String>, matcher: Matcher, verdict: VerdictKind) -> Self {
        Self {
            name: name.into(),
            tool: ToolFilter::Any,
            matcher,
            verdict,
            detail: DetailTemplate::none(),
        }
    }

    pub fn for_tool(mut self, tool: &str) -> Self {
        self.tool = ToolFilter::named(tool);
        self
    }

    pub fn detail(mut self, template: impl Into<String>) -> Self {
        self.detail = DetailTemplate::new(template);
        self
    }

    pub fn evaluate(
        &self,
        input: &ClassifierInput<'_>,
        analysis: &OutputAnalysis,
    ) -> Option<Verdict> {
        if !self.tool.accepts(input.tool) || !self.matcher.matches(input, analysis) {
            return None;
        }
        let details = self.detail.render(input, analysis);
        Some(match self.verdict {
            VerdictKind::Healthy => Verdict::Healthy,
            VerdictKind::Warning => Verdict::Warning { details },
            VerdictKind::Corrupted => Verdict::Corrupted { details },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        tool: &'a str,
        path: &'a str,
        exit_ok: bool,
        output: &'a str,
    ) -> ClassifierInput<'a> {
        ClassifierInput {
            tool,
            path,
            exit_ok,
            output,
        }
    }

    #[test]
    fn significant_lines_skip_duration_and_nal_noise() {
        let output = "[h264 @ 0x1] Invalid NAL unit size\n\
                      Error reading duration header\n\
                      [h264 @ 0x1] error while decoding MB 4 2\n\
                      [mp4] broken link";
        let analysis = OutputAnalysis::new(output);
        assert!(analysis.has_nal_errors());
        assert_eq!(
            analysis.significant_lines(),
            ["[h264 @ 0x1] error while decoding MB 4 2", "[mp4] broken link"]
        );
    }

    #[test]
    fn nal_summary_only_joins_real_errors() {
        let nal_only = OutputAnalysis::new("Invalid NAL unit 8, skipping.");
        assert!(nal_only.error_summary(true).is_empty());
        assert_eq!(nal_only.error_summary(false), [NAL_SUMMARY]);
    }

    #[test]
    fn only_benign_requires_clean_exit() {
        let matcher = Matcher::only_benign(
            Matcher::contains("CorruptImageProfile"),
            &["@ warning/profile.c"],
        );
        let out = "identify: CorruptImageProfile `xmp' @ warning/profile.c/SetImageProfileInternal/1705.";
        let analysis = OutputAnalysis::new(out);
        assert!(matcher.matches(&input("imagemagick", "/a.jpg", true, out), &analysis));
        assert!(!matcher.matches(&input("imagemagick", "/a.jpg", false, out), &analysis));

        let noisy = format!("{out}\nidentify: corrupt JPEG data: premature end");
        let analysis = OutputAnalysis::new(&noisy);
        assert!(!matcher.matches(&input("imagemagick", "/a.jpg", true, &noisy), &analysis));
    }

    #[test]
    fn templates_render_tool_and_errors() {
        let out = "a error one\nb error two\nc error three\nd error four";
        let analysis = OutputAnalysis::new(out);
        let template = DetailTemplate::new("{tool} errors: {errors}");
        let rendered = template.render(&input("ffmpeg", "/v.mkv", true, out), &analysis);
        assert_eq!(rendered, "FFmpeg errors: a error one; b error two; c error three");

        let first = DetailTemplate::new("{line}");
        assert_eq!(first.render(&input("x", "/v", true, out), &analysis), "a error one");
    }

    #[test]
    fn extension_and_tool_filters_ignore_case() {
        let analysis = OutputAnalysis::default();
        let ext = Matcher::extension(&["gif"]);
        assert!(ext.matches(&input("pil", "/x/Loop.GIF", true, ""), &analysis));
        assert!(!ext.matches(&input("pil", "/x/loop.gifv", true, ""), &analysis));
        assert!(ToolFilter::named("ffmpeg").accepts("FFmpeg"));
    }
}
