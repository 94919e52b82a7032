//! Rule-based interpretation of raw probe output.
//!
//! A [`Classifier`] walks an ordered table of [`Rule`]s and returns the
//! verdict of the first one that matches. The table is assembled from:
//!
//! 1. active ignored-error patterns, each one a `healthy` rule,
//! 2. rules prepended through [`ClassifierBuilder::prepend`],
//! 3. the specific built-in rules (NAL noise, metadata warnings, ...),
//! 4. rules added through [`ClassifierBuilder::append`],
//! 5. the generic fallbacks (`significant errors`, `exit failure`, `clean`).
//!
//! Classification is a pure function of its input, so the verdict recorded
//! at scan time and the one recomputed later from stored output agree.

pub mod builtin;
mod reclassify;
pub mod rules;

use pixelwarden_model::{Verdict, VerdictKind};

pub use reclassify::{ReclassifyReport, Reclassifier, VerdictChange};
pub use rules::{
    ClassifierInput, DetailTemplate, Matcher, OutputAnalysis, Rule, ToolFilter,
};

/// Verdict plus the name of the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub rule: String,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Classifier {
    pub fn builtin() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClassifierBuilder {
        ClassifierBuilder::default()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Copy of this table with `patterns` placed in front as `healthy` rules.
    pub fn with_ignored_patterns<I, S>(&self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules: Vec<Rule> = patterns
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| ignored_rule(p.as_ref()))
            .collect();
        rules.extend(self.rules.iter().cloned());
        Self { rules }
    }

    pub fn classify(&self, input: &ClassifierInput<'_>) -> Classification {
        let analysis = OutputAnalysis::new(input.output);
        for rule in &self.rules {
            if let Some(verdict) = rule.evaluate(input, &analysis) {
                return Classification {
                    verdict,
                    rule: rule.name.clone(),
                };
            }
        }
        Classification {
            verdict: Verdict::Healthy,
            rule: "default".to_string(),
        }
    }
}

fn ignored_rule(pattern: &str) -> Rule {
    Rule::new(
        format!("ignored:{pattern}"),
        Matcher::contains(pattern),
        VerdictKind::Healthy,
    )
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierBuilder {
    ignored: Vec<String>,
    prepended: Vec<Rule>,
    appended: Vec<Rule>,
}

impl ClassifierBuilder {
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignored.push(pattern.into());
        self
    }

    /// Runs ahead of every built-in rule.
    pub fn prepend(mut self, rule: Rule) -> Self {
        self.prepended.push(rule);
        self
    }

    /// Runs after the specific built-ins but before the generic fallbacks.
    pub fn append(mut self, rule: Rule) -> Self {
        self.appended.push(rule);
        self
    }

    pub fn build(self) -> Classifier {
        let mut rules = Vec::with_capacity(
            self.ignored.len()
                + self.prepended.len()
                + self.appended.len()
                + builtin::SPECIFIC_RULES.len()
                + builtin::FALLBACK_RULES.len(),
        );
        rules.extend(
            self.ignored
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(|p| ignored_rule(p)),
        );
        rules.extend(self.prepended);
        rules.extend(builtin::SPECIFIC_RULES.iter().cloned());
        rules.extend(self.appended);
        rules.extend(builtin::FALLBACK_RULES.iter().cloned());
        Classifier { rules }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(tool: &'a str, exit_ok: bool, output: &'a str) -> ClassifierInput<'a> {
        ClassifierInput {
            tool,
            path: "/media/clip.mkv",
            exit_ok,
            output,
        }
    }

    #[test]
    fn ignored_patterns_win_over_fallbacks() {
        let out = "[matroska] Error: unknown EBML element 0x1f43b675";
        let plain = Classifier::builtin().classify(&input("ffmpeg", true, out));
        assert_eq!(plain.verdict.kind(), VerdictKind::Corrupted);

        let ignoring = Classifier::builtin().with_ignored_patterns(["unknown ebml element"]);
        let result = ignoring.classify(&input("ffmpeg", false, out));
        assert_eq!(result.verdict, Verdict::Healthy);
        assert_eq!(result.rule, "ignored:unknown ebml element");
    }

    #[test]
    fn custom_rules_respect_their_slot() {
        let classifier = Classifier::builder()
            .prepend(
                Rule::new("vendor-noise", Matcher::contains("vendor tag"), VerdictKind::Healthy)
                    .for_tool("ffmpeg"),
            )
            .append(
                Rule::new("truncated", Matcher::contains("moov atom"), VerdictKind::Corrupted)
                    .detail("{tool}: {line}"),
            )
            .build();

        let healthy = classifier.classify(&input("ffmpeg", true, "error: vendor tag mismatch"));
        assert_eq!(healthy.rule, "vendor-noise");

        let appended = classifier.classify(&input("ffmpeg", false, "moov atom not found"));
        assert_eq!(appended.rule, "truncated");
        assert_eq!(
            appended.verdict,
            Verdict::Corrupted { details: "FFmpeg: ".into() }
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = Classifier::builtin();
        let out = "Invalid NAL unit 3, skipping.";
        let first = classifier.classify(&input("ffmpeg", true, out));
        let second = classifier.classify(&input("ffmpeg", true, out));
        assert_eq!(first, second);
    }
}
