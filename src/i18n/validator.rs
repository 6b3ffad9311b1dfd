//! Translation quality validation module.
//!
//! Checks that translated strings keep the format placeholders (`%@`, `%d`,
//! `%1$@`, `%lld`, ...) and URLs of the source text. The app crashes or prints
//! garbage at runtime when a placeholder is lost or its type changes.

use crate::job::Text;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Validation report containing errors and warnings about a translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Critical errors that indicate translation issues
    pub errors: Vec<String>,

    /// Non-critical warnings about potential issues
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if the report is clean (no errors or warnings)
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

/// Validator for translation quality.
pub struct TranslationValidator;

// Regex patterns for extraction (cached for performance)
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
static URL_REGEX: OnceLock<Regex> = OnceLock::new();

impl TranslationValidator {
    /// Compare a source value with its translation.
    ///
    /// Scalars must keep the exact multiset of placeholders. Plural forms are
    /// compared by the set of placeholders used across all forms, since some
    /// languages drop the number in forms like `one`.
    pub fn validate_text(source: &Text, translated: &Text) -> ValidationReport {
        match (source, translated) {
            (Text::Scalar(source), Text::Scalar(translated)) => Self::validate(source, translated),
            _ => {
                let mut report = ValidationReport::new();
                let source_set: BTreeSet<String> = source
                    .strings()
                    .into_iter()
                    .flat_map(Self::extract_placeholders)
                    .collect();
                let translated_set: BTreeSet<String> = translated
                    .strings()
                    .into_iter()
                    .flat_map(Self::extract_placeholders)
                    .collect();
                if source_set != translated_set {
                    report.errors.push(format!(
                        "Placeholder mismatch: original has {:?}, translation has {:?}",
                        source_set, translated_set
                    ));
                }
                report
            }
        }
    }

    /// Validate that a translation preserves placeholders and URLs.
    pub fn validate(original: &str, translated: &str) -> ValidationReport {
        let mut report = ValidationReport::new();

        let mut orig_placeholders = Self::extract_placeholders(original);
        let mut trans_placeholders = Self::extract_placeholders(translated);
        orig_placeholders.sort();
        trans_placeholders.sort();
        if orig_placeholders != trans_placeholders {
            report.errors.push(format!(
                "Placeholder mismatch: original has {:?}, translation has {:?}",
                orig_placeholders, trans_placeholders
            ));
        }

        let orig_urls = Self::extract_urls(original);
        let trans_urls = Self::extract_urls(translated);
        if orig_urls != trans_urls {
            report.warnings.push(format!(
                "URL mismatch: original has {} URLs, translation has {} URLs",
                orig_urls.len(),
                trans_urls.len()
            ));
        }

        report
    }

    /// Extract printf-style placeholders, skipping the escaped `%%`.
    fn extract_placeholders(text: &str) -> Vec<String> {
        let regex = PLACEHOLDER_REGEX.get_or_init(|| {
            Regex::new(r"%(?:\d+\$)?[-+#0]*\d*(?:\.\d+)?(?:hh|h|ll|l|q|z|t|j|L)?[@dDiuUxXoOfFeEgGcCsSpaA%]")
                .unwrap()
        });

        regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|p| p != "%%")
            .collect()
    }

    /// Extract all URLs from text
    fn extract_urls(text: &str) -> Vec<String> {
        let regex = URL_REGEX.get_or_init(|| Regex::new(r"https?://[^\s)\]]+").unwrap());

        regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
