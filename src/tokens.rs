//! Input budget estimation and token accounting.

use crate::job::Job;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use tiktoken_rs::CoreBPE;

/// Counts the tokens a prompt plus a job payload would consume.
pub trait TokenEstimator {
    fn count_tokens(&self, text: &str) -> usize;

    /// Estimate for the exact text submitted to the backend.
    fn estimate(&self, prompt: &str, job: &Job) -> usize {
        self.count_tokens(&format!("{}\n{}", prompt, job.payload()))
    }
}

impl<T: TokenEstimator + ?Sized> TokenEstimator for &T {
    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }
}

/// BPE tokenizer shared by the GPT-4 family (`cl100k_base`).
pub struct TiktokenEstimator {
    bpe: CoreBPE,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().context("Failed to load cl100k_base tokenizer")?;
        Ok(Self { bpe })
    }
}

impl fmt::Debug for TiktokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TiktokenEstimator(cl100k_base)")
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Character-ratio approximation (1 token per `chars_per_token` characters,
/// rounded up).
#[derive(Debug, Clone, Copy)]
pub struct CharEstimator {
    chars_per_token: usize,
}

impl CharEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Cumulative input and output tokens of one translator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn record(&mut self, input: usize, output: usize) {
        self.input += input as u64;
        self.output += output as u64;
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (in {} / out {})",
            self.total(),
            self.input,
            self.output
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::KeyRecord;

    #[test]
    fn test_char_estimator_rounds_up() {
        let estimator = CharEstimator::new(4);
        assert_eq!(estimator.count_tokens(""), 0);
        assert_eq!(estimator.count_tokens("abc"), 1);
        assert_eq!(estimator.count_tokens("abcd"), 1);
        assert_eq!(estimator.count_tokens("abcde"), 2);
    }

    #[test]
    fn test_char_estimator_counts_characters_not_bytes() {
        let estimator = CharEstimator::new(1);
        assert_eq!(estimator.count_tokens("Поддержка"), 9);
    }

    #[test]
    fn test_zero_ratio_is_clamped() {
        assert_eq!(CharEstimator::new(0).count_tokens("abc"), 3);
    }

    #[test]
    fn test_estimate_covers_prompt_and_payload() {
        let estimator = CharEstimator::new(1);
        let job = Job::new().with("a", KeyRecord::new().with_missing("ru"));
        // "P\n" + {"a":{"ru":null}}
        assert_eq!(estimator.estimate("P", &job), 2 + r#"{"a":{"ru":null}}"#.len());
    }

    #[test]
    fn test_estimate_grows_with_entries() {
        let estimator = CharEstimator::default();
        let mut job = Job::new();
        let mut previous = estimator.estimate("prompt", &job);
        for i in 0..20 {
            job.insert(
                format!("key{}", i),
                KeyRecord::new().with("en", "Some text").with_missing("de"),
            );
            let current = estimator.estimate("prompt", &job);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_tiktoken_counts_tokens() {
        let estimator = TiktokenEstimator::new().expect("tokenizer should load");
        assert_eq!(estimator.count_tokens(""), 0);
        assert!(estimator.count_tokens("Hello, world!") > 0);
        assert!(
            estimator.count_tokens("Hello, world! Hello, world!")
                > estimator.count_tokens("Hello, world!")
        );
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.record(100, 5);
        usage.record(50, 7);
        assert_eq!(usage, TokenUsage { input: 150, output: 12 });
        assert_eq!(usage.total(), 162);
        assert_eq!(usage.to_string(), "162 (in 150 / out 12)");
    }
}
