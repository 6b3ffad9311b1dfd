//! Per-language localization run over one or more stores.
//!
//! For each target language every store contributes a pending job; the jobs
//! are grouped by shape, translated, split back out, checked for broken
//! placeholders and written to their stores before the next language starts.

use crate::driver::{BatchTranslator, RunReport, TranslationBackend};
use crate::error::{MergeInconsistency, MissingTranslation};
use crate::i18n::TranslationValidator;
use crate::job::{Job, Shape, Text, Translations};
use crate::multiplex::{group, ungroup, KeyMapping};
use crate::store::TranslationStore;
use crate::tokens::TokenEstimator;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// A translation that lost or changed placeholders or URLs of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub key: String,
    pub language: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key '{}' in {}: {}", self.key, self.language, self.message)
    }
}

/// What happened to one target language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageOutcome {
    pub language: String,
    /// Slots written to the stores.
    pub applied: usize,
    pub inconsistencies: Vec<MergeInconsistency>,
    /// Requested slots left empty, including keys that could not be sent.
    pub missing: Vec<MissingTranslation>,
    pub placeholder_issues: Vec<ValidationIssue>,
    pub url_warnings: Vec<ValidationIssue>,
}

impl LanguageOutcome {
    fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.inconsistencies.is_empty()
            && self.missing.is_empty()
            && self.placeholder_issues.is_empty()
            && self.url_warnings.is_empty()
    }
}

/// Localize `stores` into every language of `targets` not in `sources`.
///
/// Stores are flushed after each language, so an error part way through keeps
/// the languages already finished.
pub async fn localize<B, E, S, P>(
    translator: &mut BatchTranslator<B, E>,
    stores: &mut [S],
    sources: &[String],
    targets: &[String],
    prompt_for: P,
) -> Result<Vec<LanguageOutcome>>
where
    B: TranslationBackend,
    E: TokenEstimator,
    S: TranslationStore,
    P: Fn(&str, Shape) -> String,
{
    let mut outcomes = Vec::new();
    for target in targets {
        if sources.contains(target) {
            continue;
        }
        info!("Processing language {}", target);
        let outcome =
            localize_language(translator, stores, sources, target, |shape| prompt_for(target, shape))
                .await?;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Localize `stores` into a single `target` language.
pub async fn localize_language<B, E, S, P>(
    translator: &mut BatchTranslator<B, E>,
    stores: &mut [S],
    sources: &[String],
    target: &str,
    prompt_for: P,
) -> Result<LanguageOutcome>
where
    B: TranslationBackend,
    E: TokenEstimator,
    S: TranslationStore,
    P: Fn(Shape) -> String,
{
    let mut outcome = LanguageOutcome::new(target);

    let jobs = stores
        .iter()
        .map(|store| store.pending_job(sources, target))
        .collect::<Result<Vec<_>>>()?;
    let grouped = group(&jobs);
    let multiple = stores.len() > 1;
    for (store, keys) in stores.iter().zip(&grouped.skipped) {
        for key in keys {
            let missing = MissingTranslation {
                key: origin_label(store, key, multiple),
                language: target.to_string(),
            };
            warn!("No translation for {}: source texts differ in shape", missing);
            outcome.missing.push(missing);
        }
    }
    if grouped.combined.is_empty() {
        info!("{}: nothing to translate", target);
        return Ok(outcome);
    }

    let mut report = RunReport::default();
    for combined in &grouped.combined {
        let prompt = prompt_for(combined.shape);
        let part = translator
            .run(&prompt, &combined.job)
            .await
            .with_context(|| format!("Failed to translate {} strings to {}", combined.shape, target))?;
        report.absorb(part);
    }

    let labels = origin_labels(stores, &grouped.mappings);
    let relabel = |key: &mut String| {
        if let Some(label) = labels.get(key.as_str()) {
            *key = label.clone();
        }
    };
    for mut inconsistency in report.inconsistencies {
        relabel(&mut inconsistency.key);
        warn!("Ignored backend output: {}", inconsistency);
        outcome.inconsistencies.push(inconsistency);
    }
    for mut missing in report.missing {
        relabel(&mut missing.key);
        warn!("No translation for {}", missing);
        outcome.missing.push(missing);
    }

    let results = ungroup(&report.translations, &grouped.mappings);
    for ((store, job), translations) in stores.iter_mut().zip(&jobs).zip(results) {
        let (errors, warnings) = validate_translations(job, sources, &translations);
        for mut issue in errors {
            issue.key = origin_label(&*store, &issue.key, multiple);
            warn!("Placeholder mismatch for {}", issue);
            outcome.placeholder_issues.push(issue);
        }
        for mut issue in warnings {
            issue.key = origin_label(&*store, &issue.key, multiple);
            warn!("URL mismatch for {}", issue);
            outcome.url_warnings.push(issue);
        }

        if translations.is_empty() {
            continue;
        }
        outcome.applied += store
            .apply(&translations.updates())
            .with_context(|| format!("Failed to update {}", store.name()))?;
        store.flush()?;
    }

    info!("{}: {} translations saved", target, outcome.applied);
    Ok(outcome)
}

/// Combined key to a readable origin, prefixed by store when there are several.
fn origin_labels<S: TranslationStore>(stores: &[S], mappings: &[KeyMapping]) -> HashMap<String, String> {
    let multiple = stores.len() > 1;
    let mut labels = HashMap::new();
    for (store, mapping) in stores.iter().zip(mappings) {
        for (original, combined) in mapping {
            labels.insert(combined.clone(), origin_label(store, original, multiple));
        }
    }
    labels
}

fn origin_label<S: TranslationStore>(store: &S, key: &str, multiple: bool) -> String {
    if multiple {
        format!("{}: {}", store.name(), key)
    } else {
        key.to_string()
    }
}

fn first_source<'a>(job: &'a Job, key: &str, sources: &[String]) -> Option<&'a Text> {
    let record = job.get(key)?;
    sources
        .iter()
        .find_map(|language| record.get(language).and_then(Option::as_ref))
}

/// Placeholder errors and URL warnings of `translations` against their sources.
fn validate_translations(
    job: &Job,
    sources: &[String],
    translations: &Translations,
) -> (Vec<ValidationIssue>, Vec<ValidationIssue>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for (key, languages) in translations.iter() {
        let Some(source) = first_source(job, key, sources) else {
            continue;
        };
        for (language, text) in languages {
            let report = TranslationValidator::validate_text(source, text);
            let issue = |message| ValidationIssue {
                key: key.to_string(),
                language: language.clone(),
                message,
            };
            errors.extend(report.errors.into_iter().map(issue));
            warnings.extend(report.warnings.into_iter().map(issue));
        }
    }
    (errors, warnings)
}
