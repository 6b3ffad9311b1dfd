//! Batch driver: partitions a job, feeds the batches to a translation backend
//! one at a time, and merges what comes back.

use crate::error::{
    BackendError, InconsistencyKind, MergeInconsistency, MissingTranslation, TranslateError,
};
use crate::job::{Job, Translations};
use crate::partition::partition;
use crate::tokens::{TokenEstimator, TokenUsage};
use async_trait::async_trait;
use tracing::{debug, info};

/// Output of a single backend call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendResponse {
    pub translations: Translations,
    pub output_tokens: usize,
}

/// Anything that turns a prompt plus a job into translations.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Largest input, in tokens, the backend accepts per call.
    fn max_input_tokens(&self) -> usize;

    async fn translate(&self, prompt: &str, job: &Job) -> Result<BackendResponse, BackendError>;
}

/// Result of one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub translations: Translations,
    /// Entries the backend returned that did not match the job.
    pub inconsistencies: Vec<MergeInconsistency>,
    /// Requested slots the backend left empty.
    pub missing: Vec<MissingTranslation>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Fold another report in; keys are expected to be disjoint.
    pub fn absorb(&mut self, other: RunReport) {
        self.translations.merge(other.translations);
        self.inconsistencies.extend(other.inconsistencies);
        self.missing.extend(other.missing);
    }
}

/// Sequential job runner owning its backend, estimator and token counters.
pub struct BatchTranslator<B, E> {
    backend: B,
    estimator: E,
    usage: TokenUsage,
    backend_calls: usize,
}

impl<B, E> BatchTranslator<B, E>
where
    B: TranslationBackend,
    E: TokenEstimator,
{
    pub fn new(backend: B, estimator: E) -> Self {
        Self {
            backend,
            estimator,
            usage: TokenUsage::default(),
            backend_calls: 0,
        }
    }

    /// Tokens consumed and produced since this translator was created.
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn backend_calls(&self) -> usize {
        self.backend_calls
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Translate every absent slot of `job`.
    ///
    /// Keys without absent slots are skipped; a job with nothing to do makes
    /// no backend call. Any backend failure aborts the run and discards the
    /// batches translated so far.
    pub async fn run(&mut self, prompt: &str, job: &Job) -> Result<RunReport, TranslateError> {
        let pending = job.pending();
        if pending.is_empty() {
            debug!("Nothing to translate");
            return Ok(RunReport::default());
        }

        let total = pending.len();
        let batches = partition(
            pending.clone(),
            prompt,
            self.backend.max_input_tokens(),
            &self.estimator,
        )?;
        debug!(
            "Split {} keys ({} slots) into {} batches",
            total,
            pending.requested_slots(),
            batches.len()
        );

        let mut report = RunReport::default();
        let mut translated = 0;

        for batch in batches {
            let response = self.backend.translate(prompt, &batch.job).await?;
            self.backend_calls += 1;
            self.usage.record(batch.input_tokens, response.output_tokens);

            merge_checked(&batch.job, response.translations, &mut report);

            translated += batch.job.len();
            info!(
                "Translating {}/{}, tokens count: {}",
                translated, total, self.usage
            );
        }

        report.missing = missing_slots(&pending, &report.translations);
        Ok(report)
    }
}

/// Merge backend output for `batch` into `report`, rejecting entries that do
/// not correspond to an absent slot of the expected shape.
fn merge_checked(batch: &Job, translations: Translations, report: &mut RunReport) {
    let mut accepted = Translations::new();

    for (key, languages) in translations.iter() {
        let record = batch.get(key);
        for (language, text) in languages {
            let kind = match record {
                None => Some(InconsistencyKind::UnexpectedKey),
                Some(record) => match (record.get(language), record.source_shape()) {
                    (Some(None), Some(expected)) if text.shape() != expected => {
                        Some(InconsistencyKind::ShapeMismatch { expected })
                    }
                    (Some(None), _) => None,
                    _ => Some(InconsistencyKind::UnrequestedLanguage),
                },
            };

            match kind {
                Some(kind) => report.inconsistencies.push(MergeInconsistency {
                    key: key.to_string(),
                    language: language.clone(),
                    kind,
                }),
                None => accepted.insert(key, language.clone(), text.clone()),
            }
        }
    }

    report.translations.merge(accepted);
}

fn missing_slots(job: &Job, translations: &Translations) -> Vec<MissingTranslation> {
    job.iter()
        .flat_map(|(key, record)| {
            record
                .requested_languages()
                .filter(move |language| translations.get_text(key, language).is_none())
                .map(move |language| MissingTranslation {
                    key: key.to_string(),
                    language: language.to_string(),
                })
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;
    use crate::job::{KeyRecord, PluralCategory, Shape, Text};
    use crate::tokens::CharEstimator;
    use std::collections::BTreeMap;

    fn scalar_job(count: usize) -> Job {
        (0..count)
            .map(|i| {
                (
                    format!("key{}", i),
                    KeyRecord::new()
                        .with("en", format!("Text number {}", i))
                        .with_missing("ru"),
                )
            })
            .collect()
    }

    fn response(translations: Translations, output_tokens: usize) -> BackendResponse {
        BackendResponse {
            translations,
            output_tokens,
        }
    }

    #[tokio::test]
    async fn test_support_scenario() {
        let job = Job::new().with(
            "support",
            KeyRecord::new().with("en", "Support").with_missing("ru"),
        );
        let backend = ScriptedBackend::echo(10_000).then(Ok(response(
            Translations::new().with("support", "ru", "Поддержка"),
            3,
        )));
        let mut translator = BatchTranslator::new(backend, CharEstimator::default());

        let report = translator.run("prompt", &job).await.unwrap();

        assert_eq!(
            report.translations,
            Translations::new().with("support", "ru", "Поддержка")
        );
        assert!(report.is_complete());
        assert!(report.inconsistencies.is_empty());

        let filled = job.filled_with(&report.translations);
        let record = filled.get("support").unwrap();
        assert_eq!(record.get("ru"), Some(&Some(Text::from("Поддержка"))));
        assert_eq!(record.get("en"), Some(&Some(Text::from("Support"))));
    }

    #[tokio::test]
    async fn test_nothing_to_translate_makes_no_calls() {
        let job = Job::new().with(
            "done",
            KeyRecord::new().with("en", "Done").with("ru", "Готово"),
        );
        let mut translator =
            BatchTranslator::new(ScriptedBackend::echo(10_000), CharEstimator::default());

        let report = translator.run("prompt", &job).await.unwrap();

        assert!(report.translations.is_empty());
        assert_eq!(translator.backend_calls(), 0);
        assert!(translator.backend().calls().is_empty());
        assert_eq!(translator.usage(), TokenUsage::default());
    }

    #[tokio::test]
    async fn test_output_tokens_accumulate_across_batches() {
        let job = scalar_job(2);
        let estimator = CharEstimator::new(1);
        let single = estimator.estimate("p", &scalar_job(1));
        let backend = ScriptedBackend::echo(single + 5)
            .then(Ok(response(
                Translations::new().with("key0", "ru", "Текст 0"),
                5,
            )))
            .then(Ok(response(
                Translations::new().with("key1", "ru", "Текст 1"),
                7,
            )));
        let mut translator = BatchTranslator::new(backend, estimator);

        let report = translator.run("p", &job).await.unwrap();

        assert_eq!(translator.backend_calls(), 2);
        assert_eq!(translator.usage().output, 12);
        assert_eq!(report.translations.len(), 2);

        let calls = translator.backend().calls();
        let expected_input: usize = calls
            .iter()
            .map(|(prompt, job)| CharEstimator::new(1).estimate(prompt, job))
            .sum();
        assert_eq!(translator.usage().input, expected_input as u64);
    }

    #[tokio::test]
    async fn test_usage_never_decreases_across_runs() {
        let mut translator =
            BatchTranslator::new(ScriptedBackend::echo(10_000), CharEstimator::default());
        let mut previous = translator.usage();
        for count in [3, 0, 5] {
            translator.run("p", &scalar_job(count)).await.unwrap();
            let current = translator.usage();
            assert!(current.input >= previous.input);
            assert!(current.output >= previous.output);
            previous = current;
        }
        assert_eq!(translator.backend_calls(), 2);
    }

    #[tokio::test]
    async fn test_batches_are_sent_in_key_order() {
        let job = scalar_job(8);
        let estimator = CharEstimator::new(1);
        let limit = estimator.estimate("p", &scalar_job(3));
        let mut translator = BatchTranslator::new(ScriptedBackend::echo(limit), estimator);

        let report = translator.run("p", &job).await.unwrap();

        let sent: Vec<String> = translator
            .backend()
            .calls()
            .iter()
            .flat_map(|(_, job)| job.keys().map(str::to_string).collect::<Vec<_>>())
            .collect();
        assert_eq!(sent, job.keys().map(str::to_string).collect::<Vec<_>>());
        assert!(translator.backend_calls() > 1);
        assert_eq!(report.translations.len(), 8);
    }

    #[tokio::test]
    async fn test_backend_error_aborts_run() {
        let job = scalar_job(2);
        let estimator = CharEstimator::new(1);
        let single = estimator.estimate("p", &scalar_job(1));
        let backend = ScriptedBackend::echo(single + 5)
            .then(Ok(response(Translations::new().with("key0", "ru", "A"), 1)))
            .then(Err(BackendError::Api {
                status: 401,
                body: "invalid key".to_string(),
            }));
        let mut translator = BatchTranslator::new(backend, estimator);

        let err = translator.run("p", &job).await.unwrap_err();
        assert!(matches!(
            err,
            TranslateError::Backend(BackendError::Api { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_oversize_entry_aborts_before_any_call() {
        let job = Job::new().with(
            "description",
            KeyRecord::new().with("en", "x".repeat(400)).with_missing("ru"),
        );
        let mut translator =
            BatchTranslator::new(ScriptedBackend::echo(50), CharEstimator::new(1));

        let err = translator.run("p", &job).await.unwrap_err();
        assert!(matches!(
            err,
            TranslateError::OversizeEntry { key: Some(ref k), .. } if k == "description"
        ));
        assert_eq!(translator.backend_calls(), 0);
    }

    #[tokio::test]
    async fn test_inconsistent_entries_are_rejected() {
        let job = Job::new()
            .with(
                "items",
                KeyRecord::new()
                    .with(
                        "en",
                        Text::Plural(BTreeMap::from([
                            (PluralCategory::One, "item".to_string()),
                            (PluralCategory::Other, "items".to_string()),
                        ])),
                    )
                    .with_missing("ru"),
            )
            .with(
                "title",
                KeyRecord::new().with("en", "Title").with_missing("ru"),
            );
        let backend = ScriptedBackend::echo(10_000).then(Ok(response(
            Translations::new()
                .with("items", "ru", "предметы")
                .with("title", "ru", "Заголовок")
                .with("title", "en", "Heading")
                .with("ghost", "ru", "Призрак"),
            4,
        )));
        let mut translator = BatchTranslator::new(backend, CharEstimator::default());

        let report = translator.run("p", &job).await.unwrap();

        assert_eq!(
            report.translations,
            Translations::new().with("title", "ru", "Заголовок")
        );
        let kinds: Vec<(String, InconsistencyKind)> = report
            .inconsistencies
            .iter()
            .map(|i| (i.key.clone(), i.kind))
            .collect();
        assert!(kinds.contains(&("ghost".to_string(), InconsistencyKind::UnexpectedKey)));
        assert!(kinds.contains(&(
            "items".to_string(),
            InconsistencyKind::ShapeMismatch {
                expected: Shape::Plural
            }
        )));
        assert!(kinds.contains(&("title".to_string(), InconsistencyKind::UnrequestedLanguage)));
        assert_eq!(
            report.missing,
            vec![MissingTranslation {
                key: "items".to_string(),
                language: "ru".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_partial_response_reports_missing_keys() {
        let job = scalar_job(3);
        let backend = ScriptedBackend::echo(10_000).then(Ok(response(
            Translations::new().with("key1", "ru", "Текст"),
            2,
        )));
        let mut translator = BatchTranslator::new(backend, CharEstimator::default());

        let report = translator.run("p", &job).await.unwrap();

        assert!(!report.is_complete());
        let missing: Vec<&str> = report.missing.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(missing, vec!["key0", "key2"]);
        assert_eq!(report.translations.len(), 1);
    }

    #[test]
    fn test_report_absorb() {
        let mut first = RunReport {
            translations: Translations::new().with("a", "de", "A"),
            ..RunReport::default()
        };
        let second = RunReport {
            translations: Translations::new().with("b", "de", "B"),
            missing: vec![MissingTranslation {
                key: "c".to_string(),
                language: "de".to_string(),
            }],
            ..RunReport::default()
        };

        first.absorb(second);
        assert_eq!(first.translations.len(), 2);
        assert_eq!(first.missing.len(), 1);
        assert!(!first.is_complete());
    }
}
