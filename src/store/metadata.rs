//! fastlane metadata trees: `<root>/<language>/<field>.txt`.

use super::TranslationStore;
use crate::job::{Job, KeyRecord, Text, Update};
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// App Store length limits, in characters.
const FIELD_LIMITS: &[(&str, usize)] = &[
    ("name", 30),
    ("subtitle", 30),
    ("keywords", 100),
    ("promotional_text", 170),
    ("release_notes", 4000),
    ("description", 4000),
];

pub fn field_limit(field: &str) -> Option<usize> {
    FIELD_LIMITS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, limit)| *limit)
}

/// A translated field longer than the App Store accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceededField {
    pub field: String,
    pub language: String,
    pub value: String,
    pub limit: usize,
}

impl ExceededField {
    /// Check `value` against the limit for `field`, if there is one.
    pub fn check(field: &str, language: &str, value: &str) -> Option<Self> {
        let limit = field_limit(field)?;
        (value.chars().count() > limit).then(|| Self {
            field: field.to_string(),
            language: language.to_string(),
            value: value.to_string(),
            limit,
        })
    }

    /// The part of the value past the limit.
    pub fn overflow(&self) -> String {
        self.value.chars().skip(self.limit).collect()
    }
}

impl fmt::Display for ExceededField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Field: {}, lang: {}, len: {} (got {}), over by: '{}'",
            self.field,
            self.language,
            self.limit,
            self.value.chars().count(),
            self.overflow()
        )
    }
}

/// Drop trailing comma-separated keywords until the list fits.
pub fn trim_keywords(keywords: &str, limit: usize) -> String {
    let mut trimmed = keywords.to_string();
    while trimmed.chars().count() > limit {
        match trimmed.rfind(',') {
            Some(index) => trimmed.truncate(index),
            None => trimmed.clear(),
        }
    }
    trimmed
}

#[derive(Debug, Clone)]
pub struct MetadataDir {
    root: PathBuf,
    fields: Vec<String>,
    exceeded: Vec<ExceededField>,
}

impl MetadataDir {
    pub fn new(root: impl Into<PathBuf>, fields: Vec<String>) -> Self {
        Self {
            root: root.into(),
            fields,
            exceeded: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn field_path(&self, language: &str, field: &str) -> PathBuf {
        self.root.join(language).join(format!("{}.txt", field))
    }

    /// Over-length fields written so far.
    pub fn exceeded(&self) -> &[ExceededField] {
        &self.exceeded
    }

    fn read_field(&self, language: &str, field: &str) -> Result<Option<String>> {
        let path = self.field_path(language, field);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(text.trim_end().to_string()))
    }

    /// Copy untranslatable fields (URLs and the like) from `source`.
    ///
    /// Existing non-blank files in `target` are left alone. Returns the number
    /// of files copied.
    pub fn copy_fields(&self, fields: &[String], source: &str, target: &str) -> Result<usize> {
        let mut copied = 0;
        for field in fields {
            let destination = self.field_path(target, field);
            if destination.exists() {
                let existing = std::fs::read_to_string(&destination)
                    .with_context(|| format!("Failed to read {}", destination.display()))?;
                if !existing.trim().is_empty() {
                    continue;
                }
            }

            let source_path = self.field_path(source, field);
            if !source_path.exists() {
                debug!("No {} to copy from {}", field, source);
                continue;
            }
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::copy(&source_path, &destination).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    source_path.display(),
                    destination.display()
                )
            })?;
            copied += 1;
        }
        Ok(copied)
    }
}

impl TranslationStore for MetadataDir {
    fn name(&self) -> String {
        self.root.display().to_string()
    }

    /// Every field is requested again on each run; fastlane metadata has no
    /// notion of a stale translation.
    fn pending_job(&self, sources: &[String], target: &str) -> Result<Job> {
        let mut job = Job::new();
        for field in &self.fields {
            let mut record = KeyRecord::new();
            let mut has_source = false;
            for language in sources {
                if let Some(text) = self.read_field(language, field)? {
                    record.set(language.as_str(), Some(Text::Scalar(text)));
                    has_source = true;
                }
            }
            if !has_source {
                warn!("No {}.txt in any of {:?}, skipping", field, sources);
                continue;
            }
            record.set(target, None);
            job.insert(field.clone(), record);
        }
        Ok(job)
    }

    fn apply(&mut self, updates: &[Update]) -> Result<usize> {
        let mut applied = 0;
        for update in updates {
            let Text::Scalar(text) = &update.text else {
                warn!("Plural value for {} in {}, skipping", update.key, update.language);
                continue;
            };

            let text = if update.key == "keywords" {
                trim_keywords(text, field_limit("keywords").unwrap_or(100))
            } else {
                text.clone()
            };
            if let Some(exceeded) = ExceededField::check(&update.key, &update.language, &text) {
                self.exceeded.push(exceeded);
            }

            let path = self.field_path(&update.language, &update.key);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, format!("{}\n", text))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            applied += 1;
        }
        Ok(applied)
    }

    fn flush(&self) -> Result<()> {
        // Files are written as updates arrive
        Ok(())
    }
}
