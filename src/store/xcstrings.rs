//! Xcode string catalogs (`.xcstrings`).
//!
//! The catalog is kept as a `serde_json::Value` so that fields this tool does
//! not understand (device variations, substitutions, extraction state) are
//! written back untouched.

use super::TranslationStore;
use crate::job::{Job, KeyRecord, PluralCategory, Text, Update, COMMENT_KEY};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `state` written into new string units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Translated,
    NeedsReview,
}

impl UnitState {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitState::Translated => "translated",
            UnitState::NeedsReview => "needs_review",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StringCatalog {
    path: PathBuf,
    out_path: PathBuf,
    data: Value,
    state: UnitState,
}

impl StringCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read string catalog {}", path.display()))?;
        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse string catalog {}", path.display()))?;
        Self::from_value(path, data)
    }

    pub fn from_value(path: impl Into<PathBuf>, data: Value) -> Result<Self> {
        let path = path.into();
        if !data.get("strings").is_some_and(Value::is_object) {
            bail!("{} has no \"strings\" table", path.display());
        }
        Ok(Self {
            out_path: path.clone(),
            path,
            data,
            state: UnitState::Translated,
        })
    }

    /// Write to `out_path` instead of overwriting the input file.
    pub fn with_output(mut self, out_path: impl Into<PathBuf>) -> Self {
        self.out_path = out_path.into();
        self
    }

    pub fn with_state(mut self, state: UnitState) -> Self {
        self.state = state;
        self
    }

    pub fn source_language(&self) -> Option<&str> {
        self.data.get("sourceLanguage").and_then(Value::as_str)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    fn strings(&self) -> Option<&Map<String, Value>> {
        self.data.get("strings").and_then(Value::as_object)
    }

    fn strings_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.data.get_mut("strings").and_then(Value::as_object_mut)
    }

    /// Catalog JSON in Xcode's layout (two-space indent, `" : "` separator).
    pub fn to_xcode_json(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, XcodeFormatter::default());
        self.data
            .serialize(&mut serializer)
            .context("Failed to serialize string catalog")?;
        String::from_utf8(buffer).context("Serialized catalog is not UTF-8")
    }
}

/// Source text of one localization, if it is a plain or plural string unit.
fn read_localization(localization: &Value) -> Option<Text> {
    if let Some(value) = localization
        .pointer("/stringUnit/value")
        .and_then(Value::as_str)
    {
        return Some(Text::Scalar(value.to_string()));
    }

    let plural = localization
        .pointer("/variations/plural")
        .and_then(Value::as_object)?;
    let forms: BTreeMap<PluralCategory, String> = plural
        .iter()
        .filter_map(|(category, unit)| {
            let category = PluralCategory::parse(category)?;
            let value = unit.pointer("/stringUnit/value")?.as_str()?;
            Some((category, value.to_string()))
        })
        .collect();
    (!forms.is_empty()).then_some(Text::Plural(forms))
}

fn string_unit(state: UnitState, value: &str) -> Value {
    json!({ "stringUnit": { "state": state.as_str(), "value": value } })
}

fn write_localization(state: UnitState, text: &Text) -> Value {
    match text {
        Text::Scalar(value) => string_unit(state, value),
        Text::Plural(forms) => {
            let mut sorted: Vec<(&str, &String)> =
                forms.iter().map(|(c, v)| (c.as_str(), v)).collect();
            sorted.sort_by_key(|(category, _)| *category);
            let plural: Map<String, Value> = sorted
                .into_iter()
                .map(|(category, value)| (category.to_string(), string_unit(state, value)))
                .collect();
            json!({ "variations": { "plural": plural } })
        }
    }
}

fn sort_keys(map: &mut Map<String, Value>) {
    let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    map.extend(entries);
}

impl TranslationStore for StringCatalog {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn pending_job(&self, sources: &[String], target: &str) -> Result<Job> {
        let Some(strings) = self.strings() else {
            bail!("{} has no \"strings\" table", self.path.display());
        };
        let source_language = self.source_language();
        let mut job = Job::new();

        for (key, entry) in strings {
            if entry.get("shouldTranslate") == Some(&Value::Bool(false)) {
                continue;
            }
            let localizations = entry.get("localizations").and_then(Value::as_object);
            if localizations.is_some_and(|l| l.contains_key(target)) {
                continue;
            }

            let mut record = KeyRecord::new();
            if let Some(comment) = entry.get(COMMENT_KEY).and_then(Value::as_str) {
                record = record.with_comment(comment);
            }

            let mut has_source = false;
            for language in sources {
                let text = localizations
                    .and_then(|l| l.get(language))
                    .and_then(read_localization)
                    // Keys in the development language are their own text
                    .or_else(|| {
                        (source_language == Some(language.as_str()) && !key.is_empty())
                            .then(|| Text::Scalar(key.clone()))
                    });
                if let Some(text) = text {
                    record.set(language.as_str(), Some(text));
                    has_source = true;
                }
            }

            if !has_source {
                debug!("Key '{}' has no text in {:?}, skipping", key, sources);
                continue;
            }
            record.set(target, None);
            job.insert(key.clone(), record);
        }

        Ok(job)
    }

    fn apply(&mut self, updates: &[Update]) -> Result<usize> {
        let state = self.state;
        let name = self.name();
        let Some(strings) = self.strings_mut() else {
            bail!("{} has no \"strings\" table", name);
        };

        let mut applied = 0;
        for update in updates {
            if update.language == COMMENT_KEY {
                continue;
            }
            let Some(entry) = strings.get_mut(&update.key).and_then(Value::as_object_mut) else {
                warn!("{}: key '{}' not found, skipping update", name, update.key);
                continue;
            };
            let localizations = entry
                .entry("localizations")
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(localizations) = localizations.as_object_mut() else {
                warn!("{}: key '{}' has malformed localizations", name, update.key);
                continue;
            };
            localizations.insert(
                update.language.clone(),
                write_localization(state, &update.text),
            );
            sort_keys(localizations);
            applied += 1;
        }
        Ok(applied)
    }

    fn flush(&self) -> Result<()> {
        let json = self.to_xcode_json()?;
        std::fs::write(&self.out_path, json)
            .with_context(|| format!("Failed to write {}", self.out_path.display()))?;
        debug!("Saved {}", self.out_path.display());
        Ok(())
    }
}

/// Pretty printer matching the files Xcode writes.
#[derive(Debug, Default)]
struct XcodeFormatter {
    indent: usize,
    has_value: bool,
}

impl XcodeFormatter {
    fn newline_and_indent<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"\n")?;
        for _ in 0..self.indent {
            writer.write_all(b"  ")?;
        }
        Ok(())
    }
}

impl serde_json::ser::Formatter for XcodeFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent -= 1;
        if self.has_value {
            self.newline_and_indent(writer)?;
        }
        writer.write_all(b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        self.newline_and_indent(writer)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent -= 1;
        if self.has_value {
            self.newline_and_indent(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        self.newline_and_indent(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b" : ")
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }
}
