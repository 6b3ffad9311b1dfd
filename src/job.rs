//! Translation jobs and translation results.
//!
//! A [`Job`] is an ordered mapping from content key to a [`KeyRecord`], which in
//! turn maps language tags to text. An absent value (`null` on the wire) marks a
//! slot that needs translating. [`Translations`] is what comes back: the same
//! key/language layout with every value present.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Record entry that carries a translator note instead of a language value.
pub const COMMENT_KEY: &str = "comment";

/// CLDR plural category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl PluralCategory {
    pub const ALL: [PluralCategory; 6] = [
        PluralCategory::Zero,
        PluralCategory::One,
        PluralCategory::Two,
        PluralCategory::Few,
        PluralCategory::Many,
        PluralCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PluralCategory::Zero => "zero",
            PluralCategory::One => "one",
            PluralCategory::Two => "two",
            PluralCategory::Few => "few",
            PluralCategory::Many => "many",
            PluralCategory::Other => "other",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// Grammatical shape of a key: plain text or a plural-form table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Plural,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Plural => write!(f, "plural"),
        }
    }
}

/// A present value for one language of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Text {
    Scalar(String),
    Plural(BTreeMap<PluralCategory, String>),
}

impl Text {
    pub fn shape(&self) -> Shape {
        match self {
            Text::Scalar(_) => Shape::Scalar,
            Text::Plural(_) => Shape::Plural,
        }
    }

    /// Lenient conversion from model output.
    ///
    /// Returns `None` for `null`, numbers, arrays, and plural tables that
    /// contain unknown categories or non-string forms.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Text::Scalar(s.clone())),
            Value::Object(map) if !map.is_empty() => {
                let mut forms = BTreeMap::new();
                for (category, form) in map {
                    let category = PluralCategory::parse(category)?;
                    forms.insert(category, form.as_str()?.to_string());
                }
                Some(Text::Plural(forms))
            }
            _ => None,
        }
    }

    /// All strings carried by this value, in category order for plurals.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            Text::Scalar(s) => vec![s.as_str()],
            Text::Plural(forms) => forms.values().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::Scalar(s.to_string())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text::Scalar(s)
    }
}

/// Per-language values of one content key, plus an optional translator comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRecord {
    comment: Option<String>,
    values: BTreeMap<String, Option<Text>>,
}

impl KeyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Add a source value.
    pub fn with(mut self, language: impl Into<String>, text: impl Into<Text>) -> Self {
        self.values.insert(language.into(), Some(text.into()));
        self
    }

    /// Mark a language as needing translation.
    pub fn with_missing(mut self, language: impl Into<String>) -> Self {
        self.values.insert(language.into(), None);
        self
    }

    pub fn set(&mut self, language: impl Into<String>, value: Option<Text>) {
        self.values.insert(language.into(), value);
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// `None` when the language is not part of the record, `Some(None)` when
    /// it is requested but not yet translated.
    pub fn get(&self, language: &str) -> Option<&Option<Text>> {
        self.values.get(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Languages whose value is absent.
    pub fn requested_languages(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(language, _)| language.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.values.values().any(Option::is_none)
    }

    /// Shape shared by all present values.
    ///
    /// `None` when the record has no present value or mixes shapes.
    pub fn source_shape(&self) -> Option<Shape> {
        let mut shapes = self.values.values().flatten().map(Text::shape);
        let first = shapes.next()?;
        shapes.all(|shape| shape == first).then_some(first)
    }
}

impl Serialize for KeyRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.values.len() + usize::from(self.comment.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(comment) = &self.comment {
            map.serialize_entry(COMMENT_KEY, comment)?;
        }
        for (language, value) in &self.values {
            map.serialize_entry(language, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = KeyRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of language tags to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyRecord, A::Error> {
                let mut record = KeyRecord::new();
                while let Some(key) = access.next_key::<String>()? {
                    if key == COMMENT_KEY {
                        record.comment = access.next_value()?;
                    } else {
                        let value: Option<Text> = access.next_value()?;
                        record.values.insert(key, value);
                    }
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Ordered batch of content keys submitted for translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    entries: Vec<(String, KeyRecord)>,
    index: HashMap<String, usize>,
}

impl Job {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a record, replacing an existing one in place.
    pub fn insert(&mut self, key: impl Into<String>, record: KeyRecord) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&position) => self.entries[position].1 = record,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, record));
            }
        }
    }

    pub fn with(mut self, key: impl Into<String>, record: KeyRecord) -> Self {
        self.insert(key, record);
        self
    }

    pub fn get(&self, key: &str) -> Option<&KeyRecord> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyRecord)> {
        self.entries.iter().map(|(key, record)| (key.as_str(), record))
    }

    /// Split into the first `mid` keys and the rest, preserving order.
    pub fn split_at(self, mid: usize) -> (Job, Job) {
        let mut left = self.entries;
        let right = left.split_off(mid.min(left.len()));
        (left.into_iter().collect(), right.into_iter().collect())
    }

    /// Keys that still have at least one absent value.
    pub fn pending(&self) -> Job {
        self.iter()
            .filter(|(_, record)| record.is_pending())
            .map(|(key, record)| (key.to_string(), record.clone()))
            .collect()
    }

    /// Number of absent slots across all keys.
    pub fn requested_slots(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, record)| record.requested_languages().count())
            .sum()
    }

    /// Compact JSON sent to the backend and measured by the estimator.
    pub fn payload(&self) -> String {
        serde_json::to_string(self).expect("job maps have string keys and cannot fail to serialize")
    }

    /// Copy of this job with absent slots filled from `translations`.
    ///
    /// Present values are never overwritten.
    pub fn filled_with(&self, translations: &Translations) -> Job {
        let mut filled = self.clone();
        for (key, record) in filled.entries.iter_mut() {
            let Some(languages) = translations.get(key.as_str()) else {
                continue;
            };
            for (language, text) in languages {
                if let Some(slot @ None) = record.values.get_mut(language) {
                    *slot = Some(text.clone());
                }
            }
        }
        filled
    }
}

impl FromIterator<(String, KeyRecord)> for Job {
    fn from_iter<I: IntoIterator<Item = (String, KeyRecord)>>(iter: I) -> Self {
        let mut job = Job::new();
        for (key, record) in iter {
            job.insert(key, record);
        }
        job
    }
}

impl IntoIterator for Job {
    type Item = (String, KeyRecord);
    type IntoIter = std::vec::IntoIter<(String, KeyRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Job {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct JobVisitor;

        impl<'de> Visitor<'de> for JobVisitor {
            type Value = Job;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of content keys to key records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Job, A::Error> {
                let mut job = Job::new();
                while let Some((key, record)) = access.next_entry::<String, KeyRecord>()? {
                    job.insert(key, record);
                }
                Ok(job)
            }
        }

        deserializer.deserialize_map(JobVisitor)
    }
}

/// One translated slot, ready to be written to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub key: String,
    pub language: String,
    pub text: Text,
}

/// Translated values keyed by content key, then language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Translations(BTreeMap<String, BTreeMap<String, Text>>);

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse model output, keeping only well-formed values.
    ///
    /// `null` values and `comment` entries are dropped. Returns `None` when the
    /// output is not a JSON object of objects at the top level.
    pub fn from_response(value: &Value) -> Option<Self> {
        let mut translations = Translations::new();
        for (key, languages) in value.as_object()? {
            let Some(languages) = languages.as_object() else {
                continue;
            };
            for (language, text) in languages {
                if language == COMMENT_KEY {
                    continue;
                }
                if let Some(text) = Text::from_json(text) {
                    translations.insert(key.clone(), language.clone(), text);
                }
            }
        }
        Some(translations)
    }

    pub fn insert(&mut self, key: impl Into<String>, language: impl Into<String>, text: Text) {
        self.0
            .entry(key.into())
            .or_default()
            .insert(language.into(), text);
    }

    pub fn with(mut self, key: &str, language: &str, text: impl Into<Text>) -> Self {
        self.insert(key, language, text.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&BTreeMap<String, Text>> {
        self.0.get(key)
    }

    pub fn get_text(&self, key: &str, language: &str) -> Option<&Text> {
        self.0.get(key)?.get(language)
    }

    /// Number of keys with at least one translated language.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Text>)> {
        self.0.iter().map(|(key, languages)| (key.as_str(), languages))
    }

    /// Merge `other` into `self`. Slots already present are kept.
    pub fn merge(&mut self, other: Translations) {
        for (key, languages) in other.0 {
            let target = self.0.entry(key).or_default();
            for (language, text) in languages {
                target.entry(language).or_insert(text);
            }
        }
    }

    /// Flatten into a batch of store updates.
    pub fn updates(&self) -> Vec<Update> {
        self.0
            .iter()
            .flat_map(|(key, languages)| {
                languages.iter().map(move |(language, text)| Update {
                    key: key.clone(),
                    language: language.clone(),
                    text: text.clone(),
                })
            })
            .collect()
    }
}
