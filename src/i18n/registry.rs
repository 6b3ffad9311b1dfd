//! Language registry: display names for App Store and Xcode locale codes.
//!
//! Prompts name the destination language in English ("German (Germany)")
//! next to its code.

use std::sync::OnceLock;

/// A known language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// ISO 639 language code (e.g., "de", "zh")
    pub code: &'static str,

    /// English name of the language (e.g., "German", "Chinese")
    pub name: &'static str,
}

/// Global registry of language and region names.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
    regions: Vec<(&'static str, &'static str)>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
            regions: default_regions(),
        })
    }

    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Region or script name for the subtag after the language code.
    pub fn region_name(&self, code: &str) -> Option<&'static str> {
        self.regions
            .iter()
            .find(|(region, _)| *region == code)
            .map(|(_, name)| *name)
    }

    /// Human readable name of a locale tag.
    ///
    /// `de-DE` becomes `German (Germany)`, `zh-Hans` becomes
    /// `Chinese (Simplified)`. Unknown parts fall back to the capitalized code.
    pub fn display_name(&self, tag: &str) -> String {
        let (language, region) = match tag.split_once('-') {
            Some((language, region)) => (language, Some(region)),
            None => (tag, None),
        };

        let language_name = self
            .get_by_code(language)
            .map(|lang| lang.name.to_string())
            .unwrap_or_else(|| capitalize(language));

        match region {
            Some(region) => {
                let region_name = self
                    .region_name(region)
                    .map(str::to_string)
                    .unwrap_or_else(|| capitalize(region));
                format!("{} ({})", language_name, region_name)
            }
            None => language_name,
        }
    }
}

fn capitalize(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Languages supported by App Store Connect and Xcode string catalogs.
fn default_languages() -> Vec<LanguageConfig> {
    [
        ("ar", "Arabic"),
        ("ca", "Catalan"),
        ("cs", "Czech"),
        ("da", "Danish"),
        ("de", "German"),
        ("el", "Greek"),
        ("en", "English"),
        ("es", "Spanish"),
        ("fi", "Finnish"),
        ("fr", "French"),
        ("he", "Hebrew"),
        ("hi", "Hindi"),
        ("hr", "Croatian"),
        ("hu", "Hungarian"),
        ("id", "Indonesian"),
        ("it", "Italian"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("ms", "Malay"),
        ("nl", "Dutch"),
        ("no", "Norwegian"),
        ("nb", "Norwegian Bokmål"),
        ("pl", "Polish"),
        ("pt", "Portuguese"),
        ("ro", "Romanian"),
        ("ru", "Russian"),
        ("sk", "Slovak"),
        ("sv", "Swedish"),
        ("th", "Thai"),
        ("tr", "Turkish"),
        ("uk", "Ukrainian"),
        ("vi", "Vietnamese"),
        ("zh", "Chinese"),
    ]
    .into_iter()
    .map(|(code, name)| LanguageConfig { code, name })
    .collect()
}

fn default_regions() -> Vec<(&'static str, &'static str)> {
    vec![
        ("AU", "Australia"),
        ("BR", "Brazil"),
        ("CA", "Canada"),
        ("CN", "China"),
        ("DE", "Germany"),
        ("ES", "Spain"),
        ("FR", "France"),
        ("GB", "United Kingdom"),
        ("HK", "Hong Kong"),
        ("MX", "Mexico"),
        ("PT", "Portugal"),
        ("TW", "Taiwan"),
        ("US", "United States"),
        ("Hans", "Simplified"),
        ("Hant", "Traditional"),
    ]
}
