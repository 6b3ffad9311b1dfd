//! System prompts for the translation backend.

use crate::i18n::LanguageRegistry;
use crate::job::Shape;

fn target_clause(language: &str) -> String {
    let registry = LanguageRegistry::get();
    match registry.get_by_code(language.split('-').next().unwrap_or(language)) {
        Some(_) => format!(
            " to {} (lang code '{}')",
            registry.display_name(language),
            language
        ),
        None => format!(" to lang code \"{}\"", language),
    }
}

/// Prompt for in-app strings of one shape.
pub fn build_strings_prompt(language: &str, app_description: Option<&str>, shape: Shape) -> String {
    let about = app_description
        .map(|description| format!("Application is about: {}. ", description))
        .unwrap_or_default();

    let example = match shape {
        Shape::Scalar => {
            r#"Example JSON input:
{"support":{"en":"Support","ru":null}}
Output:
{"support":{"ru":"Поддержка"}}"#
        }
        Shape::Plural => {
            r#"Every value is a map of CLDR plural categories (zero, one, two, few, many, other). Answer with the categories the target language needs.
Example JSON input:
{"items":{"en":{"one":"%d item","other":"%d items"},"ru":null}}
Output:
{"items":{"ru":{"one":"%d предмет","few":"%d предмета","many":"%d предметов","other":"%d предмета"}}}"#
        }
    };

    format!(
        r#"Assist with localizing the iOS application{}. {}Only translate fields with 'null' values. Use the "comment" field as context and never translate it. Maintain the text length, spacing, indentation, and placeholders such as '%@' and '%d'. {}
"#,
        target_clause(language),
        about,
        example
    )
}

/// Prompt for App Store listing fields.
pub fn build_metadata_prompt(language: &str, same_app_name: Option<&str>) -> String {
    let keep_name = same_app_name
        .map(|name| format!(" Keep the name of the app the same in all languages: \"{}\".", name))
        .unwrap_or_default();

    format!(
        r#"Help to localize iOS application metadata. As input you get JSON text:
{{"field":{{"lang_code1":"Some text","lang_code2":"Other language text","lang_code3":null}}}}

Translate fields to {} language. Optimize the text for App Store search in that language. Try to keep the length of the translated text. Keep "name" and "subtitle" under 30 characters, "promotional_text" under 170 characters, and "keywords" under 100 characters. Prepare translations for all "null" fields. Don't repeat the input text!{}

Example JSON input:
{{"name":{{"en-US":"Video Player","ru":"Видео Плеер","de-DE":null}}}}

JSON Output:
{{"name":{{"de-DE":"Videoplayer"}}}}
"#,
        LanguageRegistry::get().display_name(language),
        keep_name
    )
}

/// Prompt for release notes going to every target language at once.
pub fn build_release_notes_prompt() -> String {
    r#"Help to localize iOS release notes. Fill every 'null' language with a translation of the notes. Keep them short and keep the list formatting.
Example JSON input:
{"release_notes":{"en-US":"Bug fixes","ru":null,"de-DE":null}}
Output:
{"release_notes":{"ru":"Исправлены ошибки","de-DE":"Fehlerbehebungen"}}
"#
    .to_string()
}
