//! Language names and translation quality checks.
//!
//! - `registry`: display names for locale codes used in prompts
//! - `validator`: placeholder and URL preservation checks
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::i18n::{LanguageRegistry, TranslationValidator};
//!
//! let name = LanguageRegistry::get().display_name("pt-BR"); // "Portuguese (Brazil)"
//! let report = TranslationValidator::validate("%d items", "%d itens");
//! ```

mod registry;
mod validator;

pub use registry::{LanguageConfig, LanguageRegistry};
pub use validator::{TranslationValidator, ValidationReport};
