//! Token-bounded batch translation of iOS localization data.
//!
//! Jobs (`job`) are split to fit the model's input budget (`partition`), sent
//! one batch at a time (`driver`), and jobs from several stores share calls
//! through `multiplex`. `pipeline` ties stores, prompts and the backend
//! together per target language.

pub mod config;
pub mod driver;
pub mod error;
pub mod i18n;
pub mod job;
pub mod multiplex;
pub mod openai;
pub mod partition;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod store;
pub mod tokens;
