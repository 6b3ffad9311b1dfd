use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use xcloc_gpt::config::Config;
use xcloc_gpt::driver::BatchTranslator;
use xcloc_gpt::openai::OpenAiBackend;
use xcloc_gpt::pipeline::{localize, LanguageOutcome};
use xcloc_gpt::prompt::{build_metadata_prompt, build_release_notes_prompt, build_strings_prompt};
use xcloc_gpt::store::release_notes::{self, RELEASE_NOTES_FIELD};
use xcloc_gpt::store::{MetadataDir, StringCatalog, TranslationStore, UnitState};
use xcloc_gpt::tokens::TiktokenEstimator;

const RELEASE_NOTES_TEMPERATURE: f32 = 0.4;

#[derive(Parser)]
#[command(name = "xcloc-gpt", version, about = "Localize iOS apps with GPT")]
struct Cli {
    /// Model name (overrides OPENAI_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Sampling temperature (overrides OPENAI_TEMPERATURE)
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Input token budget per request (overrides MAX_INPUT_TOKENS)
    #[arg(long, global = true)]
    max_input_tokens: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate Xcode string catalogs (.xcstrings)
    Strings(StringsArgs),
    /// Translate fastlane App Store metadata
    Metadata(MetadataArgs),
    /// Translate release notes into a fastlane metadata directory
    ReleaseNotes(ReleaseNotesArgs),
}

#[derive(Args)]
struct StringsArgs {
    /// String catalog to translate; repeat to share requests across catalogs
    #[arg(long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Write the result here instead of overwriting the input (single file only)
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Source languages, e.g. "en,de"
    #[arg(long, value_delimiter = ',', required = true)]
    localize_from: Vec<String>,

    /// Target languages, e.g. "ru,ja,pt-BR"
    #[arg(long, value_delimiter = ',', required = true)]
    localize_to: Vec<String>,

    /// Short description of the app, given to the model as context
    #[arg(long)]
    app_description: Option<String>,

    /// Mark new translations as needing review in Xcode
    #[arg(long)]
    needs_review: bool,
}

#[derive(Args)]
struct MetadataArgs {
    /// fastlane metadata directory
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Fields to translate, same as file names, e.g. "name,subtitle,description"
    #[arg(long, value_delimiter = ',', required = true)]
    fields: Vec<String>,

    /// Fields copied from the first source language, e.g. "support_url,privacy_url"
    #[arg(long, value_delimiter = ',')]
    copy_fields: Vec<String>,

    #[arg(long, value_delimiter = ',', required = true)]
    localize_from: Vec<String>,

    #[arg(long, value_delimiter = ',', required = true)]
    localize_to: Vec<String>,

    /// Keep this app name in every language
    #[arg(long)]
    force_app_name: Option<String>,
}

#[derive(Args)]
struct ReleaseNotesArgs {
    /// fastlane metadata directory to write `release_notes.txt` into
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Language the notes are written in
    #[arg(long, default_value = "en-US")]
    localize_from: String,

    #[arg(long, value_delimiter = ',', required = true)]
    localize_to: Vec<String>,

    /// Read notes from a file instead of stdin
    #[arg(long)]
    notes_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xcloc_gpt=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = &cli.model {
        config.openai_model = model.clone();
    }
    if let Some(temperature) = cli.temperature {
        config.openai_temperature = temperature;
    }
    if cli.max_input_tokens.is_some() {
        config.max_input_tokens = cli.max_input_tokens;
    }

    let backend = OpenAiBackend::from_config(&config)?;
    info!(
        "Using {} with {} input tokens per request",
        backend.model(),
        config.input_budget()?
    );

    match cli.command {
        Commands::Strings(args) => run_strings(backend, args).await,
        Commands::Metadata(args) => run_metadata(backend, args).await,
        Commands::ReleaseNotes(args) => {
            let backend = match cli.temperature {
                Some(_) => backend,
                None => backend.with_temperature(RELEASE_NOTES_TEMPERATURE),
            };
            run_release_notes(backend, args).await
        }
    }
}

async fn run_strings(backend: OpenAiBackend, args: StringsArgs) -> Result<()> {
    if args.out_file.is_some() && args.files.len() > 1 {
        bail!("--out-file can only be used with a single --file");
    }

    let state = if args.needs_review {
        UnitState::NeedsReview
    } else {
        UnitState::Translated
    };
    let mut catalogs = args
        .files
        .iter()
        .map(|path| {
            let catalog = StringCatalog::load(path)?.with_state(state);
            Ok::<_, anyhow::Error>(match &args.out_file {
                Some(out_file) => catalog.with_output(out_file),
                None => catalog,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut translator = BatchTranslator::new(backend, TiktokenEstimator::new()?);
    let description = args.app_description.as_deref();
    let result = localize(
        &mut translator,
        &mut catalogs,
        &args.localize_from,
        &args.localize_to,
        |language, shape| build_strings_prompt(language, description, shape),
    )
    .await;

    println!("Tokens spent {}", translator.usage());
    print_outcomes(&result?);
    println!("Done");
    Ok(())
}

async fn run_metadata(backend: OpenAiBackend, args: MetadataArgs) -> Result<()> {
    let Some(first_source) = args.localize_from.first().cloned() else {
        bail!("--localize-from needs at least one language");
    };

    let mut stores = vec![MetadataDir::new(&args.metadata_dir, args.fields.clone())];
    let mut translator = BatchTranslator::new(backend, TiktokenEstimator::new()?);
    let app_name = args.force_app_name.as_deref();
    let result = localize(
        &mut translator,
        &mut stores,
        &args.localize_from,
        &args.localize_to,
        |language, _| build_metadata_prompt(language, app_name),
    )
    .await;
    if result.is_err() {
        println!("Tokens spent {}", translator.usage());
    }
    let outcomes = result?;

    for target in args
        .localize_to
        .iter()
        .filter(|target| !args.localize_from.contains(*target))
    {
        let copied = stores[0].copy_fields(&args.copy_fields, &first_source, target)?;
        if copied > 0 {
            info!("{}: copied {} fields from {}", target, copied, first_source);
        }
    }

    println!("Tokens spent {}", translator.usage());
    print_outcomes(&outcomes);

    let exceeded = stores[0].exceeded();
    if !exceeded.is_empty() {
        println!("\nWhile translating, some of the fields below exceeded their boundaries!\n");
        for field in exceeded {
            println!("{}", field);
        }
    }
    println!("Done");
    Ok(())
}

async fn run_release_notes(backend: OpenAiBackend, args: ReleaseNotesArgs) -> Result<()> {
    let notes = match &args.notes_file {
        Some(path) => release_notes::read_notes_file(path)?,
        None => {
            println!("\nWrite Release Notes until 'END': ");
            release_notes::read_until_end(std::io::stdin().lock())?
        }
    };
    if notes.is_empty() {
        bail!("Release notes are empty");
    }

    let job = release_notes::build_job(&notes, &args.localize_from, &args.localize_to);
    let mut translator = BatchTranslator::new(backend, TiktokenEstimator::new()?);
    let result = translator.run(&build_release_notes_prompt(), &job).await;
    if result.is_err() {
        println!("Tokens spent {}", translator.usage());
    }
    let report = result.context("Failed to translate release notes")?;

    let preview = serde_json::to_string_pretty(&report.translations)
        .context("Failed to format release notes")?;
    println!("Release notes:\n{}\n", preview);

    let mut store = MetadataDir::new(&args.metadata_dir, vec![RELEASE_NOTES_FIELD.to_string()]);
    let written = store.apply(&report.translations.updates())?;
    store.flush()?;
    info!("Wrote {} release notes to {}", written, store.root().display());

    for inconsistency in &report.inconsistencies {
        warn!("Ignored backend output: {}", inconsistency);
    }
    for missing in &report.missing {
        warn!("No release notes for {}", missing.language);
    }
    for field in store.exceeded() {
        warn!("{}", field);
    }

    println!("Tokens spent {}", translator.usage());
    println!("Done!");
    Ok(())
}

fn print_outcomes(outcomes: &[LanguageOutcome]) {
    for outcome in outcomes.iter().filter(|outcome| !outcome.is_clean()) {
        println!(
            "{}: {} missing, {} ignored, {} placeholder issues, {} URL warnings",
            outcome.language,
            outcome.missing.len(),
            outcome.inconsistencies.len(),
            outcome.placeholder_issues.len(),
            outcome.url_warnings.len()
        );
    }
}
