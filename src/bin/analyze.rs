//! Analyze binary entry point.
//!
//! Fetches works from OpenAlex (or loads a saved works file), builds the
//! corpus, prints bibliometric summaries, exports the paper table and
//! aggregate statistics, and optionally answers questions about the corpus.
//!
//! # Examples
//!
//! Fetch and summarize:
//! ```bash
//! analyze --keywords "generative ai" --start-year 2020 --end-year 2024
//! ```
//!
//! Ask a single question over a saved works file:
//! ```bash
//! analyze --input works.json --start-year 2018 --end-year 2024 --question "Which venues dominate?"
//! ```
//!
//! Interactive chat:
//! ```bash
//! analyze --keywords "graph neural networks" --include-conference --interactive
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use paper_insight::{
    chat::{ChatAnswer, ChatEngine, ChatError, Citation},
    config::{AppConfig, RetrievalBackend},
    embedding::{openai::OpenAIEmbedding, EmbeddingProvider, EmbeddingResult},
    export,
    generation::openai::OpenAiChatModel,
    models::{Role, SearchResult},
    provider::{json::JsonFileSource, openalex::OpenAlexSource, RecordSource},
    retrieval::{RetrievalError, RetrievalResult, Retriever},
    session::{Session, SessionError},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[cfg(feature = "fastembed")]
use paper_insight::embedding::fastembed::FastEmbedProvider;

/// Rows shown in each top-N table
const TOP_N: usize = 10;

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    #[cfg(feature = "fastembed")]
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            #[cfg(feature = "fastembed")]
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}

/// Stands in for an index that could not be built; every question goes
/// to the model ungrounded.
struct UnavailableIndex {
    reason: String,
}

#[async_trait::async_trait]
impl Retriever for UnavailableIndex {
    async fn retrieve(&self, _question: &str, _k: usize) -> RetrievalResult<Vec<SearchResult>> {
        Err(RetrievalError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Retrieval backend selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    /// BM25 over title, abstract and keywords
    Lexical,
    /// Embedding similarity
    Semantic,
}

impl From<BackendArg> for RetrievalBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Lexical => RetrievalBackend::Lexical,
            BackendArg::Semantic => RetrievalBackend::Semantic,
        }
    }
}

/// Analyze binary CLI
#[derive(Parser, Debug)]
#[command(
    name = "analyze",
    version,
    about = "Bibliometric analysis and question answering over OpenAlex works",
    long_about = "Fetch scholarly works from OpenAlex (or load a saved works file), summarize \
                  publication trends, countries, researchers and venues, export the results, \
                  and ask questions answered from the retrieved papers.

EXAMPLES:
  Fetch and summarize:
    analyze --keywords \"generative ai\" --start-year 2020 --end-year 2024

  Include conference papers and books:
    analyze --keywords \"federated learning\" --include-conference --include-books

  Single question over a saved works file:
    analyze --input works.json --question \"Which countries publish most?\"

  Interactive chat:
    analyze --keywords \"graph neural networks\" --interactive"
)]
struct Args {
    /// Search keywords (required unless --input is given)
    #[arg(long, value_name = "TEXT", required_unless_present = "input")]
    keywords: Option<String>,

    /// First publication year (inclusive)
    #[arg(long, value_name = "YEAR")]
    start_year: Option<i32>,

    /// Last publication year (inclusive)
    #[arg(long, value_name = "YEAR")]
    end_year: Option<i32>,

    /// Include conference papers
    #[arg(long)]
    include_conference: bool,

    /// Include books and book chapters
    #[arg(long)]
    include_books: bool,

    /// Load works from a JSON file instead of fetching
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of records to fetch
    #[arg(long, value_name = "N")]
    max_records: Option<usize>,

    /// Contact email for the OpenAlex polite pool
    #[arg(long, value_name = "EMAIL")]
    email: Option<String>,

    /// Directory for exported files
    #[arg(long, value_name = "DIR")]
    results_dir: Option<PathBuf>,

    /// Skip writing the CSV and JSON exports
    #[arg(long)]
    no_export: bool,

    /// Retrieval backend for questions
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Papers retrieved per question
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,

    /// Ask a single question and exit
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    question: Option<String>,

    /// Enable interactive chat mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory (only used with the fastembed feature)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Resolve the configuration file and apply command-line overrides.
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match AppConfig::default_path() {
            Ok(path) => AppConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            Err(e) => {
                warn!("{}; using defaults", e);
                AppConfig::default()
            }
        },
    };

    if let Some(start) = args.start_year {
        config.filter.start_year = start;
    }
    if let Some(end) = args.end_year {
        config.filter.end_year = end;
    }
    config.filter.include_conference |= args.include_conference;
    config.filter.include_books |= args.include_books;
    if let Some(n) = args.max_records {
        config.fetch.max_records = n;
    }
    if args.email.is_some() {
        config.fetch.email = args.email.clone();
    }
    if let Some(dir) = &args.results_dir {
        config.output.results_dir = dir.clone();
    }
    if let Some(backend) = args.backend {
        config.retrieval.backend = backend.into();
    }
    if let Some(k) = args.top_k {
        config.retrieval.top_k = k;
    }

    config.validate().with_context(|| "Invalid configuration")?;
    Ok(config)
}

/// Pick the record source from the arguments.
fn create_source(args: &Args, config: &AppConfig) -> Result<Box<dyn RecordSource>> {
    if let Some(path) = &args.input {
        if !path.exists() {
            anyhow::bail!("Input file not found: {}", path.display());
        }
        return Ok(Box::new(JsonFileSource::new(path)));
    }

    let keywords = args
        .keywords
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Either --keywords or --input must be specified"))?;
    let source = OpenAlexSource::new(keywords, config.filter.to_filter())
        .with_context(|| "Failed to configure OpenAlex source")?
        .with_base_url(config.fetch.base_url.clone())
        .with_per_page(config.fetch.per_page)
        .with_mailto(config.fetch.email.clone());
    Ok(Box::new(source))
}

fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} records")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Instantiate the embedding provider for the semantic backend
fn create_embedding_provider(config: &AppConfig, cache_dir: Option<PathBuf>) -> Result<DynamicEmbeddingProvider> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(api_key) => {
            info!("Using OpenAI-compatible embeddings");
            let provider = OpenAIEmbedding::new(api_key, config.retrieval.embedding_model.clone())
                .with_base_url(config.chat.base_url.clone());
            Ok(DynamicEmbeddingProvider::OpenAI(provider))
        }
        #[cfg(feature = "fastembed")]
        Err(_) => {
            info!("OPENAI_API_KEY not set, using local FastEmbed model");
            let provider =
                FastEmbedProvider::new(None, cache_dir).with_context(|| "Failed to create FastEmbed provider")?;
            Ok(DynamicEmbeddingProvider::FastEmbed(provider))
        }
        #[cfg(not(feature = "fastembed"))]
        Err(_) => {
            let _ = cache_dir;
            anyhow::bail!(
                "OPENAI_API_KEY environment variable required for semantic retrieval.\n\
                 Set it with: export OPENAI_API_KEY=your-api-key, or use --backend lexical"
            )
        }
    }
}

/// Build the configured retrieval index, degrading to ungrounded answers if it cannot be built.
async fn create_retriever(session: &Session, cache_dir: Option<PathBuf>) -> Result<Box<dyn Retriever>> {
    let built: RetrievalResult<Box<dyn Retriever>> = match session.config().retrieval.backend {
        RetrievalBackend::Lexical => session.lexical_index().map(|i| Box::new(i) as Box<dyn Retriever>),
        RetrievalBackend::Semantic => {
            let provider = create_embedding_provider(session.config(), cache_dir)?;
            session
                .semantic_index(provider)
                .await
                .map(|i| Box::new(i) as Box<dyn Retriever>)
        }
    };

    match built {
        Ok(retriever) => {
            info!("Retrieval index ready: {}", retriever.name());
            Ok(retriever)
        }
        Err(e) => {
            eprintln!("Warning: {}. Answers will not be grounded in the corpus.", e);
            Ok(Box::new(UnavailableIndex { reason: e.to_string() }))
        }
    }
}

fn create_model(config: &AppConfig) -> Result<OpenAiChatModel> {
    let api_key = std::env::var("OPENAI_API_KEY").ok();
    if api_key.is_none() {
        warn!("OPENAI_API_KEY not set; sending unauthenticated requests to {}", config.chat.base_url);
    }
    let model = OpenAiChatModel::new(
        api_key,
        Some(config.chat.model.clone()),
        Duration::from_secs(config.chat.timeout_secs),
    )
    .with_context(|| "Failed to create chat model client")?
    .with_base_url(config.chat.base_url.clone())
    .with_sampling(config.chat.temperature, config.chat.max_tokens);
    Ok(model)
}

/// Format a name/count list as a table
fn format_counts_table(label: &str, rows: &[(String, usize)]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new(label).add_attribute(Attribute::Bold),
        Cell::new("Papers").add_attribute(Attribute::Bold),
    ]);

    for (idx, (name, count)) in rows.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(name, 60)),
            Cell::new(count),
        ]);
    }

    table.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Print corpus summary and top-N tables
fn print_summary(session: &Session) {
    let stats = session.stats();
    let normalization = session.normalization();

    println!("\n{}", "═".repeat(80));
    println!("paper-insight {}", paper_insight::VERSION);
    println!(
        "Corpus: {} papers, {} citations ({} records processed, {} rejected, {} duplicates)",
        stats.total_papers,
        stats.total_citations,
        normalization.total_processed,
        normalization.total_rejected(),
        normalization.duplicates_skipped
    );
    if !normalization.unknown_country_codes.is_empty() {
        println!(
            "Unresolved country codes: {}",
            normalization
                .unknown_country_codes
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("{}", "═".repeat(80));

    let mut trend = Table::new();
    trend
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    trend.set_header(vec![
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Papers").add_attribute(Attribute::Bold),
    ]);
    for (year, count) in &stats.yearly_counts {
        trend.add_row(vec![Cell::new(year), Cell::new(count)]);
    }
    println!("\nPublication trend\n{}", trend);

    println!("\nTop countries\n{}", format_counts_table("Country", &stats.top_countries(TOP_N)));
    println!("\nTop researchers\n{}", format_counts_table("Author", &stats.top_authors(TOP_N)));
    println!("\nTop venues\n{}", format_counts_table("Venue", &stats.top_venues(TOP_N)));
}

/// Format cited papers as a table
fn format_citations_table(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return "No sources.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);
    for citation in citations {
        table.add_row(vec![
            Cell::new(citation.number).fg(Color::Cyan),
            Cell::new(truncate(&citation.title, 60)),
            Cell::new(citation.year),
            Cell::new(format!("{:.4}", citation.score)),
        ]);
    }
    table.to_string()
}

fn print_answer(answer: &ChatAnswer, elapsed: Duration) {
    println!("\n{}\n", answer.text);
    if answer.grounded {
        println!("{}", format_citations_table(&answer.citations));
    } else {
        println!("(Not grounded in the corpus: no matching papers were found.)");
    }
    println!("\nAnswered in {:.2}s", elapsed.as_secs_f64());
}

fn report_ask_error(e: &ChatError) {
    match e {
        ChatError::Generation(inner) if inner.is_retryable() => {
            eprintln!("Question failed: {}. Nothing was recorded; try again.", inner)
        }
        _ => eprintln!("Question failed: {}", e),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <question>  - Ask about the corpus");
    println!("  /sources    - Show the papers behind the last answer");
    println!("  /stats      - Show corpus summary tables");
    println!("  /history    - Show the conversation so far");
    println!("  /help       - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Run interactive chat mode
async fn run_interactive<R: Retriever, M: paper_insight::GenerativeModel>(
    session: &mut Session,
    engine: ChatEngine<R, M>,
) -> Result<()> {
    println!("Interactive Corpus Chat ({} papers)", session.corpus().len());
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_citations: Vec<Citation> = Vec::new();

    loop {
        match rl.readline("Ask> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    match line {
                        "/help" => print_help(),
                        "/sources" => println!("{}", format_citations_table(&last_citations)),
                        "/stats" => print_summary(session),
                        "/history" => {
                            if session.chat_history().is_empty() {
                                println!("No questions asked yet.");
                            }
                            for turn in session.chat_history().turns() {
                                let speaker = match turn.role {
                                    Role::User => "You",
                                    Role::Assistant => "Assistant",
                                };
                                println!("{}: {}\n", speaker, turn.text);
                            }
                        }
                        _ => eprintln!("Unknown command: {}. Type /help for available commands.", line),
                    }
                    continue;
                }

                let start = Instant::now();
                match session.ask(&engine, line).await {
                    Ok(answer) => {
                        print_answer(&answer, start.elapsed());
                        last_citations = answer.citations;
                    }
                    Err(e) => report_ask_error(&e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level);

    let config = load_config(&args)?;
    let source = create_source(&args, &config)?;

    info!(
        "Loading records from {} (years {}, limit {})",
        source.name(),
        config.filter.year_range(),
        config.fetch.max_records
    );

    let progress = create_progress_bar(config.fetch.max_records);
    let report = |count: usize| progress.set_position(count as u64);
    let loaded = Session::load(config, source.as_ref(), &report).await;
    progress.finish_and_clear();

    let mut session = match loaded {
        Ok(session) => session,
        Err(SessionError::EmptyCorpus { processed, rejected }) => {
            anyhow::bail!(
                "No papers found matching these parameters.\n\
                 {} records processed, {} rejected by the year/type filter.",
                processed,
                rejected
            );
        }
        Err(e) => return Err(e).with_context(|| "Failed to build corpus"),
    };

    print_summary(&session);

    if !args.no_export {
        let (csv_path, json_path) = export::export_all(
            &session.corpus(),
            session.stats(),
            &session.config().output.results_dir,
        )
        .with_context(|| "Failed to export results")?;
        println!("\nData saved to: {}", csv_path.display());
        println!("Statistics saved to: {}", json_path.display());
    }

    if args.question.is_none() && !args.interactive {
        return Ok(());
    }

    let retriever = create_retriever(&session, args.cache_dir.clone()).await?;
    let model = create_model(session.config())?;
    let engine = session.chat_engine(retriever, model);

    if let Some(question) = &args.question {
        let start = Instant::now();
        match session.ask(&engine, question).await {
            Ok(answer) => print_answer(&answer, start.elapsed()),
            Err(e) => {
                report_ask_error(&e);
                return Err(e).with_context(|| "Failed to answer question");
            }
        }
    } else {
        run_interactive(&mut session, engine).await?;
    }

    Ok(())
}
