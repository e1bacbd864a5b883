//! Job matcher: rank job postings against a resume by embedding similarity

use clap::Parser;
use job_matcher::cli::{self, CacheAction, Cli, Commands, ConfigAction};
use job_matcher::config::Config;
use job_matcher::error::{JobMatcherError, Result};
use job_matcher::input::postings::{load_job_postings, postings_to_records};
use job_matcher::input::{ResumeLoader, TextRecord};
use job_matcher::output::formatter::suggest_filename;
use job_matcher::output::{formatter_for, save_csv_companion, save_report, MatchDocument, OutputFormat};
use job_matcher::processing::embeddings::{Model2VecProvider, SharedProvider};
use job_matcher::processing::engine::{EngineOptions, MatchEngine, MatchReport};
use job_matcher::processing::vector_store::{VectorCache, VectorStore};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    if let Err(e) = run_command(cli.command, config, cli.config).await {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_command(command: Commands, mut config: Config, config_file: Option<PathBuf>) -> Result<()> {
    match command {
        Commands::Match {
            jobs,
            resume,
            model,
            top_n,
            min_score,
            batch_size,
            concurrency,
            cache,
            no_cache,
            prune_cache,
            output,
            save,
            detailed,
        } => {
            cli::validate_file_extension(&resume, &["pdf", "txt", "md", "markdown"])
                .map_err(|e| JobMatcherError::invalid_input(resume.display().to_string(), e))?;
            cli::validate_file_extension(&jobs, &["json"])
                .map_err(|e| JobMatcherError::invalid_input(jobs.display().to_string(), e))?;
            let output_format = OutputFormat::parse(&output)?;

            // CLI flags override the config file for this run only
            if let Some(model) = model {
                config.embedding.model = model;
            }
            if let Some(top_n) = top_n {
                config.ranking.top_n = top_n;
            }
            if let Some(min_score) = min_score {
                config.ranking.min_score = min_score;
            }
            if let Some(batch_size) = batch_size {
                config.embedding.batch_size = batch_size;
            }
            if let Some(concurrency) = concurrency {
                config.embedding.concurrency_limit = concurrency;
            }
            if let Some(cache) = cache {
                config.cache.path = cache;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            if prune_cache {
                config.cache.prune = true;
            }
            config.validate()?;

            info!("Starting job matching for resume {}", resume.display());

            let postings = load_job_postings(&jobs).await?;
            let job_records = postings_to_records(&postings, config.input.max_description_chars);
            let resume_record = ResumeLoader::new(config.input.max_resume_chars)?
                .load(&resume)
                .await?;

            let provider = load_provider(&config).await?;
            let options = EngineOptions::from(&config);

            let report = if config.cache.enabled {
                VectorStore::scoped(&config.cache.path, |store| {
                    run_match(store, provider, options, &resume_record, &job_records)
                })
                .await?
            } else {
                info!("Vector cache disabled for this run");
                run_match(Arc::new(VectorStore::default()), provider, options, &resume_record, &job_records).await?
            };

            let document = MatchDocument::build(&report, &resume_record, &job_records);
            let formatter = formatter_for(output_format, save.is_none(), detailed);
            let rendered = formatter.format_report(&document)?;

            match save {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(suggest_filename(output_format, &resume_record.id))
                    } else {
                        path
                    };
                    save_report(&rendered, &path)?;
                    println!("Report saved to {}", path.display());
                    if output_format == OutputFormat::Json {
                        let csv_path = save_csv_companion(&document, &path)?;
                        println!("Also saved as {}", csv_path.display());
                    }
                }
                None => println!("{}", rendered),
            }
        }

        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                let content = toml::to_string_pretty(&config)
                    .map_err(|e| JobMatcherError::Configuration(format!("Failed to serialize config: {}", e)))?;
                let path = config_file.unwrap_or_else(Config::config_path);
                println!("# {}\n{}", path.display(), content);
            }

            Some(ConfigAction::Reset) => {
                let path = config_file.unwrap_or_else(Config::config_path);
                Config::default().save_to(&path)?;
                println!("Configuration reset to defaults at {}", path.display());
            }
        },

        Commands::Cache { action } => match action {
            CacheAction::Stats { cache } => {
                let path = cache.unwrap_or(config.cache.path);
                let cache = load_cache(&path).await?;
                println!("Vector cache: {}", path.display());
                println!("Entries: {}", cache.len());
                for (model_id, count) in cache.models() {
                    println!("  {}: {}", model_id, count);
                }
            }

            CacheAction::Clear { cache } => {
                let path = cache.unwrap_or(config.cache.path);
                let store = VectorStore::open(&path).await?;
                let removed = store.len();
                store.clear();
                store.persist(&path).await?;
                println!("Removed {} cached vectors from {}", removed, path.display());
            }
        },
    }

    Ok(())
}

/// Model loading is blocking file and network I/O.
async fn load_provider(config: &Config) -> Result<SharedProvider> {
    let embedding = config.embedding.clone();
    let provider = tokio::task::spawn_blocking(move || Model2VecProvider::from_config(&embedding))
        .await
        .map_err(|e| JobMatcherError::ModelLoading(format!("model loading task failed: {}", e)))??;
    Ok(Arc::new(provider))
}

async fn load_cache(path: &Path) -> Result<VectorCache> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || VectorCache::load(&path))
        .await
        .map_err(|e| JobMatcherError::Processing(format!("cache load task failed: {}", e)))?
}

async fn run_match(
    store: Arc<VectorStore>,
    provider: SharedProvider,
    options: EngineOptions,
    resume: &TextRecord,
    jobs: &[TextRecord],
) -> Result<MatchReport> {
    let engine = MatchEngine::new(provider, store, options)?;
    engine.run(resume, jobs).await
}
