//! `archilawyer` - CLI for the building-regulation assistant
//!
//! This binary asks questions against the indexed regulations, ingests new
//! documents, and manages the vector index and the local answer history.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{BufWriter, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::warn;

use archilawyer::cli::{
    AskCommand, Cli, Command, ConfigCommand, HistoryCommand, IndexCommand, IngestCommand,
    PreprocessCommand, SearchCommand, ABOUT,
};
use archilawyer::qa::{answer_direct, render_source, QaResponse};
use archilawyer::{
    init_logging, loader, AnswerMode, CompletionModel, Config, HistoryEntry, HistoryStore,
    IngestPipeline, OpenAiCompletion, OpenAiEmbedder, PineconeClient, QaChain, Retriever,
    VectorIndex,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Ask(cmd) => handle_ask(&config, cmd).await,
        Command::Search(cmd) => handle_search(&config, &cmd).await,
        Command::Ingest(cmd) => handle_ingest(config, &cmd).await,
        Command::Preprocess(cmd) => handle_preprocess(&config, &cmd).await,
        Command::Index(cmd) => handle_index(&config, cmd).await,
        Command::History(cmd) => handle_history(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
        Command::About => {
            println!("{ABOUT}");
            Ok(())
        }
    }
}

/// Retriever over the configured index.
async fn build_retriever(config: &Config, top_k: Option<usize>) -> anyhow::Result<Retriever> {
    let embedder = OpenAiEmbedder::from_config(config)?;
    let index = PineconeClient::from_config(config)?
        .index(&config.pinecone.index_name)
        .await?;

    let retriever = Retriever::new(
        Arc::new(embedder),
        Arc::new(index),
        config.retrieval.top_k,
        config.retrieval.text_key.clone(),
    );
    Ok(match top_k {
        Some(k) => retriever.with_top_k(k),
        None => retriever,
    })
}

fn read_question(question: Option<String>) -> anyhow::Result<String> {
    let question = match question {
        Some(q) => q,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read question from stdin")?;
            input
        }
    };

    if question.trim().is_empty() {
        bail!("Please enter a question.");
    }
    Ok(question)
}

async fn handle_ask(config: &Config, cmd: AskCommand) -> anyhow::Result<()> {
    let question = read_question(cmd.question)?;
    let model = OpenAiCompletion::from_config(config)?;
    let model_name = model.name().to_string();

    let (response, mode) = if cmd.direct {
        (answer_direct(&model, &question).await?, AnswerMode::Direct)
    } else {
        let chain = QaChain::new(build_retriever(config, cmd.top_k).await?, Arc::new(model));
        (chain.ask(&question).await?, AnswerMode::Retrieval)
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_answer(&response, mode);
    }

    if config.history.enabled && !cmd.no_history {
        if let Err(e) = record_answer(config, &response, mode, &model_name) {
            warn!("Failed to record answer in history: {e}");
        }
    }
    Ok(())
}

fn print_answer(response: &QaResponse, mode: AnswerMode) {
    println!("Answer: {}", response.answer);
    if mode == AnswerMode::Retrieval {
        match response.sources.as_deref() {
            Some(sources) => println!("Source: {}", render_source(Some(sources))),
            None => println!("{}", render_source(None)),
        }
    }
}

fn record_answer(
    config: &Config,
    response: &QaResponse,
    mode: AnswerMode,
    model: &str,
) -> archilawyer::Result<()> {
    let store = HistoryStore::open(config.history_database_path())?;
    store.insert(&HistoryEntry::from_response(response, mode, Some(model)))?;
    store.apply_retention(&config.history)?;
    Ok(())
}

async fn handle_search(config: &Config, cmd: &SearchCommand) -> anyhow::Result<()> {
    let retriever = build_retriever(config, cmd.top_k).await?;
    let passages = retriever.retrieve(&cmd.query).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&passages)?);
        return Ok(());
    }

    if passages.is_empty() {
        println!("No passages found.");
    }
    for (rank, passage) in passages.iter().enumerate() {
        println!(
            "[{}] score {:.4}  {}",
            rank + 1,
            passage.score,
            render_source(passage.source.as_deref())
        );
        println!("{}", passage.content.trim());
        println!();
    }
    Ok(())
}

async fn handle_ingest(mut config: Config, cmd: &IngestCommand) -> anyhow::Result<()> {
    if let Some(size) = cmd.chunk_size {
        config.ingest.chunk_size = size;
    }
    if let Some(overlap) = cmd.chunk_overlap {
        config.ingest.chunk_overlap = overlap;
    }
    config.validate()?;

    let pipeline = IngestPipeline::new(&config)?;
    let report = if cmd.dry_run {
        pipeline.dry_run(&cmd.pdf, cmd.profile).await?
    } else {
        let embedder = OpenAiEmbedder::from_config(&config)?;
        let client = PineconeClient::from_config(&config)?;
        pipeline
            .run(&cmd.pdf, cmd.profile, cmd.recreate, &embedder, &client)
            .await?
    };

    println!("Source:     {}", report.source);
    println!("Pages:      {}", report.pages);
    println!("Documents:  {}", report.documents);
    println!("Chunks:     {}", report.chunks);
    if report.dry_run {
        println!("Dry run; nothing was written to {}.", report.index);
    } else {
        println!("Upserted:   {} vectors into {}", report.upserted, report.index);
    }
    Ok(())
}

async fn handle_preprocess(config: &Config, cmd: &PreprocessCommand) -> anyhow::Result<()> {
    let pages = loader::load(&cmd.pdf).await?;
    let documents = cmd.profile.apply(pages, &config.preprocess)?;

    let mut out: Box<dyn Write> = match &cmd.output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    for document in &documents {
        serde_json::to_writer(&mut out, document)?;
        writeln!(out)?;
    }
    out.flush()?;

    if let Some(path) = &cmd.output {
        eprintln!("Wrote {} documents to {}", documents.len(), path.display());
    }
    Ok(())
}

async fn handle_index(config: &Config, cmd: IndexCommand) -> anyhow::Result<()> {
    let client = PineconeClient::from_config(config)?;
    let default_name = || config.pinecone.index_name.clone();

    match cmd {
        IndexCommand::List { json } => {
            let indexes = client.list_indexes().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&indexes)?);
            } else if indexes.is_empty() {
                println!("No indexes.");
            } else {
                for index in indexes {
                    println!(
                        "{:<32} {:>6} {:<10} {}",
                        index.name, index.dimension, index.metric, index.state
                    );
                }
            }
        }
        IndexCommand::Describe { name } => {
            let description = client
                .describe_index(&name.unwrap_or_else(default_name))
                .await?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        IndexCommand::Stats { name } => {
            let stats = client
                .index(&name.unwrap_or_else(default_name))
                .await?
                .stats()
                .await?;
            println!("Dimension:  {}", stats.dimension);
            println!("Vectors:    {}", stats.total_vector_count);
            println!("Fullness:   {:.2}%", stats.index_fullness * 100.0);
        }
        IndexCommand::Create { name } => {
            let name = name.unwrap_or_else(default_name);
            client.create_index(&name).await?;
            let description = client.wait_until_ready(&name).await?;
            println!("Index {} is ready at {}", description.name, description.host);
        }
        IndexCommand::Delete { name, yes } => {
            if yes {
                client.delete_index(&name).await?;
                println!("Deleted index {name}.");
            } else {
                println!("This will delete index {name} and every vector in it.");
                println!("Use --yes to confirm.");
            }
        }
    }
    Ok(())
}

fn print_entries(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No answers recorded.");
    }
    for entry in entries {
        println!(
            "#{} {} ({})",
            entry.id.unwrap_or_default(),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.mode
        );
        println!("Q: {}", entry.question);
        println!("A: {}", entry.answer);
        if entry.mode == AnswerMode::Retrieval {
            println!("Source: {}", render_source(entry.sources.as_deref()));
        }
        println!();
    }
}

fn handle_history(config: &Config, cmd: HistoryCommand) -> anyhow::Result<()> {
    let store = HistoryStore::open(config.history_database_path())?;

    match cmd {
        HistoryCommand::List { last, json } => {
            let entries = store.get_recent(last)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_entries(&entries);
            }
        }
        HistoryCommand::Search { query, limit } => {
            print_entries(&store.search(&query, limit)?);
        }
        HistoryCommand::Stats => {
            let stats = store.stats()?;
            let show = |ts: Option<chrono::DateTime<chrono::Utc>>| {
                ts.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            };
            println!("Database:   {}", store.path().display());
            println!("Answers:    {}", stats.total_entries);
            println!("Oldest:     {}", show(stats.oldest_entry));
            println!("Newest:     {}", show(stats.newest_entry));
            println!("Size:       {} bytes", stats.db_size_bytes);
        }
        HistoryCommand::Prune => {
            let pruned = store.apply_retention(&config.history)?;
            println!("Pruned {pruned} answers.");
        }
        HistoryCommand::Clear { yes } => {
            if yes {
                let cleared = store.clear()?;
                println!("Deleted {cleared} answers.");
            } else {
                println!("This will delete every recorded answer.");
                println!("Use --yes to confirm.");
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.redacted()?)?);
            } else {
                let redact = |key: Option<&archilawyer::config::Secret>| {
                    key.map_or_else(|| "(not set)".to_string(), |k| k.redacted())
                };

                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[OpenAI]");
                println!("  API key:            {}", redact(config.openai.api_key.as_ref()));
                println!("  Base URL:           {}", config.openai.base_url);
                println!("  Embedding model:    {}", config.openai.embedding_model);
                println!("  Completion model:   {}", config.openai.completion_model);
                println!("  Temperature:        {}", config.openai.temperature);
                println!();
                println!("[Pinecone]");
                println!("  API key:            {}", redact(config.pinecone.api_key.as_ref()));
                println!("  Index:              {}", config.pinecone.index_name);
                println!("  Dimension:          {}", config.pinecone.dimension);
                println!("  Metric:             {}", config.pinecone.metric);
                println!();
                println!("[Retrieval]");
                println!("  Top k:              {}", config.retrieval.top_k);
                println!("  Text key:           {}", config.retrieval.text_key);
                println!();
                println!("[Ingest]");
                println!("  Chunk size:         {}", config.ingest.chunk_size);
                println!("  Chunk overlap:      {}", config.ingest.chunk_overlap);
                println!();
                println!("[History]");
                println!("  Enabled:            {}", config.history.enabled);
                println!(
                    "  Database path:      {}",
                    config.history_database_path().display()
                );
                println!("  Max entries:        {}", config.history.max_entries);
                println!("  Max age (days):     {}", config.history.max_age_days);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(loaded) => {
                    println!("Configuration is valid.");
                    for name in loaded.missing_credentials() {
                        println!("  Missing credential: {name}");
                    }
                }
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
