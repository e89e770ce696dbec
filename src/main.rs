use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use rag_knowledge_base::api::{self, KnowledgeApiState, RagState};
use rag_knowledge_base::config::Config;
use rag_knowledge_base::ingest::{self, files, word, IngestReport};
use rag_knowledge_base::knowledge::KnowledgeBase;
use rag_knowledge_base::logging::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Retrieval-augmented knowledge base", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the knowledge API
    Serve,

    /// Run the question API over the Word document knowledge base
    ServeRag,

    /// Build a knowledge base from local text and Word files
    IngestFiles {
        /// Files or directories; defaults to DOCS_PATH
        paths: Vec<PathBuf>,

        #[arg(short, long, default_value = files::DEFAULT_SAVE_PATH)]
        save_path: PathBuf,

        /// Skip the question prompt after building
        #[arg(long)]
        no_interactive: bool,
    },

    /// Build a knowledge base from one Word document
    IngestWord {
        /// Defaults to WORD_DOC_PATH
        #[arg(short, long)]
        doc_path: Option<PathBuf>,

        #[arg(short, long, default_value = word::DEFAULT_SAVE_PATH)]
        save_path: PathBuf,

        #[arg(long)]
        no_interactive: bool,
    },

    /// Build a knowledge base from Feishu cloud documents
    IngestFeishu {
        #[arg(short, long, default_value = ingest::feishu::DEFAULT_SAVE_PATH)]
        save_path: PathBuf,

        #[arg(long)]
        no_interactive: bool,
    },
}

fn knowledge_base(config: &Config) -> Result<KnowledgeBase> {
    KnowledgeBase::from_config(config).context("Failed to initialize the knowledge base")
}

fn log_report(report: &IngestReport) {
    match &report.saved_to {
        Some(path) => info!(
            documents = report.documents,
            chunks = report.chunks,
            path = %path.display(),
            "Knowledge base built and saved"
        ),
        None => info!(
            documents = report.documents,
            chunks = report.chunks,
            "Knowledge base built"
        ),
    }
}

async fn question_loop(kb: &KnowledgeBase, config: &Config, interactive: bool) -> Result<()> {
    if interactive {
        ingest::run_read_loop(
            kb,
            &config.ingest.welcome_message,
            io::stdin().lock(),
            io::stdout(),
        )
        .await?;
    }
    Ok(())
}

async fn serve(config: &Config) -> Result<()> {
    let kb = knowledge_base(config)?;
    let state = KnowledgeApiState {
        kb: Arc::new(kb),
        word_doc_path: config.ingest.word_doc_path.clone(),
    };
    api::serve(api::knowledge_api::router(state), config.server.api_port)
        .await
        .context("Knowledge API server failed")
}

async fn serve_rag(config: &Config) -> Result<()> {
    let factory_config = config.clone();
    let state = Arc::new(RagState::new(
        Arc::new(move || KnowledgeBase::from_config(&factory_config)),
        config.ingest.word_doc_path.clone(),
        config.server.knowledge_base_path.clone(),
        config.model.kind,
    ));
    state.initialize().await;

    api::serve(api::rag_api::router(state), config.server.rag_port)
        .await
        .context("Question API server failed")
}

async fn ingest_files(
    config: &Config,
    paths: &[PathBuf],
    save_path: &Path,
    interactive: bool,
) -> Result<()> {
    if paths.is_empty() {
        files::ensure_sample_document(&config.ingest.docs_path)?;
    }
    let paths = files::resolve_paths(paths, &config.ingest.docs_path);

    let kb = knowledge_base(config)?;
    let report = files::ingest_files(&kb, &paths, save_path)
        .await
        .context("Failed to create the knowledge base")?;
    log_report(&report);

    question_loop(&kb, config, interactive).await
}

async fn ingest_word(
    config: &Config,
    doc_path: Option<&Path>,
    save_path: &Path,
    interactive: bool,
) -> Result<()> {
    let doc_path = word::resolve_word_path(doc_path, config.ingest.word_doc_path.as_deref())?;

    let kb = knowledge_base(config)?;
    let report = word::build_from_word(&kb, &doc_path, save_path)
        .await
        .context("Failed to create the knowledge base from the Word document")?;
    log_report(&report);

    question_loop(&kb, config, interactive).await
}

async fn ingest_feishu(config: &Config, save_path: &Path, interactive: bool) -> Result<()> {
    let kb = knowledge_base(config)?;
    let report = ingest::feishu::ingest_feishu(&kb, &config.feishu, save_path)
        .await
        .context("Failed to create the knowledge base from Feishu")?;
    log_report(&report);

    question_loop(&kb, config, interactive).await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    init_logging(&config.logging);

    let args = Args::parse();
    info!(model_type = %config.model.kind, "Starting");

    match args.command {
        Command::Serve => serve(&config).await,
        Command::ServeRag => serve_rag(&config).await,
        Command::IngestFiles {
            paths,
            save_path,
            no_interactive,
        } => ingest_files(&config, &paths, &save_path, !no_interactive).await,
        Command::IngestWord {
            doc_path,
            save_path,
            no_interactive,
        } => ingest_word(&config, doc_path.as_deref(), &save_path, !no_interactive).await,
        Command::IngestFeishu {
            save_path,
            no_interactive,
        } => ingest_feishu(&config, &save_path, !no_interactive).await,
    }
}
