use clap::{Parser, Subcommand};
use docs_rag::Result;
use docs_rag::commands::{ask, list_documents, search, serve_mcp, upload_files};
use docs_rag::config::{run_interactive_config, show_config};
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Question answering over your own documents, with an MCP server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection, chunking and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Copy text, markdown or PDF files into the upload directory
    Upload {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List uploaded documents
    Documents,
    /// Index the uploads and print the chunks nearest to a query
    Search {
        query: String,
        /// Number of results (defaults to the configured top_k)
        #[arg(long, short)]
        limit: Option<NonZeroUsize>,
    },
    /// Index the uploads and answer a question from them
    Ask { query: String },
    /// Start MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Upload { paths } => {
            upload_files(&paths)?;
        }
        Commands::Documents => {
            list_documents()?;
        }
        Commands::Search { query, limit } => {
            search(&query, limit.map(NonZeroUsize::get))?;
        }
        Commands::Ask { query } => {
            ask(&query)?;
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
    }

    Ok(())
}
