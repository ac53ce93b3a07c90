// src/main.rs
mod utils;
mod trust;
mod archive;
mod extractors;
mod pipeline;
mod storage;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use extractors::pages::ExtractBudget;
use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, PipelineRequest};
use storage::StorageManager;
use trust::client::FetchConfig;
use utils::AppError;

/// Command Line Interface for the NHS board pack extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the NHS trust or ICB
    trust_name: String,

    /// Board-papers index page URL (as produced by the search step)
    #[arg(long)]
    index_url: Option<String>,

    /// Direct document URL, bypassing link discovery and ranking
    #[arg(long)]
    document_url: Option<String>,

    /// Path to an already-downloaded PDF or ZIP, bypassing the network
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Output directory for extracted text and metadata
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Save the raw downloaded file to this path
    #[arg(long)]
    save_raw: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Maximum pages extracted across all documents
    #[arg(long, default_value = "100")]
    page_budget: usize,

    /// Maximum characters extracted across all documents
    #[arg(long, default_value = "400000")]
    char_budget: usize,

    /// Pages scanned for the agenda at the front of each document
    #[arg(long, default_value = "6")]
    agenda_pages: u32,

    /// Debug mode - save the index HTML with candidate links annotated
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting board pack retrieval for: {}", args.trust_name);

    // 3. Initialize storage
    let storage = StorageManager::new(&args.output_dir)?;

    // 4. Build the pipeline from CLI configuration
    let config = PipelineConfig {
        fetch: FetchConfig {
            timeout: Duration::from_secs(args.timeout_secs),
            ..FetchConfig::default()
        },
        budget: ExtractBudget {
            agenda_pages: args.agenda_pages,
            page_budget: args.page_budget,
            char_budget: args.char_budget,
            ..ExtractBudget::default()
        },
    };
    let pipeline = Pipeline::new(config)?;

    let debug_html = args
        .debug
        .then(|| PathBuf::from(&args.output_dir).join("index_annotated.html"));

    let request = PipelineRequest {
        trust_name: args.trust_name.clone(),
        index_url: args.index_url,
        document_url: args.document_url,
        local_file: args.pdf,
        save_raw: args.save_raw,
        debug_html,
    };

    // 5. Run and render the outcome
    match pipeline.run(&request).await? {
        PipelineOutcome::Ready(input) => {
            tracing::info!(
                "Pipeline ready: {} page(s), {} characters from {}",
                input.pages.len(),
                input.character_count(),
                input.source_url
            );

            let text_path = storage.save_combined_text(&input)?;
            let map_path = storage.save_page_map(&input)?;

            println!(
                "Extracted {} page(s) ({} characters) from {}",
                input.pages.len(),
                input.character_count(),
                input.source_url
            );
            println!("  Text:     {}", text_path.display());
            println!("  Page map: {}", map_path.display());
            Ok(())
        }
        PipelineOutcome::ManualUploadRequired { reason } => {
            eprintln!("Automated retrieval failed: {reason}");
            eprintln!();
            eprintln!("This site appears to block automated downloads. Download the");
            eprintln!("board pack in a browser and re-run with --pdf <path> to process");
            eprintln!("the saved file directly.");
            std::process::exit(2);
        }
    }
}
