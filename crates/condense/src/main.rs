//! Check a saved conversation against its context budget and compact it.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Show usage, the trigger decision, and what would be compacted
//! condense --session chat.json --dry-run
//!
//! # Compact in place against a 32k window
//! condense --session chat.json --max-tokens 32000 --reserved-output-tokens 2048
//!
//! # Write the result elsewhere and print the compaction history
//! condense --session chat.json --out compacted.json --ledger
//!
//! # Settings from a JSON file, one flag overridden
//! condense --session chat.json --config condense.json --keep-recent 6
//! ```

use clap::Parser;
use condense::context::{
    BudgetParams, Ledger, OpenRouterSummarizer, SkipReason, WindowSelector, accountant,
};
use condense::session::{EngineConfig, SessionState};
use condense::{Message, OpenRouterClient};
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Check a saved conversation against its context budget and compact it.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "condense")]
struct Cli {
    /// Session file: `{"messages": [...], "ledger": [...]}` or a bare message array
    #[arg(long)]
    session: PathBuf,

    /// JSON engine configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    // ── Budget ─────────────────────────────────────────────────
    /// Model context window in tokens
    #[arg(long)]
    max_tokens: Option<u64>,

    /// Tokens reserved for the model's next response
    #[arg(long)]
    reserved_output_tokens: Option<u64>,

    /// Fraction of the available window that triggers compaction (0, 1]
    #[arg(long)]
    threshold: Option<f64>,

    // ── Selection and summarization ────────────────────────────
    /// Most recent messages kept verbatim
    #[arg(long)]
    keep_recent: Option<usize>,

    /// Model used for the summary
    #[arg(long)]
    model: Option<String>,

    /// Seconds before a summarizer call is abandoned
    #[arg(long)]
    timeout_secs: Option<u64>,

    // ── Output ─────────────────────────────────────────────────
    /// Report what would happen without calling the summarizer
    #[arg(long)]
    dry_run: bool,

    /// Write the compacted session here instead of in place
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the compaction history
    #[arg(long)]
    ledger: bool,
}

fn engine_config(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(v) = cli.max_tokens {
        config = config.with_max_tokens(v);
    }
    if let Some(v) = cli.reserved_output_tokens {
        config = config.with_reserved_output_tokens(v);
    }
    if let Some(v) = cli.threshold {
        config = config.with_threshold_ratio(v);
    }
    if let Some(v) = cli.keep_recent {
        config = config.with_keep_recent(v);
    }
    if let Some(v) = &cli.model {
        config = config.with_model(v);
    }
    if let Some(v) = cli.timeout_secs {
        config = config.with_timeout_secs(v);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn print_usage(messages: &[Message], params: &BudgetParams) -> Result<(), String> {
    let count = accountant::measure(messages);
    let usage = condense::context::ContextUsage::measure(count.tokens, params)
        .map_err(|e| e.to_string())?;
    println!(
        "{} message(s), {} ({:?})",
        messages.len(),
        usage.to_log_string(),
        count.source
    );
    println!(
        "trigger at {} tokens: {}",
        params.trigger_tokens().map_err(|e| e.to_string())?,
        if usage.needs_compaction {
            "compaction needed"
        } else {
            "under threshold"
        }
    );
    Ok(())
}

fn print_partition(messages: &[Message], keep_recent: usize) {
    let partition = WindowSelector::new(keep_recent).partition(messages);
    if partition.is_noop() {
        println!("partition: nothing to compact");
        return;
    }
    println!(
        "partition: compact {:?}, retain {:?} (tail from {})",
        partition.compact, partition.retain, partition.tail_start
    );
}

fn print_ledger(ledger: &Ledger) {
    if ledger.is_empty() {
        println!("ledger: no compactions recorded");
        return;
    }
    println!(
        "{:<25} {:>10} {:>10} {:>8} {:>8} {:>8}",
        "timestamp", "before", "after", "saved%", "removed", "kept"
    );
    for record in ledger {
        println!(
            "{:<25} {:>10} {:>10} {:>7.1}% {:>8} {:>8}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            record.tokens_before,
            record.tokens_after,
            record.reduction_pct(),
            record.messages_removed_count,
            record.messages_kept_count,
        );
    }
    println!("total saved: {} tokens", ledger.total_saved_tokens());
}

async fn run(cli: &Cli) -> Result<(), String> {
    let config = engine_config(cli)?;
    let params = config.budget();
    let state = SessionState::load(&cli.session).map_err(|e| e.to_string())?;

    print_usage(&state.messages, &params)?;

    if cli.dry_run {
        print_partition(&state.messages, config.keep_recent);
        if cli.ledger {
            print_ledger(&state.ledger);
        }
        return Ok(());
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key)?;
    let summarizer = OpenRouterSummarizer::with_config(client, config.summarizer_config());
    let compactor = config.compactor(summarizer);

    let (state, report) = state
        .compact(&compactor, &params)
        .await
        .map_err(|e| e.to_string())?;

    match (&report.record, &report.skipped) {
        (Some(record), _) => {
            let out = cli.out.as_ref().unwrap_or(&cli.session);
            state.save(out).map_err(|e| e.to_string())?;
            println!("compacted: {}", record.to_log_string());
            println!("wrote {}", out.display());
        }
        (None, Some(SkipReason::SummarizerFailed(e))) => {
            warn!("Summarizer failed: {e}");
            println!("not compacted: summarizer failed ({e}); session left untouched");
        }
        (None, Some(SkipReason::NothingToCompact)) => {
            println!("not compacted: nothing outside the retained window");
        }
        (None, _) => println!("not compacted: under threshold"),
    }

    if cli.ledger {
        print_ledger(&state.ledger);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
