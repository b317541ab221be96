//! One-shot scrape from the command line, printed as JSON on stdout.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use rust_scraper::compare::MethodComparator;
use rust_scraper::config::ServiceConfig;
use rust_scraper::fetch::FetchStrategies;
use rust_scraper::history::PriceHistoryStore;
use rust_scraper::options::ScrapeOptions;
use rust_scraper::ScrapeOrchestrator;

#[derive(Parser, Debug)]
#[command(name = "probe")]
#[command(about = "Scrape a single URL and print the extracted document", long_about = None)]
struct Args {
    /// Absolute http(s) URL to scrape
    url: String,

    /// Render with headless Chrome
    #[arg(long)]
    browser: bool,

    /// Render through a WebDriver session (needs --browser)
    #[arg(long)]
    selenium: bool,

    /// Run every strategy and print the comparison instead
    #[arg(long)]
    compare: bool,

    /// Cap on items per extracted field
    #[arg(long, default_value = "10")]
    max_results: usize,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ServiceConfig::from_env();
    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        FetchStrategies::live(&config),
        Arc::new(PriceHistoryStore::new(config.price_history_capacity)),
        config.retry.clone(),
    ));

    let output = if args.compare {
        let comparator = MethodComparator::new(orchestrator, config.comparison_timeout);
        let result = comparator
            .compare(&args.url)
            .await
            .context("method comparison failed")?;
        serde_json::to_value(result)?
    } else {
        let options = ScrapeOptions {
            use_browser: args.browser,
            use_selenium: args.selenium,
            max_results: args.max_results,
            ..ScrapeOptions::default()
        };
        let outcome = orchestrator
            .scrape(&args.url, &options)
            .await
            .with_context(|| format!("failed to scrape {}", args.url))?;
        serde_json::json!({
            "method": outcome.method_used,
            "data": outcome.document,
        })
    };

    if args.compact {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
