//! finscrape command-line interface.
//!
//! Usage:
//!   finscrape scrape <URL> [--format json|html|summary|stats] [--method auto|fast|browser]
//!   finscrape scrape <URL> --return-content [--mode full|stats]
//!   finscrape compare <URL> --iterations 3 --save
//!   finscrape symbol AAPL --sites morningstar,yahoo
//!   finscrape dividends AAPL
//!   finscrape quote AAPL --days 90
//!   finscrape serve --port 8000
//!   finscrape sites

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use finscrape::output::{self, ContentEnvelope, ContentMode, OutputFormat};
use finscrape::quality::Assessment;
use finscrape::sites::{self, PROFILE_NAMES, Task};
use finscrape::survey::{self, DEFAULT_SITES};
use finscrape::{FetchMode, Settings, SmartScraper, build_report, quote, server};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape stock prices and dividend data from financial websites", long_about = None)]
struct Cli {
    /// TOML config file (defaults to ./finscrape.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape one URL, fast request first with browser fallback
    Scrape {
        url: String,
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
        #[arg(short, long, value_enum, default_value_t = FetchMode::Auto)]
        method: FetchMode,
        /// Print a JSON envelope between marker lines instead of saving files
        #[arg(long, default_value_t = false)]
        return_content: bool,
        /// Envelope content with --return-content
        #[arg(long, value_enum, default_value_t = ContentMode::Stats)]
        mode: ContentMode,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Repeat a smart scrape and compare the methods used
    Compare {
        url: String,
        #[arg(short = 'n', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        iterations: u32,
        /// Save the benchmark as JSON
        #[arg(long, default_value_t = false)]
        save: bool,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Scrape one symbol on several sites
    Symbol {
        symbol: String,
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_SITES.map(String::from))]
        sites: Vec<String>,
        /// Scrape a canned task's URLs instead of --sites
        #[arg(long, value_enum)]
        task: Option<Task>,
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Combined dividend data from Morningstar and Yahoo Finance
    Dividends {
        symbol: String,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Quote history and dividends from the Yahoo Finance API
    Quote {
        symbol: String,
        #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..=36500))]
        days: i64,
    },
    /// Run the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// List site profiles and example URLs
    Sites,
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn default_format(settings: &Settings, format: Option<OutputFormat>) -> OutputFormat {
    format
        .or_else(|| OutputFormat::parse(&settings.output.format))
        .unwrap_or_default()
}

fn describe(assessment: &Assessment) -> String {
    format!(
        "{}/{} ({})",
        assessment.score,
        Assessment::MAX_SCORE,
        assessment.grade.describe()
    )
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (settings, ignored) =
        Settings::discover(cli.config.as_deref()).context("loading configuration")?;
    let level = if cli.verbose { "debug" } else { settings.log_level.as_str() };
    init_tracing(level)?;
    for message in &ignored {
        warn!("{}", message);
    }

    match cli.command {
        Command::Scrape {
            url,
            format,
            method,
            return_content,
            mode,
            output_dir,
        } => {
            let dir = output_dir.unwrap_or_else(|| settings.output.directory.clone());
            let format = default_format(&settings, format);
            scrape(settings, &url, format, method, return_content, mode, dir).await
        }
        Command::Compare {
            url,
            iterations,
            save,
            output_dir,
        } => {
            let dir = output_dir.unwrap_or_else(|| settings.output.directory.clone());
            compare(settings, &url, iterations as usize, save.then_some(dir)).await
        }
        Command::Symbol {
            symbol,
            sites,
            task,
            format,
            output_dir,
        } => {
            let dir = output_dir.unwrap_or_else(|| settings.output.directory.clone());
            let format = default_format(&settings, format);
            let scraper = SmartScraper::from_settings(settings)?;
            let survey = match task {
                Some(task) => survey::scrape_task(&scraper, &symbol, task).await,
                None => survey::scrape_symbol(&scraper, &symbol, &sites).await,
            };

            let mut saved = 0;
            for result in &survey.results {
                match &result.report {
                    Some(report) => {
                        let path = output::save_report(report, format, &dir)?;
                        println!(
                            "{:<12} ok   {} tables, {} prices -> {}",
                            result.site,
                            report.tables.len(),
                            report.extracted.currency_amounts.len(),
                            path.display()
                        );
                        saved += 1;
                    }
                    None => println!(
                        "{:<12} FAIL {}",
                        result.site,
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            Ok(if saved > 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Dividends { symbol, output_dir } => {
            let dir = output_dir.unwrap_or_else(|| settings.output.directory.clone());
            let scraper = SmartScraper::from_settings(settings)?;
            let report = survey::dividend_summary(&scraper, &symbol).await;
            let filename = format!(
                "dividends_{}_{}.json",
                report.symbol,
                Local::now().format("%Y%m%d_%H%M%S")
            );
            let path = output::save_json(&report, &dir, &filename)?;

            let summary = &report.summary;
            println!("Dividend summary for {}", report.symbol);
            println!("  amounts:  {}", summary.total_dividend_amounts.join(", "));
            println!("  dates:    {}", summary.total_dividend_dates.join(", "));
            println!("  keywords: {}", summary.dividend_keywords.join(", "));
            println!("  financial tables: {}", summary.financial_tables.len());
            println!("Saved to {}", path.display());

            let any_success = report.results.iter().any(|r| r.report.is_some());
            Ok(if any_success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Quote { symbol, days } => {
            let history = quote::quote_history(&symbol, days)
                .await
                .with_context(|| format!("fetching quote history for {symbol}"))?;
            match quote::analyze(&history.symbol, &history.points) {
                Some(summary) => println!("{summary}"),
                None => println!("No historical data available for analysis"),
            }
            if history.dividends.is_empty() {
                println!("No dividends in the last {days} days");
            } else {
                println!("Dividends:");
                for dividend in &history.dividends {
                    println!("  {}  ${:.4}", dividend.date.format("%Y-%m-%d"), dividend.amount);
                }
            }
            let latest = quote::latest_quote(&symbol).await?;
            println!("Latest close: ${:.2}", latest.close);
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { port, host } => {
            let scraper = SmartScraper::from_settings(settings)?;
            server::run_server(scraper, &host, port)
                .await
                .context("running HTTP server")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sites => {
            println!("Site profiles:");
            for name in PROFILE_NAMES {
                let profile = sites::profile_by_name(name);
                println!(
                    "  {:<15} timeout {:>2}s, wait {:>2}s, delay {}s, {} selectors, {} keywords",
                    profile.name,
                    profile.timeout,
                    profile.wait_time,
                    profile.download_delay,
                    profile.table_selectors.len(),
                    profile.financial_keywords.len()
                );
            }
            println!("\nExample URLs:");
            println!("  {}", sites::morningstar_url("AAPL", "dividends"));
            println!("  {}", sites::yahoo_finance_url("AAPL", "quote"));
            println!("  {}", sites::marketwatch_url("AAPL", "quote"));
            println!("  {}", sites::google_finance_url("AAPL", "NASDAQ"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn scrape(
    settings: Settings,
    url: &str,
    format: OutputFormat,
    method: FetchMode,
    return_content: bool,
    mode: ContentMode,
    dir: PathBuf,
) -> Result<ExitCode> {
    let scraper = SmartScraper::from_settings(settings)?;
    let start = Instant::now();

    match scraper.run(url, method).await {
        Ok(outcome) => {
            if return_content {
                let envelope = ContentEnvelope::from_outcome(&outcome, mode, true);
                println!("{}", envelope.to_marked_string()?);
                return Ok(ExitCode::SUCCESS);
            }

            let report = build_report(&outcome);
            let path = output::save_report(&report, format, &dir)?;
            println!("SUCCESS: {url}");
            println!("  method:   {}", outcome.method);
            println!("  duration: {:.2}s", outcome.duration.as_secs_f64());
            println!("  content:  {} characters", outcome.page.html.len());
            println!("  tables:   {} ({} financial)", report.metadata.total_tables, report.metadata.financial_tables);
            println!("  score:    {}", describe(&report.assessment));
            println!("  saved:    {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Failed to scrape {}: {}", url, e);
            if return_content {
                let envelope = ContentEnvelope::failure(url, mode, start.elapsed(), &e.to_string());
                println!("{}", envelope.to_marked_string()?);
            } else {
                let path = output::save_error(url, &e.to_string(), &dir)?;
                println!("FAILED: {url}");
                println!("Error details saved to: {}", path.display());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn compare(
    settings: Settings,
    url: &str,
    iterations: usize,
    save_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    let scraper = SmartScraper::from_settings(settings)?;
    info!("Benchmarking {} over {} iterations", url, iterations);
    let bench = scraper.benchmark(url, iterations, Duration::from_secs(1)).await;

    println!("Benchmark: {url}");
    for run in &bench.runs {
        match (&run.method, &run.error) {
            (Some(method), _) => println!(
                "  #{:<3} {:<8} {:>7.2}s {:>10} chars",
                run.iteration, method, run.duration_seconds, run.content_length
            ),
            (None, error) => println!(
                "  #{:<3} FAILED   {}",
                run.iteration,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    for (method, stats) in &bench.methods {
        println!(
            "  {:<8} {} runs, avg {:.2}s, avg {:.0} chars",
            method, stats.runs, stats.avg_duration_seconds, stats.avg_content_length
        );
    }
    println!("  success rate: {:.0}%", bench.success_rate * 100.0);

    if let Some(dir) = save_dir {
        let filename = format!(
            "benchmark_{}_{}.json",
            output::url_domain(url),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = output::save_json(&bench, &dir, &filename)?;
        println!("Saved to {}", path.display());
    }

    Ok(if bench.success_rate > 0.0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
