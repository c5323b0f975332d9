use std::fmt::Display;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use futures::future;
use khrate::types::Source;
use khrate::utils::today;
use khrate::{RateScraper, Recipes, ScraperError, ScraperSettings};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "khrate")]
#[command(about = "Scrapes Cambodian exchange rates from government websites", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(long, global = true, help = "Path to the Chrome/Chromium executable")]
    chrome_path: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds to wait for each page to load and render"
    )]
    timeout: u64,

    #[arg(long, global = true, help = "JSON file overriding the extraction recipes")]
    recipes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// National Bank of Cambodia rate table and official rate for a date
    Nbc {
        #[arg(
            long,
            value_name = "YYYY-MM-DD",
            help = "Date to fetch rates for (defaults to today, UTC)",
            value_parser = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string()),
        )]
        date: Option<NaiveDate>,

        #[arg(short = 'o', long = "output", value_enum, default_value = "text", help = "Output format")]
        format: OutputFormat,
    },
    /// Monthly exchange rate announced by the National Social Security Fund
    Nssf {
        #[arg(short = 'o', long = "output", value_enum, default_value = "text", help = "Output format")]
        format: OutputFormat,
    },
    /// Current and historical rates from the General Department of Taxation
    Tax {
        #[arg(short = 'o', long = "output", value_enum, default_value = "text", help = "Output format")]
        format: OutputFormat,
    },
    /// Scrape all three sources concurrently
    All {
        #[arg(short = 'o', long = "output", value_enum, default_value = "text", help = "Output format")]
        format: OutputFormat,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn print<T: serde::Serialize + Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => serialize_json(value),
        OutputFormat::Text => println!("{}", value),
    }
}

/// Logs a failed scrape and keeps successful ones as JSON plus text.
fn summarize<T: serde::Serialize + Display>(
    source: Source,
    result: &Result<T, ScraperError>,
) -> (Source, Option<(serde_json::Value, String)>) {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(json) => (source, Some((json, value.to_string()))),
            Err(e) => {
                log::error!("Error serializing {} rates: {}", source, e);
                (source, None)
            }
        },
        Err(e) => {
            log::error!("Error fetching {} rates: {}", source, e);
            (source, None)
        }
    }
}

fn unwrap_or_exit<T>(source: Source, result: Result<T, ScraperError>) -> T {
    result.unwrap_or_else(|e| {
        log::error!("Error fetching {} rates: {}", source, e);
        process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let recipes = match &cli.recipes {
        Some(path) => Recipes::from_file(path).unwrap_or_else(|e| {
            log::error!("Error loading recipes: {}", e);
            process::exit(1);
        }),
        None => Recipes::default(),
    };

    let scraper = RateScraper::with_chrome(
        recipes,
        ScraperSettings {
            chrome_executable: cli.chrome_path.clone(),
            render_timeout: Duration::from_secs(cli.timeout),
        },
    );

    match cli.command {
        Commands::Nbc { date, format } => {
            let date = date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(today);
            let rates = unwrap_or_exit(Source::Nbc, scraper.fetch_nbc_rates(&date).await);
            print(&rates, format);
        }
        Commands::Nssf { format } => {
            let rate = unwrap_or_exit(Source::Nssf, scraper.fetch_nssf_rate().await);
            print(&rate, format);
        }
        Commands::Tax { format } => {
            let rates = unwrap_or_exit(Source::Tax, scraper.fetch_tax_rates().await);
            print(&rates, format);
        }
        Commands::All { format } => {
            let date = today();
            let (nbc, nssf, tax) = future::join3(
                scraper.fetch_nbc_rates(&date),
                scraper.fetch_nssf_rate(),
                scraper.fetch_tax_rates(),
            )
            .await;

            let results = [
                summarize(Source::Nbc, &nbc),
                summarize(Source::Nssf, &nssf),
                summarize(Source::Tax, &tax),
            ];

            match format {
                OutputFormat::Json => {
                    let object: serde_json::Map<String, serde_json::Value> = results
                        .iter()
                        .map(|(source, outcome)| {
                            let json = outcome
                                .as_ref()
                                .map(|(json, _)| json.clone())
                                .unwrap_or(serde_json::Value::Null);
                            (source.slug().to_string(), json)
                        })
                        .collect();
                    serialize_json(&object);
                }
                OutputFormat::Text => {
                    for (source, outcome) in &results {
                        match outcome {
                            Some((_, text)) => println!("{}", text),
                            None => println!("{}: unavailable\n", source),
                        }
                    }
                }
            }

            let failures = results.iter().filter(|(_, outcome)| outcome.is_none()).count();
            if failures == Source::ALL.len() {
                process::exit(1);
            }
        }
    }
}
