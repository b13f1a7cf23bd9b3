use admitline::harness::{HarnessOptions, run_harness};
use admitline::pipeline::{
    CrawlOptions, LoadOptions, ValidateOptions, run_crawl, run_load, validate_configs,
};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "admitline", about = "Admission cutoff score crawler and loader")]
struct Cli {
    #[arg(long, default_value = "configs/schools")]
    config_dir: PathBuf,

    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// TOML file of `[[institution]]` tier flags overriding the built-in table.
    #[arg(long)]
    tiers: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RunMode {
    Once,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Crawl {
        #[arg(long, value_enum, default_value_t = RunMode::Once)]
        mode: RunMode,
        #[arg(long)]
        year: Option<i32>,
        /// School key or full name; all enabled schools when omitted.
        #[arg(long)]
        school: Option<String>,
    },
    Load {
        #[arg(long, default_value = "data/store.json")]
        store: PathBuf,
        /// Institution reference CSV to upsert before loading scores.
        #[arg(long)]
        institutions: Option<PathBuf>,
    },
    Validate {
        #[arg(long)]
        school_file: Option<PathBuf>,
    },
    Harness {
        #[arg(long)]
        year: Option<i32>,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl { mode, year, school } => {
            info!(?mode, "crawl requested");
            let reports = run_crawl(&CrawlOptions {
                config_dir: cli.config_dir,
                out_dir: cli.out_dir,
                tiers_path: cli.tiers,
                year,
                school,
            })?;

            for report in reports {
                info!(
                    school = %report.school_key,
                    year = report.year,
                    fetched = report.fetched,
                    exported = report.exported,
                    file = ?report.output_path,
                    "school summary"
                );
            }
        }
        Commands::Load {
            store,
            institutions,
        } => {
            let report = run_load(&LoadOptions {
                out_dir: cli.out_dir,
                store_path: store,
                institutions,
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Validate { school_file } => {
            let messages = validate_configs(&ValidateOptions {
                config_dir: Some(cli.config_dir),
                school_file,
            })?;
            for line in messages {
                println!("{line}");
            }
        }
        Commands::Harness { year } => {
            let report = run_harness(&HarnessOptions {
                config_dir: cli.config_dir,
                out_dir: cli.out_dir,
                tiers_path: cli.tiers,
                year,
            })?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
