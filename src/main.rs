// main.rs

// --- External Crate Imports ---
use anyhow::{Context, Error, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

use impref::{
    assign_populations, write_outputs, LogisticConfig, PanelLayout, PipelineConfig,
    PopulationTaxonomy,
};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting impref with args: {:?}", cli_args);

    // Configure Rayon thread pool
    let num_threads = cli_args.threads.unwrap_or_else(num_cpus::get);
    info!("Using {} threads for parallel operations.", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    // --- 1. Resolve the reference panel ---
    let panel = PanelLayout::default()
        .resolve(&cli_args.panel_dir)
        .with_context(|| {
            format!(
                "Failed to locate reference panel files in {}",
                cli_args.panel_dir.display()
            )
        })?;
    debug!("Reference panel files: {:?}", panel);

    let taxonomy = match cli_args.populations.as_ref().or(panel.populations.as_ref()) {
        Some(path) => PopulationTaxonomy::from_path(path)
            .with_context(|| format!("Failed to load population names from {}", path.display()))?,
        None => PopulationTaxonomy::default(),
    };
    info!("Population taxonomy holds {} names.", taxonomy.len());

    let config = PipelineConfig {
        test_fraction: cli_args.test_fraction,
        split_seed: cli_args.seed,
        balance_seed: cli_args.balance_seed,
        logistic: LogisticConfig {
            c: cli_args.c,
            max_iterations: cli_args.max_iter,
            tolerance: cli_args.tolerance,
            ..LogisticConfig::default()
        },
    };

    // --- 2. Run the assignment ---
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Failed to create progress spinner style")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = assign_populations(&cli_args.target, &panel, &taxonomy, &config, &spinner);
    spinner.finish_and_clear();
    let outcome = outcome.with_context(|| {
        format!(
            "Population assignment failed for {}",
            cli_args.target.display()
        )
    })?;

    if outcome.summary.duplicate_target_markers > 0 {
        warn!(
            "{} duplicated target marker record(s) were collapsed.",
            outcome.summary.duplicate_target_markers
        );
    }
    if !outcome.model.converged() {
        warn!(
            "Classifier stopped after {} iterations without reaching tolerance {}.",
            outcome.model.iterations(),
            cli_args.tolerance
        );
    }
    info!("Train/test split seed: {}", outcome.split_seed);
    info!(
        "Predicted populations: {}",
        outcome.report.distinct_populations.join(", ")
    );

    // --- 3. Write Outputs ---
    let written = write_outputs(
        &cli_args.out_dir,
        &outcome.report,
        &outcome.evaluation,
        &outcome.model,
    )
    .with_context(|| format!("Failed to write results to {}", cli_args.out_dir.display()))?;
    for path in &written {
        debug!("Wrote {}", path.display());
    }

    info!(
        "impref finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Assign genotyped samples to reference breeds/populations.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        /// Target VCF (plain, .gz or .bz2).
        pub(crate) target: PathBuf,

        /// Reference panel directory.
        pub(crate) panel_dir: PathBuf,

        /// Output directory, created if absent.
        pub(crate) out_dir: PathBuf,

        #[arg(long, default_value_t = 0.2)]
        pub(crate) test_fraction: f64,

        /// Seed of the train/test split; random when omitted.
        #[arg(long)]
        pub(crate) seed: Option<u64>,

        #[arg(long, default_value_t = 0)]
        pub(crate) balance_seed: u64,

        /// Inverse L2 regularisation strength.
        #[arg(long, default_value_t = 10.0)]
        pub(crate) c: f64,

        #[arg(long, default_value_t = 1000)]
        pub(crate) max_iter: usize,

        #[arg(long, default_value_t = 1e-4)]
        pub(crate) tolerance: f64,

        #[arg(short = 't', long)]
        pub(crate) threads: Option<usize>,

        /// One population name per line, overriding the panel's list.
        #[arg(long)]
        pub(crate) populations: Option<PathBuf>,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }
}
