// fitrep-rv CLI: extract FITREPs, score FRA/RV, manage the local report store
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fitrep_rv::batch::extract_batch;
use fitrep_rv::config::AppConfig;
use fitrep_rv::fitrep::{ExtractionStatus, FitrepExtractor, OccasionCode, Rank, TraitGrade, TRAIT_NAMES};
use fitrep_rv::scoring::{
    compute_fra, compute_rv, predict_impact, validate_trait_grades, CohortKey, Eligibility, Fra, HypotheticalReport,
    RvAnchors,
};
use fitrep_rv::storage::{CohortRecalculator, ReportStore};

#[derive(Parser)]
#[command(name = "fitrep-rv")]
#[command(about = "Extract fitness reports and score FRA / Relative Value")]
#[command(version)]
struct Cli {
    /// TOML config file (falls back to $FITREP_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report database, overriding the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one PDF and print the report as JSON
    Extract {
        pdf: PathBuf,
        /// Also store the report and refresh its cohort
        #[arg(long)]
        store: bool,
    },
    /// Extract many PDFs (files or directories)
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Concurrent extractions, overriding the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
        /// Store extracted reports and refresh the cohorts they touch
        #[arg(long)]
        store: bool,
        /// Print every outcome as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Compute an FRA from trait letters (A-H)
    Fra {
        #[arg(required = true)]
        grades: Vec<String>,
    },
    /// Compute an RV for a target FRA within a cohort
    Rv {
        target: Fra,
        /// Every cohort FRA, the target's own report included
        #[arg(required = true)]
        cohort: Vec<Fra>,
    },
    /// List a stored cohort with FRA and cached RV
    Cohort {
        #[arg(long, value_parser = parse_rank)]
        rank: Rank,
        /// Reporting senior EDIPI or last name
        #[arg(long)]
        senior: String,
        #[arg(long)]
        json: bool,
    },
    /// Predict RVs after adding hypothetical reports to a stored cohort
    WhatIf {
        #[arg(long, value_parser = parse_rank)]
        rank: Rank,
        #[arg(long)]
        senior: String,
        /// JSON array of {label, grades: {trait: letter}, occasion}
        #[arg(long)]
        file: Option<PathBuf>,
        /// Fourteen space-separated letters in form order; repeatable
        #[arg(long)]
        grades: Vec<String>,
        /// Occasion code for hypotheticals given with --grades
        #[arg(long, value_parser = parse_occasion)]
        occasion: Option<OccasionCode>,
    },
    /// Recompute RVs for every stored cohort
    Recompute,
    /// Print report, cohort and RV counts for the store
    Stats,
    /// Replace a stored report's trait grades and refresh its cohort
    Regrade {
        id: i64,
        /// Fourteen letters in form order
        #[arg(required = true)]
        grades: Vec<String>,
    },
}

fn parse_rank(raw: &str) -> std::result::Result<Rank, String> {
    Rank::from_code(raw).ok_or_else(|| format!("unknown rank '{}'", raw))
}

fn parse_occasion(raw: &str) -> std::result::Result<OccasionCode, String> {
    OccasionCode::from_code(raw).ok_or_else(|| format!("unknown occasion code '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.storage.resolved_db_path());

    match cli.command {
        Commands::Extract { pdf, store } => extract_one(&config, &db_path, &pdf, store).await?,
        Commands::Batch {
            inputs,
            workers,
            store,
            json,
        } => run_batch(&config, &db_path, &inputs, workers, store, json).await?,
        Commands::Fra { grades } => print_fra(&grades)?,
        Commands::Rv { target, cohort } => print_rv(target, &cohort),
        Commands::Cohort { rank, senior, json } => list_cohort(&db_path, CohortKey::new(rank, senior), json)?,
        Commands::WhatIf {
            rank,
            senior,
            file,
            grades,
            occasion,
        } => {
            let hypotheticals = load_hypotheticals(file.as_deref(), &grades, occasion)?;
            what_if(&config, &db_path, CohortKey::new(rank, senior), &hypotheticals)?;
        }
        Commands::Recompute => {
            let recalc = recalculator(&config, &db_path)?;
            let summaries = recalc.recompute_all().await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Commands::Stats => {
            let stats = ReportStore::open(&db_path)?.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Regrade { id, grades } => {
            let grades = parse_trait_letters(&grades)?;
            let recalc = recalculator(&config, &db_path)?;
            let outcome = recalc.regrade(id, &grades).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

fn recalculator(config: &AppConfig, db_path: &Path) -> Result<CohortRecalculator> {
    let store = ReportStore::open(db_path).with_context(|| format!("opening {}", db_path.display()))?;
    Ok(CohortRecalculator::new(store, Eligibility::from_config(&config.scoring)))
}

async fn extract_one(config: &AppConfig, db_path: &Path, pdf: &Path, store: bool) -> Result<()> {
    let extractor = FitrepExtractor::from_config(config);
    let report = extractor
        .extract_path(pdf)
        .with_context(|| format!("extracting {}", pdf.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if store {
        let recalc = recalculator(config, db_path)?;
        let id = recalc.store().lock().await.insert_report(&report, Some(pdf))?;
        info!("stored as report {}", id);
        if let Some(key) = CohortKey::for_report(&report) {
            recalc.recompute(&key).await?;
        }
    }
    Ok(())
}

async fn run_batch(
    config: &AppConfig,
    db_path: &Path,
    inputs: &[PathBuf],
    workers: Option<usize>,
    store: bool,
    json: bool,
) -> Result<()> {
    let paths = collect_pdfs(inputs)?;
    if paths.is_empty() {
        bail!("no PDF files found");
    }

    let extractor = Arc::new(FitrepExtractor::from_config(config));
    let batch = extract_batch(extractor, paths, workers.unwrap_or(config.batch.workers)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        for outcome in &batch.outcomes {
            let detail = match (&outcome.report, &outcome.error) {
                (Some(report), _) => format!(
                    "FRA {}  {} issue(s)",
                    report.fra.map_or_else(|| "-".to_string(), |f| f.to_string()),
                    report.issues.len()
                ),
                (None, Some(error)) => error.clone(),
                (None, None) => String::new(),
            };
            println!("{:<8} {}  {}", format!("{:?}", outcome.status), outcome.path.display(), detail);
        }
        println!(
            "{} file(s): {} success, {} partial, {} failed",
            batch.outcomes.len(),
            batch.succeeded,
            batch.partial,
            batch.failed
        );
    }

    if store {
        let recalc = recalculator(config, db_path)?;
        let mut keys = BTreeSet::new();
        {
            let store = recalc.store();
            let store = store.lock().await;
            for (path, report) in batch.reports() {
                if report.status == ExtractionStatus::Failed {
                    continue;
                }
                store.insert_report(report, Some(path))?;
                match CohortKey::for_report(report) {
                    Some(key) => {
                        keys.insert(key);
                    }
                    None => warn!("{}: no rank or reporting senior, not scored", path.display()),
                }
            }
        }
        recalc.recompute_keys(keys).await?;
    }
    Ok(())
}

/// Expand directories to the PDFs directly inside them, sorted by name.
fn collect_pdfs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("reading {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .and_then(|e| e.to_str())
                            .map_or(false, |e| e.eq_ignore_ascii_case("pdf"))
                })
                .collect();
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

fn print_fra(letters: &[String]) -> Result<()> {
    let mut grades = Vec::with_capacity(letters.len());
    for letter in letters.iter().flat_map(|l| l.split(|c: char| c == ',' || c.is_whitespace())) {
        if letter.is_empty() {
            continue;
        }
        match TraitGrade::from_letter(letter) {
            Some(grade) => grades.push(grade),
            None => bail!("invalid letter grade '{}'", letter),
        }
    }
    match compute_fra(grades) {
        Some(fra) => println!("{}", fra),
        None => println!("n/a (no observed grades)"),
    }
    Ok(())
}

fn print_rv(target: Fra, cohort: &[Fra]) {
    match compute_rv(target, cohort) {
        Some(rv) => {
            if let Some(anchors) = RvAnchors::from_cohort(cohort) {
                info!(
                    "max {} mean {} floor {} (n={})",
                    anchors.max_fra, anchors.mean_fra, anchors.floor_fra, anchors.cohort_size
                );
            }
            println!("{}", rv);
        }
        None => println!("n/a (cohort of {} is smaller than 3)", cohort.len()),
    }
}

fn list_cohort(db_path: &Path, key: CohortKey, json: bool) -> Result<()> {
    let store = ReportStore::open(db_path)?;
    let entries = store.cohort_entries(&key)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    println!("Cohort {} ({} report(s))", key, entries.len());
    println!("{:>6}  {:<20} {:<3} {:>10} {:>5} {:>4}", "ID", "NAME", "OCC", "TO", "FRA", "RV");
    for entry in &entries {
        let name = match (&entry.last_name, &entry.first_name) {
            (Some(last), Some(first)) => format!("{}, {}", last, first),
            (Some(last), None) => last.clone(),
            _ => "-".to_string(),
        };
        println!(
            "{:>6}  {:<20} {:<3} {:>10} {:>5} {:>4}",
            entry.id,
            name,
            entry.occasion.map_or("-", OccasionCode::code),
            entry.period_to.map_or_else(|| "-".to_string(), |d| d.to_string()),
            entry.fra.map_or_else(|| "-".to_string(), |f| f.to_string()),
            entry.rv.map_or_else(|| "-".to_string(), |rv| rv.to_string()),
        );
    }
    Ok(())
}

fn load_hypotheticals(
    file: Option<&Path>,
    grade_sets: &[String],
    occasion: Option<OccasionCode>,
) -> Result<Vec<HypotheticalReport>> {
    let mut hypotheticals: Vec<HypotheticalReport> = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Vec::new(),
    };

    for (i, set) in grade_sets.iter().enumerate() {
        let letters: Vec<String> = set.split_whitespace().map(String::from).collect();
        let grades = trait_map(&letters)?;
        hypotheticals.push(HypotheticalReport {
            label: format!("hypothetical {}", i + 1),
            grades,
            occasion,
        });
    }

    if hypotheticals.is_empty() {
        bail!("give hypotheticals with --file or --grades");
    }
    for hypothetical in &hypotheticals {
        let validation = validate_trait_grades(&hypothetical.grades);
        if !validation.is_well_formed() {
            bail!("{}: {}", hypothetical.label, validation.messages().join("; "));
        }
        for message in validation.messages() {
            warn!("{}: {}", hypothetical.label, message);
        }
    }
    Ok(hypotheticals)
}

fn what_if(config: &AppConfig, db_path: &Path, key: CohortKey, hypotheticals: &[HypotheticalReport]) -> Result<()> {
    let store = ReportStore::open(db_path)?;
    let existing = store.cohort_members(&key)?;
    let prediction = predict_impact(&existing, hypotheticals, &Eligibility::from_config(&config.scoring));
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

/// Fourteen letters in form order, keyed by trait name.
fn trait_map(letters: &[String]) -> Result<BTreeMap<String, String>> {
    if letters.len() != TRAIT_NAMES.len() {
        bail!("expected {} trait letters, got {}", TRAIT_NAMES.len(), letters.len());
    }
    Ok(TRAIT_NAMES
        .iter()
        .zip(letters)
        .map(|(name, letter)| (name.to_string(), letter.trim().to_uppercase()))
        .collect())
}

fn parse_trait_letters(letters: &[String]) -> Result<Vec<Option<TraitGrade>>> {
    let letters: Vec<String> = letters.iter().flat_map(|l| l.split_whitespace()).map(String::from).collect();
    let map = trait_map(&letters)?;
    let validation = validate_trait_grades(&map);
    if !validation.is_valid() {
        bail!(validation.messages().join("; "));
    }
    Ok(letters.iter().map(|l| TraitGrade::from_letter(l.trim())).collect())
}
