#![forbid(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use accord_harness::agreement::{bootstrap_kappa, cohen_kappa, BootstrapConfig, Weighting};
use accord_harness::binarize::{Binarizer, Direction};
use accord_harness::comparator::{EvaluatorKind, Metric};
use accord_harness::ratings::{load_ratings, Layout, LoadOptions, RatingMatrix};
use accord_harness::sample_size::{
    achieved_power, power_binary, precision_binary, PowerRequest, PrecisionRequest,
};
use accord_harness::study::{
    fmt_opt, hash_input, load_config_from_path, render_report_markdown, run_study,
    ReferenceMode, StudyConfig, StudyReport,
};

#[derive(Parser)]
#[command(name = "accord", version, about = "Inter-rater agreement for human and LLM judges")]
struct Cli {
    /// Log progress at info level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full study and write a JSON or Markdown report
    Analyze {
        #[command(flatten)]
        study: StudyArgs,
        #[arg(long)]
        out: PathBuf,
        /// md or json
        #[arg(long, default_value = "md")]
        format: String,
    },
    /// Print the pooled ranking of human pairs and judges
    Rank {
        #[command(flatten)]
        study: StudyArgs,
        /// Print the ranking as JSON instead of lines
        #[arg(long)]
        json: bool,
    },
    /// Cohen's kappa between two raters (JSON to stdout)
    Kappa {
        #[arg(long)]
        ratings: PathBuf,
        #[arg(long, value_enum)]
        layout: Option<CliLayout>,
        #[arg(long)]
        rater_a: String,
        #[arg(long)]
        rater_b: String,
        #[arg(long, value_enum, default_value = "unweighted")]
        weighting: CliWeighting,
        /// Binarize at this threshold (accept if score >= threshold) first
        #[arg(long)]
        binarize: Option<i32>,
        /// Bootstrap resamples for a percentile interval (0 disables)
        #[arg(long, default_value_t = 0)]
        resamples: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Write binarized ratings as long CSV
    Binarize {
        #[arg(long)]
        ratings: PathBuf,
        #[arg(long, value_enum)]
        layout: Option<CliLayout>,
        #[arg(long, default_value_t = 4)]
        threshold: i32,
        /// Accept scores at or below the threshold instead
        #[arg(long)]
        at_most: bool,
        /// Inclusive rating scale as "min:max"; scores outside it are errors
        #[arg(long)]
        scale: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Subjects needed for a kappa study
    SampleSize {
        #[command(subcommand)]
        command: SampleSizeCommands,
    },
}

#[derive(Subcommand)]
enum SampleSizeCommands {
    /// Subjects to detect kappa1 against the null kappa0
    Power {
        #[arg(long, default_value_t = 0.4)]
        kappa0: f64,
        #[arg(long, default_value_t = 0.6)]
        kappa1: f64,
        #[arg(long, default_value_t = 0.5)]
        prevalence: f64,
        #[arg(long, default_value_t = 2)]
        raters: usize,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
        #[arg(long, default_value_t = 0.8)]
        power: f64,
    },
    /// Subjects to estimate kappa within a half-width (two raters)
    Precision {
        #[arg(long, default_value_t = 0.6)]
        kappa: f64,
        #[arg(long, default_value_t = 0.5)]
        prevalence: f64,
        #[arg(long, default_value_t = 0.1)]
        half_width: f64,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
    },
}

/// Inputs shared by `analyze` and `rank`; flags override the config file.
#[derive(Args)]
struct StudyArgs {
    #[arg(long)]
    ratings: PathBuf,
    /// Study config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    layout: Option<CliLayout>,
    /// Accept if score >= threshold
    #[arg(long)]
    threshold: Option<i32>,
    /// Comma-separated human raters (default: every non-judge)
    #[arg(long, value_delimiter = ',')]
    humans: Option<Vec<String>>,
    /// Comma-separated LLM judges
    #[arg(long, value_delimiter = ',')]
    judges: Option<Vec<String>>,
    #[arg(long, value_enum)]
    reference: Option<CliReference>,
    /// Primary ranking metric
    #[arg(long, value_enum)]
    primary: Option<CliMetric>,
    /// Bootstrap resamples per kappa interval (0 disables)
    #[arg(long)]
    resamples: Option<usize>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLayout {
    Long,
    Wide,
}

impl From<CliLayout> for Layout {
    fn from(l: CliLayout) -> Self {
        match l {
            CliLayout::Long => Layout::Long,
            CliLayout::Wide => Layout::Wide,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliWeighting {
    Unweighted,
    Linear,
    Quadratic,
}

impl From<CliWeighting> for Weighting {
    fn from(w: CliWeighting) -> Self {
        match w {
            CliWeighting::Unweighted => Weighting::Unweighted,
            CliWeighting::Linear => Weighting::Linear,
            CliWeighting::Quadratic => Weighting::Quadratic,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliReference {
    Majority,
    MeanPairwise,
}

impl From<CliReference> for ReferenceMode {
    fn from(r: CliReference) -> Self {
        match r {
            CliReference::Majority => ReferenceMode::Majority,
            CliReference::MeanPairwise => ReferenceMode::MeanPairwise,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMetric {
    CohenKappa,
    Ac1,
    RawAgreement,
}

impl From<CliMetric> for Metric {
    fn from(m: CliMetric) -> Self {
        match m {
            CliMetric::CohenKappa => Metric::CohenKappa,
            CliMetric::Ac1 => Metric::Ac1,
            CliMetric::RawAgreement => Metric::RawAgreement,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Analyze { study, out, format } => {
            if format != "md" && format != "json" {
                return Err(format!("unknown --format {format:?} (expected md or json)").into());
            }
            let report = study_report(&study)?;
            if format == "json" {
                write_json(&out, &report)?;
            } else {
                std::fs::write(&out, render_report_markdown(&report))?;
            }
            info!(out = %out.display(), groups = report.groups.len(), "wrote report");
        }
        Commands::Rank { study, json } => {
            let report = study_report(&study)?;
            let pooled = report.pooled().ok_or("study produced no pooled group")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pooled.ranking)?);
            } else {
                if let Some(base) = pooled.ranking.human_baseline {
                    println!("human baseline ({}): {base:.4}", pooled.ranking.primary);
                }
                for e in &pooled.ranking.entries {
                    let kind = match e.score.kind {
                        EvaluatorKind::HumanPair => "human",
                        EvaluatorKind::Judge => "judge",
                    };
                    println!(
                        "{:>3}. {:<32} {kind:<5} n={:<5} kappa={} ac1={} |bi|={} ({:?})",
                        e.rank,
                        e.score.name,
                        e.score.subjects,
                        fmt_opt(e.score.cohen_kappa),
                        fmt_opt(e.score.ac1),
                        fmt_opt(e.score.abs_bias),
                        e.decided_by,
                    );
                }
                match &pooled.ranking.best_judge {
                    Some(name) => println!("best judge: {name}"),
                    None => println!("best judge: none"),
                }
            }
        }
        Commands::Kappa {
            ratings,
            layout,
            rater_a,
            rater_b,
            weighting,
            binarize,
            resamples,
            seed,
        } => {
            let mut matrix = load_matrix(&ratings, layout)?;
            if let Some(threshold) = binarize {
                matrix = Binarizer::new(threshold).apply(&matrix)?;
            }
            let pairs = matrix.pairs(&rater_a, &rater_b)?;
            let weighting = Weighting::from(weighting);
            let kappa = cohen_kappa(&pairs, weighting, None)?;
            let interval = bootstrap_kappa(
                &pairs,
                weighting,
                &BootstrapConfig {
                    resamples,
                    seed,
                    ..BootstrapConfig::default()
                },
            )?;
            let out = serde_json::json!({
                "rater_a": rater_a,
                "rater_b": rater_b,
                "kappa": kappa,
                "bootstrap": interval,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Binarize {
            ratings,
            layout,
            threshold,
            at_most,
            scale,
            out,
        } => {
            let matrix = load_matrix(&ratings, layout)?;
            let mut binarizer = Binarizer::new(threshold);
            if at_most {
                binarizer = binarizer.with_direction(Direction::AtMost);
            }
            if let Some(scale) = scale {
                let (min, max) = parse_scale(&scale)?;
                binarizer = binarizer.with_scale(min, max);
            }
            let binary = binarizer.apply(&matrix)?;
            binary.write_long_csv(&out)?;
            info!(
                out = %out.display(),
                ratings = binary.rating_count(),
                "wrote binarized ratings"
            );
        }
        Commands::SampleSize { command } => match command {
            SampleSizeCommands::Power {
                kappa0,
                kappa1,
                prevalence,
                raters,
                alpha,
                power,
            } => {
                let req = PowerRequest {
                    kappa0,
                    kappa1,
                    prevalence,
                    raters,
                    alpha,
                    power,
                };
                let estimate = power_binary(&req)?;
                let achieved =
                    achieved_power(kappa0, kappa1, prevalence, raters, alpha, estimate.subjects)?;
                let out = serde_json::json!({
                    "estimate": estimate,
                    "achieved_power": achieved,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            SampleSizeCommands::Precision {
                kappa,
                prevalence,
                half_width,
                alpha,
            } => {
                let estimate = precision_binary(&PrecisionRequest {
                    kappa,
                    prevalence,
                    half_width,
                    alpha,
                })?;
                println!("{}", serde_json::to_string_pretty(&estimate)?);
            }
        },
    }

    Ok(())
}

fn study_report(args: &StudyArgs) -> Result<StudyReport, Box<dyn std::error::Error>> {
    let mut cfg = match &args.config {
        Some(path) => load_config_from_path(path)?,
        None => StudyConfig::default(),
    };
    if let Some(layout) = args.layout {
        cfg.input.layout = layout.into();
    }
    if let Some(threshold) = args.threshold {
        cfg.binarizer.threshold = threshold;
    }
    if let Some(humans) = &args.humans {
        cfg.humans = humans.clone();
    }
    if let Some(judges) = &args.judges {
        cfg.judges = judges.clone();
    }
    if let Some(reference) = args.reference {
        cfg.reference = reference.into();
    }
    if let Some(primary) = args.primary {
        cfg.ranking.primary = primary.into();
    }
    if let Some(resamples) = args.resamples {
        cfg.bootstrap.resamples = resamples;
    }

    let matrix = load_ratings(&args.ratings, &cfg.input)?;
    info!(
        items = matrix.n_items(),
        raters = matrix.n_raters(),
        "loaded {}",
        args.ratings.display()
    );
    let mut report = run_study(&matrix, &cfg)?;
    report.input_hash = Some(hash_input(&args.ratings)?);
    Ok(report)
}

fn load_matrix(
    path: &Path,
    layout: Option<CliLayout>,
) -> Result<RatingMatrix, Box<dyn std::error::Error>> {
    let opts = LoadOptions {
        layout: layout.map(Layout::from).unwrap_or_default(),
        ..LoadOptions::default()
    };
    Ok(load_ratings(path, &opts)?)
}

fn parse_scale(raw: &str) -> Result<(i32, i32), Box<dyn std::error::Error>> {
    let (min, max) = raw
        .split_once(':')
        .ok_or_else(|| format!("--scale expects min:max, got {raw:?}"))?;
    Ok((min.trim().parse()?, max.trim().parse()?))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
