//! clocktune CLI
//!
//! Score clock-reading prompts against a labelled dataset and improve them
//! in a closed loop:
//!
//! 1. Evaluate: read N clocks with a prompt, write metrics reports
//! 2. Optimize: seed selection, then rewrite/re-score iterations
//! 3. Pipeline: baseline evaluation → optimization → final evaluation → comparison
//! 4. Compare: diff two saved evaluation reports
//!
//! Logs go to stderr via tracing (`RUST_LOG` overrides the default filter);
//! banners, summaries and progress go to stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use secrecy::SecretString;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use clocktune::config::Config;
use clocktune::dataset::Dataset;
use clocktune::error::Error;
use clocktune::evaluation::{evaluate, plots, Comparison, EvaluationReport, MetricSet};
use clocktune::reader::openai::OpenAiClient;
use clocktune::reader::simulate::{ChecklistRewriter, SimulatedReader};
use clocktune::reader::{read_batch, PredictionSource};
use clocktune::training::{
    default_seeds, Agent, AgentRewriter, FailurePolicy, OptimizationOutcome, Optimizer,
    PromptRewriter, BASELINE_PROMPT,
};
use clocktune::types::{ClockType, PromptCandidate, Sample};

/// Evaluate and optimize prompts for reading clocks with a vision model
///
/// Examples:
///   clocktune evaluate --samples 50                 # Score the baseline prompt
///   clocktune optimize --iterations 5 --seed 7      # Improve from built-in seeds
///   clocktune pipeline --simulate                   # Full dry run, no network
///   clocktune compare results/baseline_evaluation.json results/final_evaluation.json
#[derive(Parser, Debug)]
#[command(name = "clocktune")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: clocktune.toml or [tool.clocktune] in pyproject.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dataset directory containing metadata.json
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// OpenAI API key
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model name for reading and rewriting
    #[arg(long, global = true)]
    model: Option<String>,

    /// Only use these clock types (comma separated: analog,digital,word)
    #[arg(long, global = true, value_delimiter = ',')]
    clock_types: Vec<ClockType>,

    /// Use the offline simulated reader instead of the API
    #[arg(long, global = true)]
    simulate: bool,

    /// RNG seed for sampling and splits (random if omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Write PNG charts next to the reports
    #[arg(long, global = true)]
    plots: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one prompt on the first N samples
    Evaluate(EvaluateArgs),
    /// Run the optimization loop and save the best prompt
    Optimize(OptimizeArgs),
    /// Baseline, optimize, final evaluation and comparison in one go
    Pipeline(PipelineArgs),
    /// Compare two saved evaluation reports
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Number of samples (taken from the start of the dataset)
    #[arg(long, default_value = "50")]
    samples: usize,

    /// Prompt text file (default: built-in baseline prompt)
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Report name; writes <output>/<name>.json and .txt
    #[arg(long, default_value = "evaluation")]
    name: String,
}

#[derive(Args, Debug, Clone)]
struct OptimizeArgs {
    /// Number of optimization iterations
    #[arg(long)]
    iterations: Option<usize>,

    /// Training samples per iteration
    #[arg(long)]
    samples: Option<usize>,

    /// Prompt rewriter: openai, claude, gemini, codex, checklist
    /// (default: openai, or checklist with --simulate)
    #[arg(long)]
    rewriter: Option<String>,

    /// Model for CLI-agent rewriters
    #[arg(long)]
    rewriter_model: Option<String>,

    /// What to do when a rewrite fails: continue or stop
    #[arg(long)]
    on_rewrite_failure: Option<FailurePolicy>,

    /// Seed prompt file (repeatable; default: built-in seeds)
    #[arg(long = "seed-prompt")]
    seed_prompts: Vec<PathBuf>,

    /// Disable the live sparkline display
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    #[command(flatten)]
    optimize: OptimizeArgs,

    /// Samples for the baseline evaluation (start of the dataset)
    #[arg(long, default_value = "50")]
    baseline_samples: usize,

    /// Samples for the final evaluation (end of the dataset)
    #[arg(long, default_value = "100")]
    final_samples: usize,

    /// Baseline prompt text file (default: built-in baseline prompt)
    #[arg(long)]
    baseline_prompt_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Baseline evaluation report (JSON)
    baseline: PathBuf,

    /// Candidate evaluation report (JSON)
    candidate: PathBuf,

    /// Report name; writes <output>/<name>.json and .txt
    #[arg(long, default_value = "comparison_report")]
    name: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "clocktune=debug" } else { "clocktune=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    debug!("configuration:\n{}", config.display_summary());

    match &cli.command {
        Command::Evaluate(args) => cmd_evaluate(&cli, &config, args),
        Command::Optimize(args) => cmd_optimize(&cli, config.clone(), args),
        Command::Pipeline(args) => cmd_pipeline(&cli, config.clone(), args),
        Command::Compare(args) => cmd_compare(&config, args),
    }
}

/// Config file plus global CLI overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir()?;
            Config::load(&cwd)?
        }
    };

    if let Some(dir) = &cli.dataset {
        config.dataset.dir = dir.clone();
    }
    if let Some(dir) = &cli.output {
        config.output.dir = dir.clone();
    }
    if let Some(model) = &cli.model {
        config.model.model = model.clone();
    }
    if !cli.clock_types.is_empty() {
        config.dataset.clock_types = cli.clock_types.clone();
    }
    if cli.plots {
        config.output.plots = true;
    }

    config.validate()?;
    Ok(config)
}

fn apply_optimize_overrides(config: &mut Config, args: &OptimizeArgs) -> Result<()> {
    if let Some(n) = args.iterations {
        config.optimizer.num_iterations = n;
    }
    if let Some(n) = args.samples {
        config.optimizer.samples_per_iteration = n;
    }
    if let Some(policy) = args.on_rewrite_failure {
        config.optimizer.on_rewrite_failure = policy;
    }
    config.optimizer.validate()?;
    Ok(())
}

/// The API key, required unless everything runs offline.
fn credential(cli: &Cli) -> Result<SecretString> {
    match cli.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(SecretString::from(key.to_string())),
        _ => Err(Error::MissingCredential.into()),
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn load_dataset(config: &Config) -> Result<Dataset> {
    let dataset = Dataset::load(&config.dataset.dir)?.filter_types(&config.dataset.clock_types);
    if dataset.is_empty() {
        return Err(Error::dataset(&config.dataset.dir, "no samples after filtering").into());
    }
    info!(samples = dataset.len(), dir = %config.dataset.dir.display(), "loaded dataset");
    Ok(dataset)
}

fn read_prompt(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading prompt {}", path.display()))?;
            Ok(text.trim().to_string())
        }
        None => Ok(BASELINE_PROMPT.to_string()),
    }
}

fn build_source(cli: &Cli, config: &Config, dataset: &Dataset) -> Result<Box<dyn PredictionSource>> {
    if cli.simulate {
        info!("using simulated reader");
        return Ok(Box::new(SimulatedReader::new(&dataset.samples)));
    }
    let client = OpenAiClient::new(credential(cli)?, config.model.clone())?;
    Ok(Box::new(client))
}

fn build_rewriter(cli: &Cli, config: &Config, args: &OptimizeArgs) -> Result<Box<dyn PromptRewriter>> {
    let name = match &args.rewriter {
        Some(name) => name.to_lowercase(),
        None if cli.simulate => "checklist".to_string(),
        None => "openai".to_string(),
    };

    let rewriter: Box<dyn PromptRewriter> = match name.as_str() {
        "checklist" => Box::new(ChecklistRewriter),
        "openai" => Box::new(OpenAiClient::new(credential(cli)?, config.model.clone())?),
        other => {
            let agent: Agent = other.parse().map_err(|e: String| Error::Config(e))?;
            Box::new(AgentRewriter::new(agent, args.rewriter_model.clone()))
        }
    };
    info!(rewriter = rewriter.name(), "prompt rewriter ready");
    Ok(rewriter)
}

/// Fail before any work if a network component would need a key we lack.
fn check_credential(cli: &Cli, args: Option<&OptimizeArgs>) -> Result<()> {
    let rewriter_needs_key = args.is_some_and(|a| match &a.rewriter {
        Some(name) => name.eq_ignore_ascii_case("openai"),
        None => !cli.simulate,
    });
    if !cli.simulate || rewriter_needs_key {
        credential(cli)?;
    }
    Ok(())
}

fn banner(title: &str) {
    println!();
    println!("{}", "─".repeat(65));
    println!("{}", format!(" {} ", title).bold().on_cyan());
    println!("{}", "─".repeat(65));
    println!();
}

/// Read `samples` with `prompt`, print and persist the report.
fn run_evaluation(
    source: &dyn PredictionSource,
    samples: &[Sample],
    prompt: &str,
    name: &str,
    config: &Config,
) -> Result<MetricSet> {
    println!("Testing {} with {} samples...", name, samples.len());
    let predictions = read_batch(source, samples, prompt);
    let metrics = evaluate(&predictions, samples)?;

    println!("  Hour accuracy:   {:.2}%", metrics.hour.accuracy * 100.0);
    println!("  Minute accuracy: {:.2}%", metrics.minute.accuracy * 100.0);
    println!("  Exact match:     {}", format!("{:.2}%", metrics.combined.exact_match_accuracy * 100.0).bold());

    let json_path = config.output.dir.join(format!("{}.json", name));
    EvaluationReport::new(metrics.clone())
        .with_prompt(prompt)
        .write(&json_path)
        .with_context(|| format!("writing {}", json_path.display()))?;
    println!("  Report: {}", json_path.display().dimmed());

    if config.output.plots {
        let png = config.output.dir.join(format!("{}_accuracy.png", name));
        if let Err(e) = plots::plot_accuracy_by_clock_type(&metrics, &png.to_string_lossy()) {
            warn!("failed to plot {}: {}", png.display(), e);
        }
    }

    Ok(metrics)
}

fn load_seeds(args: &OptimizeArgs) -> Result<Vec<PromptCandidate>> {
    if args.seed_prompts.is_empty() {
        return Ok(default_seeds());
    }
    args.seed_prompts
        .iter()
        .map(|p| read_prompt(Some(p)).map(PromptCandidate::new))
        .collect()
}

fn run_optimization(
    cli: &Cli,
    config: &Config,
    args: &OptimizeArgs,
    source: &dyn PredictionSource,
    dataset: &Dataset,
) -> Result<OptimizationOutcome> {
    let seeds = load_seeds(args)?;
    let rewriter = build_rewriter(cli, config, args)?;

    println!(
        "Optimizing from {} seed prompts: {} iterations x {} samples",
        seeds.len(),
        config.optimizer.num_iterations,
        config.optimizer.samples_per_iteration
    );

    let mut optimizer = Optimizer::new(source, rewriter.as_ref(), config.optimizer.clone(), make_rng(cli.seed));
    if !args.no_progress {
        optimizer = optimizer.with_live_progress();
    }
    let outcome = optimizer.optimize(&dataset.samples, &seeds)?;

    std::fs::create_dir_all(&config.output.dir)?;
    let history_path = config.output.dir.join("optimization_history.json");
    std::fs::write(&history_path, serde_json::to_string_pretty(&outcome)?)
        .with_context(|| format!("writing {}", history_path.display()))?;
    let prompt_path = config.output.dir.join("optimized_prompt.txt");
    std::fs::write(&prompt_path, &outcome.best_prompt.text)
        .with_context(|| format!("writing {}", prompt_path.display()))?;

    if config.output.plots {
        let png = config.output.dir.join("optimization_history.png");
        if let Err(e) = plots::plot_optimization_history(&outcome.history, outcome.initial_score, &png.to_string_lossy()) {
            warn!("failed to plot {}: {}", png.display(), e);
        }
    }

    println!("Seed scores: {:?}", outcome.seed_scores);
    println!(
        "Best score: {:.2}% (started at {:.2}%)",
        outcome.best_score * 100.0,
        outcome.initial_score * 100.0
    );
    println!("Optimized prompt saved to {}", prompt_path.display());
    println!();
    println!("{}", outcome.best_prompt.text.dimmed());

    Ok(outcome)
}

fn cmd_evaluate(cli: &Cli, config: &Config, args: &EvaluateArgs) -> Result<()> {
    check_credential(cli, None)?;
    banner("CLOCKTUNE EVALUATION");

    let dataset = load_dataset(config)?;
    let prompt = read_prompt(args.prompt_file.as_deref())?;
    let source = build_source(cli, config, &dataset)?;

    let metrics = run_evaluation(source.as_ref(), dataset.head(args.samples), &prompt, &args.name, config)?;
    println!();
    println!("{}", clocktune::evaluation::render_summary(&metrics));
    Ok(())
}

fn cmd_optimize(cli: &Cli, mut config: Config, args: &OptimizeArgs) -> Result<()> {
    apply_optimize_overrides(&mut config, args)?;
    check_credential(cli, Some(args))?;
    banner("CLOCKTUNE PROMPT OPTIMIZER");

    let dataset = load_dataset(&config)?;
    let source = build_source(cli, &config, &dataset)?;
    run_optimization(cli, &config, args, source.as_ref(), &dataset)?;

    println!();
    println!("{}", " OPTIMIZATION COMPLETE ".bold().on_green());
    Ok(())
}

fn cmd_pipeline(cli: &Cli, mut config: Config, args: &PipelineArgs) -> Result<()> {
    apply_optimize_overrides(&mut config, &args.optimize)?;
    check_credential(cli, Some(&args.optimize))?;
    banner("CLOCKTUNE PIPELINE");

    let dataset = load_dataset(&config)?;
    let source = build_source(cli, &config, &dataset)?;
    let baseline_prompt = read_prompt(args.baseline_prompt_file.as_deref())?;

    banner("STEP 1: BASELINE EVALUATION");
    let baseline = run_evaluation(
        source.as_ref(),
        dataset.head(args.baseline_samples),
        &baseline_prompt,
        "baseline_evaluation",
        &config,
    )?;

    banner("STEP 2: PROMPT OPTIMIZATION");
    let optimized_prompt = match run_optimization(cli, &config, &args.optimize, source.as_ref(), &dataset) {
        Ok(outcome) => outcome.best_prompt.text,
        Err(e) if e.downcast_ref::<Error>().is_some_and(|e| !e.is_fatal()) => {
            warn!("optimization failed, falling back to the first seed prompt: {:#}", e);
            load_seeds(&args.optimize)?
                .into_iter()
                .next()
                .map(|p| p.text)
                .unwrap_or(baseline_prompt.clone())
        }
        Err(e) => return Err(e),
    };

    banner("STEP 3: FINAL EVALUATION");
    let final_metrics = run_evaluation(
        source.as_ref(),
        dataset.tail(args.final_samples),
        &optimized_prompt,
        "final_evaluation",
        &config,
    )?;

    banner("STEP 4: COMPARISON");
    let comparison = Comparison::new(&baseline, &final_metrics).with_prompts(&baseline_prompt, &optimized_prompt);
    let json_path = config.output.dir.join("comparison_report.json");
    comparison.write(&json_path)?;
    comparison.print();

    println!();
    println!("{}", " PIPELINE COMPLETE ".bold().on_green());
    println!("Outputs saved to {}", config.output.dir.display());
    Ok(())
}

fn cmd_compare(config: &Config, args: &CompareArgs) -> Result<()> {
    let baseline = EvaluationReport::load(&args.baseline)
        .with_context(|| format!("loading {}", args.baseline.display()))?;
    let candidate = EvaluationReport::load(&args.candidate)
        .with_context(|| format!("loading {}", args.candidate.display()))?;

    let mut comparison = Comparison::new(&baseline.metrics, &candidate.metrics);
    if let (Some(b), Some(c)) = (&baseline.prompt, &candidate.prompt) {
        comparison = comparison.with_prompts(b, c);
    }

    let json_path = config.output.dir.join(format!("{}.json", args.name));
    let text = comparison.write(&json_path)?;
    comparison.print();
    debug!("{}", text);
    println!("Comparison saved to {}", json_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clocktune::dataset::METADATA_FILE;

    fn write_dataset(dir: &Path, n: usize) {
        let records: Vec<_> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "filename": format!("clock_{:04}_analog.png", i),
                    "clock_type": "analog",
                    "hour": i % 24,
                    "minute": i * 7 % 60,
                })
            })
            .collect();
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_string(&records).unwrap()).unwrap();
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("clocktune").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let mut c = cli(&["evaluate"]);
        c.api_key = None;
        let err = check_credential(&c, None).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some_and(Error::is_fatal));
    }

    #[test]
    fn test_simulated_run_needs_no_key() {
        let mut c = cli(&["optimize", "--simulate"]);
        c.api_key = None;
        let Command::Optimize(args) = &c.command else { unreachable!() };
        assert!(check_credential(&c, Some(args)).is_ok());
    }

    #[test]
    fn test_simulated_pipeline_writes_outputs() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_dataset(data.path(), 60);

        let mut c = cli(&[
            "pipeline",
            "--simulate",
            "--seed",
            "5",
            "--iterations",
            "2",
            "--baseline-samples",
            "10",
            "--final-samples",
            "10",
            "--no-progress",
            "--dataset",
            data.path().to_str().unwrap(),
            "--output",
            out.path().to_str().unwrap(),
        ]);
        c.api_key = None;

        let config = load_config(&c).unwrap();
        let Command::Pipeline(args) = &c.command else { unreachable!() };
        cmd_pipeline(&c, config, args).unwrap();

        for file in [
            "baseline_evaluation.json",
            "baseline_evaluation.txt",
            "final_evaluation.json",
            "optimization_history.json",
            "optimized_prompt.txt",
            "comparison_report.json",
            "comparison_report.txt",
        ] {
            assert!(out.path().join(file).exists(), "missing {}", file);
        }

        let outcome: OptimizationOutcome =
            serde_json::from_str(&std::fs::read_to_string(out.path().join("optimization_history.json")).unwrap())
                .unwrap();
        assert_eq!(outcome.history.len(), 2);
    }
}
