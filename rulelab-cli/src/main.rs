//! RuleLab CLI — validate and evaluate composite rule trees.
//!
//! Commands:
//! - `plugins` — list the builtin plugins and their parameter schemas
//! - `validate` — compile a rule file and report plugins, params, fingerprint
//! - `eval` — run a rule tree over a CSV price series and print signals

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use rulelab_core::context::NullHelpers;
use rulelab_core::{
    compile, DslNode, EvaluationContext, Evaluator, PluginRegistry, Role, SeriesSnapshot,
};

#[derive(Parser)]
#[command(
    name = "rulelab",
    about = "RuleLab CLI — rule composition engine for trading decisions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the builtin plugins and their parameter schemas.
    Plugins,
    /// Compile a rule file and report what it uses.
    Validate {
        /// Path to a JSON rule tree.
        rule: PathBuf,
    },
    /// Run a rule tree over a CSV price series and print fired signals.
    Eval {
        /// Path to a JSON rule tree.
        rule: PathBuf,

        /// CSV series: date,open,high,low,close,volume (header required;
        /// empty cells read as missing quotes).
        #[arg(long)]
        series: PathBuf,

        /// Decision to evaluate: longEntry, longExit, shortEntry, shortExit.
        #[arg(long, default_value = "longEntry")]
        role: String,

        /// First bar index to evaluate.
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Print each fired signal's meta as JSON.
        #[arg(long, default_value_t = false)]
        meta: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Plugins => run_plugins(),
        Commands::Validate { rule } => run_validate(&rule),
        Commands::Eval {
            rule,
            series,
            role,
            from,
            meta,
        } => run_eval(&rule, &series, &role, from, meta),
    }
}

fn run_plugins() -> Result<()> {
    let registry = PluginRegistry::with_builtins();
    for id in registry.ids() {
        let plugin = registry
            .get(id)
            .context("registry listed an id it cannot resolve")?;
        let meta = plugin.meta();
        println!("{} — {}", meta.id, meta.label);
        println!("{}", serde_json::to_string_pretty(&meta.params_schema)?);
        println!();
    }
    Ok(())
}

fn load_and_compile(rule_path: &Path) -> Result<Evaluator> {
    let text = std::fs::read_to_string(rule_path)
        .with_context(|| format!("reading {}", rule_path.display()))?;
    let tree = DslNode::from_json_str(&text)?;
    let registry = PluginRegistry::with_builtins();
    Ok(compile(&tree, &registry)?)
}

fn run_validate(rule_path: &Path) -> Result<()> {
    let evaluator = load_and_compile(rule_path)?;

    println!("OK: {}", rule_path.display());
    println!("Fingerprint: {}", evaluator.fingerprint());
    println!("Plugins:     {}", evaluator.used_plugin_ids().join(", "));
    println!();
    println!("Normalized leaf parameters:");
    for (plugin_id, params) in evaluator.leaf_params() {
        println!("  {plugin_id}: {}", serde_json::to_string(params)?);
    }
    Ok(())
}

fn run_eval(
    rule_path: &Path,
    series_path: &Path,
    role: &str,
    from: usize,
    print_meta: bool,
) -> Result<()> {
    let role = parse_role(role)?;
    let evaluator = load_and_compile(rule_path)?;
    let series = load_series(series_path)?;
    if from >= series.len() {
        bail!(
            "--from {from} is past the end of the series ({} bars)",
            series.len()
        );
    }

    let helpers = NullHelpers;
    let mut fired = 0usize;
    for index in from..series.len() {
        let ctx = EvaluationContext::new(role, index, &series, &helpers);
        let result = evaluator.evaluate(&ctx)?;
        if !result.signal_for(role) {
            continue;
        }
        fired += 1;
        let mut line = format!("{}  bar {index}  {role}", series.dates[index]);
        if let Some(stop) = result.stop_loss_percent {
            line.push_str(&format!("  stopLoss {stop}%"));
        }
        if let Some(take) = result.take_profit_percent {
            line.push_str(&format!("  takeProfit {take}%"));
        }
        println!("{line}");
        if print_meta {
            println!("{}", serde_json::to_string_pretty(&result.meta)?);
        }
    }

    println!();
    println!(
        "{fired} signal(s) over {} bar(s)",
        series.len() - from
    );
    Ok(())
}

fn parse_role(token: &str) -> Result<Role> {
    Ok(match token {
        "longEntry" => Role::LongEntry,
        "longExit" => Role::LongExit,
        "shortEntry" => Role::ShortEntry,
        "shortExit" => Role::ShortExit,
        other => bail!(
            "unknown role '{other}'. Valid: longEntry, longExit, shortEntry, shortExit"
        ),
    })
}

/// One CSV row. Empty numeric cells deserialize to `None` — missing
/// quotes inside the warmup window are normal.
#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

fn load_series(path: &Path) -> Result<SeriesSnapshot> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut series = SeriesSnapshot::default();
    for (line, row) in reader.deserialize::<BarRow>().enumerate() {
        let row = row.with_context(|| format!("parsing row {}", line + 2))?;
        series.dates.push(row.date);
        series.open.push(row.open);
        series.high.push(row.high);
        series.low.push(row.low);
        series.close.push(row.close);
        series.volume.push(row.volume);
    }

    if series.is_empty() {
        bail!("series {} contains no bars", path.display());
    }
    Ok(series)
}
