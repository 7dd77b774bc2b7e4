use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use hoogtetoets::settlement::SETTLEMENT_COLUMNS;
use hoogtetoets::table::ELEVATION_COLUMNS;
use hoogtetoets::{
    assess, AssessmentRequest, CoordinateTransform, GeoStatus, HtError, Params,
    PlanningHorizon, RdNewApprox, SettlementSelection, Survey,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod output;
mod session;

use output::{summary_lines, write_outputs, OutputPaths};

#[derive(Parser, Debug)]
#[command(author, version, about = "Dike settlement projection and fill calculator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Project settlement and compute the required fill for one survey CSV
    Compute(ComputeArgs),
    /// Summarise the columns of a survey CSV and the outputs it supports
    Inspect(InspectArgs),
    /// Interactive session reading one command per line
    Session(SessionArgs),
}

/// Parameter overrides shared by `compute` and `session`.
#[derive(Parser, Debug, Default)]
struct ParamArgs {
    /// JSON parameter file; flags below take precedence
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Settlement series (comma separated: agz34, agz45, agz35)
    #[arg(long)]
    series: Option<String>,

    /// Lower clip bound for settlement rates (m/year)
    #[arg(long, allow_hyphen_values = true)]
    min: Option<f64>,

    /// Upper clip bound for settlement rates (m/year)
    #[arg(long, allow_hyphen_values = true)]
    max: Option<f64>,

    /// Planning periods in years (comma separated, from 5,10,15,20,25,30)
    #[arg(long)]
    horizons: Option<String>,

    /// Dike-table height (m) below which fill is required
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,

    /// Reference year (defaults to the current year)
    #[arg(long)]
    reference_year: Option<i32>,

    /// Year of the z5 survey
    #[arg(long)]
    base_year: Option<i32>,
}

#[derive(Parser, Debug)]
struct ComputeArgs {
    /// Survey CSV (columns l, z3, z4, z5, agz34, agz45, agz35 and optionally x, y)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Result table path (`-` for stdout)
    #[arg(short, long, default_value = "hoogtetoets.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Map layer CSV path (defaults next to the result table)
    #[arg(long, value_hint = ValueHint::FilePath)]
    map: Option<PathBuf>,

    /// Disable the map export
    #[arg(long, action = ArgAction::SetTrue)]
    no_map: bool,

    /// Elevation profile CSV path
    #[arg(long, value_hint = ValueHint::FilePath)]
    profile_output: Option<PathBuf>,

    /// Filtered settlement CSV path
    #[arg(long, value_hint = ValueHint::FilePath)]
    settlement_output: Option<PathBuf>,

    /// Projected elevation and fill per horizon CSV path (ordered by `l`)
    #[arg(long, value_hint = ValueHint::FilePath)]
    projection_output: Option<PathBuf>,

    /// JSON summary report path
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    #[command(flatten)]
    params: ParamArgs,

    /// Skip the RD New -> WGS84 conversion
    #[arg(long, action = ArgAction::SetTrue)]
    no_transform: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Survey CSV to inspect
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output report path (stdout when omitted)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct SessionArgs {
    /// Read commands from this file instead of stdin
    #[arg(long, value_hint = ValueHint::FilePath)]
    script: Option<PathBuf>,

    /// Result table written by `compute`
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Map layer CSV written by `compute`
    #[arg(long, value_hint = ValueHint::FilePath)]
    map: Option<PathBuf>,

    /// JSON summary written by `compute`
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    #[command(flatten)]
    params: ParamArgs,

    /// Skip the RD New -> WGS84 conversion
    #[arg(long, action = ArgAction::SetTrue)]
    no_transform: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Compute(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
        Command::Session(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Compute(args) => handle_compute(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Session(args) => handle_session(args),
    }
}

fn handle_compute(args: ComputeArgs) -> Result<()> {
    let params = resolve_params(&args.params)?;
    let request = AssessmentRequest::from_params(&params)?;
    debug!(
        "Selection {}, clip [{}, {}], reference year {}, threshold {} m",
        request.selection,
        request.range.min(),
        request.range.max(),
        request.projection.reference_year,
        request.threshold_m
    );

    let t_parse = Instant::now();
    let bytes =
        fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    let transform: Option<&dyn CoordinateTransform> = if args.no_transform {
        None
    } else {
        Some(&RdNewApprox)
    };
    let survey = Survey::load(&bytes, transform)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    if args.profile || args.verbose {
        info!(
            "Parse stage: {:.1} ms ({} rows)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            survey.table.len()
        );
    }
    if let GeoStatus::Failed(err) = &survey.geo {
        warn!("No geographic positions: {}", err);
    }

    let t_compute = Instant::now();
    let assessment = assess(&survey, &request);
    if args.profile || args.verbose {
        info!(
            "Compute stage: {:.1} ms",
            t_compute.elapsed().as_secs_f64() * 1000.0
        );
    }
    for warning in &assessment.warnings {
        warn!("{}", warning);
    }
    for line in summary_lines(&assessment) {
        info!("{}", line);
    }

    let map = if args.no_map {
        None
    } else {
        args.map.clone().or_else(|| {
            (survey.has_geographic() && args.output.as_os_str() != "-")
                .then(|| sibling_path(&args.output, "map"))
        })
    };
    let paths = OutputPaths {
        table: Some(args.output.clone()),
        map,
        profile: args.profile_output.clone(),
        settlement: args.settlement_output.clone(),
        projection: args.projection_output.clone(),
        report: args.report.clone(),
    };

    let t_write = Instant::now();
    write_outputs(&survey, &assessment, &paths)?;
    if args.profile || args.verbose {
        info!(
            "Write stage: {:.1} ms",
            t_write.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    let survey = Survey::load(&bytes, None)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let mut report = format!("FILE: {}\n", args.input.display());
    report.push_str(&inspect_report(&survey));

    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Inspection report written: {}", path.display());
        }
        None => io::stdout().write_all(report.as_bytes())?,
    }
    Ok(())
}

fn handle_session(args: SessionArgs) -> Result<()> {
    let params = resolve_params(&args.params)?;
    let transform: Option<Box<dyn CoordinateTransform>> = if args.no_transform {
        None
    } else {
        Some(Box::new(RdNewApprox))
    };
    let paths = OutputPaths {
        table: args.output.clone(),
        map: args.map.clone(),
        profile: None,
        settlement: None,
        projection: None,
        report: args.report.clone(),
    };
    let mut session = session::Session::new(params, transform, paths)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.script.as_ref() {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            session::run(&mut session, BufReader::new(file), &mut out, false)
        }
        None => {
            let stdin = io::stdin();
            writeln!(out, "hoogtetoets session, type `help` for commands")?;
            session::run(&mut session, stdin.lock(), &mut out, true)
        }
    }
}

/// Defaults, then the JSON file, then explicit flags.
fn resolve_params(args: &ParamArgs) -> Result<Params> {
    let mut params = load_params(args.config.as_deref())?;
    if let Some(series) = args.series.as_ref() {
        params.selection = SettlementSelection::parse_list(series)?.columns().collect();
    }
    if let Some(min) = args.min {
        params.clip_min = min;
    }
    if let Some(max) = args.max {
        params.clip_max = max;
    }
    if let Some(horizons) = args.horizons.as_ref() {
        params.horizons = parse_horizon_list(horizons)?
            .iter()
            .map(|h| h.years())
            .collect();
    }
    if let Some(threshold) = args.threshold {
        if !threshold.is_finite() {
            return Err(HtError::InvalidParameter(format!(
                "threshold must be finite, got {}",
                threshold
            ))
            .into());
        }
        params.threshold_m = threshold;
    }
    if let Some(year) = args.reference_year {
        params.reference_year = Some(year);
    }
    if let Some(year) = args.base_year {
        params.base_year = year;
    }
    // Surface a bad combination before any file is read.
    params.clip_range()?;
    Ok(params)
}

fn load_params(path: Option<&Path>) -> Result<Params> {
    let Some(path) = path else {
        return Ok(Params::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    Params::from_json_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn parse_horizon_list(input: &str) -> Result<Vec<PlanningHorizon>> {
    let mut years = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: u32 = trimmed
            .parse()
            .with_context(|| format!("invalid horizon '{}': expected whole years", trimmed))?;
        years.push(value);
    }
    if years.is_empty() {
        return Err(anyhow!("horizon list was empty"));
    }
    Ok(PlanningHorizon::from_catalog_list(&years)?)
}

/// `out/result.csv` + `map` -> `out/result_map.csv`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("hoogtetoets");
    path.with_file_name(format!("{}_{}.csv", stem, suffix))
}

fn inspect_report(survey: &Survey) -> String {
    let table = &survey.table;
    let mut report = String::new();
    report.push_str(&format!("  sha256: {}\n", survey.identity.as_str()));
    report.push_str(&format!("  rows: {}\n", table.len()));
    report.push_str(&format!("  columns: {}\n", table.headers().len()));

    report.push_str("  keys:\n");
    for name in table.headers() {
        match table.column(name) {
            Ok(values) => {
                let nan = values.iter().filter(|v| v.is_nan()).count();
                let (min, max) = values
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold(None, |acc: Option<(f64, f64)>, &v| {
                        Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
                    })
                    .map_or(("n/a".to_string(), "n/a".to_string()), |(lo, hi)| {
                        (format!("{:.3}", lo), format!("{:.3}", hi))
                    });
                report.push_str(&format!(
                    "    - {}: count={}, nan={}, min={}, max={}\n",
                    name,
                    values.len() - nan,
                    nan,
                    min,
                    max
                ));
            }
            Err(_) => report.push_str(&format!("    - {}: text\n", name)),
        }
    }

    let mut projection_columns: Vec<&str> = SETTLEMENT_COLUMNS.to_vec();
    projection_columns.push("z5");
    let stages = [
        ("elevation profile", ELEVATION_COLUMNS.to_vec()),
        ("settlement", SETTLEMENT_COLUMNS.to_vec()),
        ("projection", projection_columns),
        ("map", vec!["x", "y"]),
    ];
    report.push_str("  outputs:\n");
    for (stage, required) in stages {
        let missing = table.missing(&required);
        if missing.is_empty() {
            report.push_str(&format!("    - {}: yes\n", stage));
        } else {
            report.push_str(&format!(
                "    - {}: no (missing {})\n",
                stage,
                missing.join(", ")
            ));
        }
    }
    report
}
