//! Turn-based interactive session: one command per line, each command fully
//! processed (and its results printed) before the next line is read.

use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use hoogtetoets::{
    assess, Assessment, AssessmentRequest, CoordinateTransform, DatasetCache, HtError, Params,
    PlanningHorizon, ProjectionSettings, RangeControl, SettlementSelection, Survey,
};
use tracing::{debug, info, warn};

use crate::output::{summary_lines, write_outputs, OutputPaths};
use crate::parse_horizon_list;

const HELP: &str = "\
commands:
  load <path>         read a survey CSV (cached by content)
  select <ids>        settlement series, e.g. `select agz34` or `select agz34,agz45`
  min <value>         pending minimum clip bound (swell)
  max <value>         pending maximum clip bound (settlement)
  refresh             apply the pending bounds
  horizons <list>     planning periods from 5,10,15,20,25,30
  threshold <value>   dike-table height in m
  year <yyyy>         reference year
  show                print the current state
  compute             run projection and fill
  help                this text
  quit                leave the session";

#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    Load(PathBuf),
    Select(SettlementSelection),
    Min(f64),
    Max(f64),
    Refresh,
    Horizons(Vec<PlanningHorizon>),
    Threshold(f64),
    Year(i32),
    Show,
    Compute,
    Help,
    Quit,
}

/// Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<SessionCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "load" => SessionCommand::Load(PathBuf::from(argument(verb, rest, "a file path")?)),
        "select" => SessionCommand::Select(SettlementSelection::parse_list(rest)?),
        "min" => SessionCommand::Min(number(verb, rest, "a value")?),
        "max" => SessionCommand::Max(number(verb, rest, "a value")?),
        "refresh" => SessionCommand::Refresh,
        "horizons" => SessionCommand::Horizons(parse_horizon_list(rest)?),
        "threshold" => SessionCommand::Threshold(number(verb, rest, "a height")?),
        "year" => {
            let raw = argument(verb, rest, "a year")?;
            SessionCommand::Year(
                raw.parse::<i32>()
                    .with_context(|| format!("invalid year '{}'", raw))?,
            )
        }
        "show" => SessionCommand::Show,
        "compute" | "berekenen" => SessionCommand::Compute,
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => return Err(anyhow!("unknown command '{}' (try `help`)", other)),
    };
    Ok(Some(command))
}

fn argument<'a>(verb: &str, rest: &'a str, what: &str) -> Result<&'a str> {
    if rest.is_empty() {
        Err(anyhow!("`{}` needs {}", verb, what))
    } else {
        Ok(rest)
    }
}

fn number(verb: &str, rest: &str, what: &str) -> Result<f64> {
    let raw = argument(verb, rest, what)?;
    raw.parse::<f64>()
        .with_context(|| format!("invalid number '{}'", raw))
}

pub struct Session {
    cache: DatasetCache,
    transform: Option<Box<dyn CoordinateTransform>>,
    source: Option<PathBuf>,
    params: Params,
    range: RangeControl,
    selection: SettlementSelection,
    horizons: Vec<PlanningHorizon>,
    outputs: OutputPaths,
}

impl Session {
    pub fn new(
        params: Params,
        transform: Option<Box<dyn CoordinateTransform>>,
        outputs: OutputPaths,
    ) -> Result<Self> {
        Ok(Self {
            cache: DatasetCache::new(),
            transform,
            source: None,
            range: params.range_control()?,
            selection: params.settlement_selection(),
            horizons: params.planning_horizons()?,
            params,
            outputs,
        })
    }

    pub fn survey(&self) -> Option<Rc<Survey>> {
        self.cache.current()
    }

    pub fn range(&self) -> &RangeControl {
        &self.range
    }

    pub fn load(&mut self, path: PathBuf, out: &mut dyn Write) -> Result<()> {
        let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let lookup = self
            .cache
            .load(&bytes, self.transform.as_deref())
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if lookup.hit {
            debug!("Reusing cached table {}", lookup.survey.identity);
        } else {
            info!(
                "Loaded {} ({} rows, {} columns)",
                path.display(),
                lookup.survey.table.len(),
                lookup.survey.table.headers().len()
            );
        }
        self.source = Some(path);
        writeln!(
            out,
            "{} rows: {}",
            lookup.survey.table.len(),
            lookup.survey.table.headers().join(", ")
        )?;
        self.render(false, out)?;
        Ok(())
    }

    fn request(&self, run_projection: bool) -> AssessmentRequest {
        AssessmentRequest {
            selection: self.selection.clone(),
            range: self.range.committed(),
            projection: ProjectionSettings {
                reference_year: self.params.reference_year(),
                base_year: self.params.base_year,
                horizons: self.horizons.clone(),
            },
            threshold_m: self.params.threshold_m,
            run_projection,
        }
    }

    /// Recompute and print. Without `run_projection` only the elevation and
    /// settlement stages run, as after any non-compute change.
    pub fn render(&self, run_projection: bool, out: &mut dyn Write) -> Result<Option<Assessment>> {
        let Some(survey) = self.survey() else {
            writeln!(out, "no survey loaded (use `load <path>`)")?;
            return Ok(None);
        };
        let assessment = assess(&survey, &self.request(run_projection));
        for warning in &assessment.warnings {
            warn!("{}", warning);
            writeln!(out, "warning: {}", warning)?;
        }
        for line in summary_lines(&assessment) {
            writeln!(out, "{}", line)?;
        }
        Ok(Some(assessment))
    }

    fn show(&self, out: &mut dyn Write) -> Result<()> {
        let range = self.range();
        let (pending_min, pending_max) = range.pending();
        let committed = range.committed();
        let source = self
            .source
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string());
        let horizons: Vec<String> = self.horizons.iter().map(|h| h.years().to_string()).collect();
        writeln!(out, "file:       {}", source)?;
        writeln!(out, "selection:  {}", self.selection)?;
        writeln!(
            out,
            "clip:       [{:.3}, {:.3}] (pending [{:.3}, {:.3}]{})",
            committed.min(),
            committed.max(),
            pending_min,
            pending_max,
            if range.is_dirty() { ", use `refresh`" } else { "" }
        )?;
        writeln!(out, "horizons:   {}", horizons.join(","))?;
        writeln!(out, "threshold:  {:.3} m", self.params.threshold_m)?;
        writeln!(
            out,
            "year:       {} (base {})",
            self.params.reference_year(),
            self.params.base_year
        )?;
        Ok(())
    }

    /// Apply one command. Returns `false` when the session should end.
    pub fn apply(&mut self, command: SessionCommand, out: &mut dyn Write) -> Result<bool> {
        match command {
            SessionCommand::Load(path) => self.load(path, out)?,
            SessionCommand::Select(selection) => {
                self.selection = selection;
                if self.selection.len() != 1 {
                    writeln!(
                        out,
                        "note: compute needs exactly one series, {} selected",
                        self.selection.len()
                    )?;
                }
                self.render(false, out)?;
            }
            SessionCommand::Min(value) => {
                let snapped = self.range.set_pending_min(value)?;
                writeln!(out, "pending min {:.3} (not applied until `refresh`)", snapped)?;
            }
            SessionCommand::Max(value) => {
                let snapped = self.range.set_pending_max(value)?;
                writeln!(out, "pending max {:.3} (not applied until `refresh`)", snapped)?;
            }
            SessionCommand::Refresh => {
                let committed = self.range.commit()?;
                writeln!(
                    out,
                    "clip range fixed at [{:.3}, {:.3}]",
                    committed.min(),
                    committed.max()
                )?;
                self.render(false, out)?;
            }
            SessionCommand::Horizons(horizons) => {
                self.horizons = horizons;
                self.params.horizons = self.horizons.iter().map(|h| h.years()).collect();
            }
            SessionCommand::Threshold(value) => {
                if !value.is_finite() {
                    return Err(HtError::InvalidParameter(format!(
                        "threshold must be finite, got {}",
                        value
                    ))
                    .into());
                }
                self.params.threshold_m = value;
            }
            SessionCommand::Year(year) => self.params.reference_year = Some(year),
            SessionCommand::Show => self.show(out)?,
            SessionCommand::Compute => {
                if let Some(assessment) = self.render(true, out)? {
                    if let Some(survey) = self.survey() {
                        write_outputs(&survey, &assessment, &self.outputs)?;
                    }
                }
            }
            SessionCommand::Help => writeln!(out, "{}", HELP)?,
            SessionCommand::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Read commands until end of input or `quit`. Command errors are reported
/// and the session continues; only a failing output stream ends it early.
pub fn run<R: BufRead>(
    session: &mut Session,
    input: R,
    out: &mut dyn Write,
    prompt: bool,
) -> Result<()> {
    if prompt {
        write!(out, "> ")?;
        out.flush()?;
    }
    for line in input.lines() {
        let line = line.context("failed to read command")?;
        let keep_going = match parse_command(&line) {
            Ok(Some(command)) => match session.apply(command, out) {
                Ok(keep_going) => keep_going,
                Err(err) => {
                    writeln!(out, "error: {:#}", err)?;
                    true
                }
            },
            Ok(None) => true,
            Err(err) => {
                writeln!(out, "error: {:#}", err)?;
                true
            }
        };
        if !keep_going {
            break;
        }
        if prompt {
            write!(out, "> ")?;
            out.flush()?;
        }
    }
    Ok(())
}
