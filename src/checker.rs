//! 请求边界：构造区域图、求公式满足集与概率、扫描网格，以及把这些步骤串起来的
//! [`Checker`] 会话。
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::diagram::{Diagram, generate};
use crate::distribution::Distribution;
use crate::error::CheckError;
use crate::formula::{self, Comparison, Expr, Formula, PlaceLookup, PlaceRef};
use crate::interval::IntervalSet;
use crate::net::{Marking, Model, Slot, load_model};
use crate::probability::{Verdict, probability_from};
use crate::report::{CheckSummary, DiagnosticsSink, RunReport, write_matrix};
use crate::sweep::{GridResult, GridSpec, sweep_curve, sweep_surface};

pub fn build_diagram(model: &Model, marking: Marking, horizon: f64) -> Result<Diagram, CheckError> {
    let config = EngineConfig {
        horizon,
        ..EngineConfig::default()
    };
    build_diagram_with(model, marking, &config)
}

pub fn build_diagram_with(
    model: &Model,
    marking: Marking,
    config: &EngineConfig,
) -> Result<Diagram, CheckError> {
    Ok(generate(model, marking, &config.diagram_config())?)
}

/// Resolves a fluid place of the diagram by name.
pub(crate) fn fluid_place(diagram: &Diagram, name: &str) -> Result<PlaceRef, CheckError> {
    match diagram.lookup_place(name) {
        Some((id, Slot::Fluid(slot))) => Ok(PlaceRef {
            id,
            slot,
            name: name.to_string(),
        }),
        Some((_, Slot::Discrete(_))) => Err(CheckError::InvalidPlaceReference {
            place: name.to_string(),
            reason: "only fluid places can be swept".into(),
        }),
        None => Err(CheckError::UnknownPlace(name.to_string())),
    }
}

pub(crate) fn governing_distribution(diagram: &Diagram) -> Result<&Distribution, CheckError> {
    diagram
        .governing()
        .map(|g| &g.distribution)
        .ok_or(CheckError::MissingFailureTransition)
}

/// `place >= constant`, the atom behind point queries and grid sweeps.
pub(crate) fn level_atom(place: PlaceRef, constant: f64) -> Result<Formula, CheckError> {
    if !constant.is_finite() {
        return Err(CheckError::InvalidTimeParameter {
            name: "constant",
            value: constant,
        });
    }
    Ok(Formula::Fluid {
        place,
        cmp: Comparison::GreaterEq,
        constant,
    })
}

fn check_time(name: &'static str, value: f64) -> Result<f64, CheckError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CheckError::InvalidTimeParameter { name, value })
    }
}

/// Probability that `place >= constant` holds when the governing transition
/// fires, its delay started at `time`.
pub fn evaluate_point(
    diagram: &Diagram,
    place: &str,
    time: f64,
    constant: f64,
) -> Result<f64, CheckError> {
    diagram.require_complete()?;
    let time = check_time("time", time)?;
    let place = fluid_place(diagram, place)?;
    let distribution = governing_distribution(diagram)?;
    let atom = level_atom(place, constant)?;
    let set = formula::evaluate(&atom, diagram)?;
    Ok(probability_from(&set, distribution, time)?)
}

pub fn parse_formula(text: &str) -> Result<Expr, CheckError> {
    Ok(formula::parse_formula(text)?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    /// 公式在 `at_time` 处是否成立。
    pub satisfied: bool,
    pub probability: f64,
    pub satisfaction: IntervalSet,
}

/// Evaluates `formula` on the diagram's time axis and measures the result
/// against the governing distribution started at `at_time`.
pub fn check(diagram: &Diagram, formula: &Expr, at_time: f64) -> Result<CheckOutcome, CheckError> {
    diagram.require_complete()?;
    let at_time = check_time("time", at_time)?;
    let resolved = formula::resolve(formula, diagram)?;
    let distribution = governing_distribution(diagram)?;
    let satisfaction = formula::evaluate(&resolved, diagram)?;
    let probability = probability_from(&satisfaction, distribution, at_time)?;
    log::debug!("{} holds on {}, p = {}", resolved, satisfaction, probability);
    Ok(CheckOutcome {
        satisfied: satisfaction.contains(at_time),
        probability,
        satisfaction,
    })
}

pub fn check_with_threshold(
    diagram: &Diagram,
    formula: &Expr,
    at_time: f64,
    threshold: f64,
) -> Result<(CheckOutcome, Verdict), CheckError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CheckError::InvalidTimeParameter {
            name: "threshold",
            value: threshold,
        });
    }
    let outcome = check(diagram, formula, at_time)?;
    let verdict = Verdict {
        probability: outcome.probability,
        threshold,
        satisfied: outcome.probability >= threshold,
    };
    Ok((outcome, verdict))
}

/// 一次会话：持有模型与配置，每次运行重新构造区域图。
#[derive(Debug, Clone, Default)]
pub struct Checker {
    model: Option<Model>,
    name: String,
    config: EngineConfig,
}

impl Checker {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            model: None,
            name: String::new(),
            config,
        }
    }

    pub fn with_model(model: Model, name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            model: Some(model),
            name: name.into(),
            config,
        }
    }

    pub fn load_model<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CheckError> {
        let path = path.as_ref();
        let model = load_model(path)?;
        self.name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("model")
            .to_string();
        self.model = Some(model);
        Ok(())
    }

    pub fn model(&self) -> Result<&Model, CheckError> {
        self.model.as_ref().ok_or(CheckError::ModelMissing)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn output_path(&self, file: String) -> PathBuf {
        self.config.output_dir.join(file)
    }

    fn build(&self) -> Result<(Diagram, RunReport), CheckError> {
        let model = self.model()?;
        let start = Instant::now();
        let diagram = build_diagram_with(model, model.initial_marking(), &self.config)?;
        let report = RunReport::new(self.name.clone(), &diagram, start.elapsed());
        Ok((diagram, report))
    }

    /// Builds the diagram and writes it as `<output>/<name>_std.dot`.
    pub fn diagram_summary(&self, sink: &mut dyn DiagnosticsSink) -> Result<RunReport, CheckError> {
        let run = || -> Result<RunReport, CheckError> {
            let (diagram, report) = self.build()?;
            diagram.write_dot(self.output_path(format!("{}_std.dot", self.name)))?;
            Ok(report)
        };
        finish(run(), sink)
    }

    /// 2D 曲线，写出 `<output>/<place>_2d.dat`。
    pub fn probability_curve(
        &self,
        place: &str,
        constant: f64,
        times: GridSpec,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<(GridResult, RunReport), CheckError> {
        let run = || -> Result<(GridResult, RunReport), CheckError> {
            let (diagram, mut report) = self.build()?;
            diagram.require_complete()?;
            let start = Instant::now();
            let grid = sweep_curve(&diagram, place, constant, &times.values()?)?;
            report.measure_time = start.elapsed();
            report.grid = Some(grid.dimensions());
            write_matrix(self.output_path(format!("{place}_2d.dat")), &grid.values)?;
            Ok((grid, report))
        };
        finish(run(), sink)
    }

    /// 3D 曲面，写出 `<output>/<place>_3d.dat`。
    pub fn probability_surface(
        &self,
        place: &str,
        times: GridSpec,
        constants: GridSpec,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<(GridResult, RunReport), CheckError> {
        let run = || -> Result<(GridResult, RunReport), CheckError> {
            let (diagram, mut report) = self.build()?;
            diagram.require_complete()?;
            let start = Instant::now();
            let grid = sweep_surface(&diagram, place, &times.values()?, &constants.values()?)?;
            report.measure_time = start.elapsed();
            report.grid = Some(grid.dimensions());
            write_matrix(self.output_path(format!("{place}_3d.dat")), &grid.values)?;
            Ok((grid, report))
        };
        finish(run(), sink)
    }

    /// 解析并检查公式；给出阈值时以概率是否达到阈值作为结论。
    pub fn model_check(
        &self,
        text: &str,
        at_time: f64,
        threshold: Option<f64>,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<(CheckOutcome, RunReport), CheckError> {
        let run = || -> Result<(CheckOutcome, RunReport), CheckError> {
            let expr = parse_formula(text)?;
            let resolved = formula::resolve(&expr, self.model()?)?;
            let (diagram, mut report) = self.build()?;
            let start = Instant::now();
            let (outcome, satisfied) = match threshold {
                Some(threshold) => {
                    let (outcome, verdict) = check_with_threshold(&diagram, &expr, at_time, threshold)?;
                    (outcome, verdict.satisfied)
                }
                None => {
                    let outcome = check(&diagram, &expr, at_time)?;
                    let satisfied = outcome.satisfied;
                    (outcome, satisfied)
                }
            };
            report.measure_time = start.elapsed();
            report.check = Some(CheckSummary::new(
                &resolved,
                at_time,
                &outcome.satisfaction,
                outcome.probability,
                threshold,
                satisfied,
            ));
            Ok((outcome, report))
        };
        finish(run(), sink)
    }
}

/// Reports the run to `sink`: the summary on success, the error otherwise.
fn finish<T: AsReportRef>(
    result: Result<T, CheckError>,
    sink: &mut dyn DiagnosticsSink,
) -> Result<T, CheckError> {
    match &result {
        Ok(value) => value.report().emit(sink),
        Err(err) => sink.error(&err.to_string()),
    }
    result
}

trait AsReportRef {
    fn report(&self) -> &RunReport;
}

impl AsReportRef for RunReport {
    fn report(&self) -> &RunReport {
        self
    }
}

impl<T> AsReportRef for (T, RunReport) {
    fn report(&self) -> &RunReport {
        &self.1
    }
}
