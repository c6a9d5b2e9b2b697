//! 运行报告与诊断输出。
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::diagram::{Diagram, Termination};
use crate::interval::IntervalSet;

/// Receiver for user-facing messages of a run.
pub trait DiagnosticsSink {
    fn text(&mut self, message: &str);
    fn error(&mut self, message: &str);
    fn success(&mut self, message: &str);
}

/// 转发到 `log`。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn text(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&mut self, message: &str) {
        log::error!("{}", message);
    }

    fn success(&mut self, message: &str) {
        log::info!("{}", message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Text,
    Error,
    Success,
}

/// Keeps every message, for tests and for callers that render them later.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub entries: Vec<(DiagnosticLevel, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, level: DiagnosticLevel) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(l, _)| *l == level)
            .map(|(_, m)| m.as_str())
    }
}

impl DiagnosticsSink for MemorySink {
    fn text(&mut self, message: &str) {
        self.entries.push((DiagnosticLevel::Text, message.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.entries.push((DiagnosticLevel::Error, message.to_string()));
    }

    fn success(&mut self, message: &str) {
        self.entries
            .push((DiagnosticLevel::Success, message.to_string()));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub formula: String,
    pub at_time: f64,
    pub satisfaction: String,
    pub probability: f64,
    pub threshold: Option<f64>,
    pub satisfied: bool,
}

impl CheckSummary {
    pub fn new(
        formula: impl fmt::Display,
        at_time: f64,
        satisfaction: &IntervalSet,
        probability: f64,
        threshold: Option<f64>,
        satisfied: bool,
    ) -> Self {
        Self {
            formula: formula.to_string(),
            at_time,
            satisfaction: satisfaction.to_string(),
            probability,
            threshold,
            satisfied,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub model: String,
    pub horizon: f64,
    pub covered_until: f64,
    pub region_count: usize,
    pub termination: Termination,
    pub governing: Option<String>,
    pub diagram_time: Duration,
    pub measure_time: Duration,
    pub grid: Option<(usize, usize)>,
    pub check: Option<CheckSummary>,
}

impl RunReport {
    pub fn new(model: impl Into<String>, diagram: &Diagram, diagram_time: Duration) -> Self {
        Self {
            model: model.into(),
            horizon: diagram.horizon(),
            covered_until: diagram.covered_until(),
            region_count: diagram.region_count(),
            termination: diagram.termination(),
            governing: diagram
                .governing()
                .map(|g| format!("{} ~ {}", g.name, g.distribution)),
            diagram_time,
            measure_time: Duration::ZERO,
            grid: None,
            check: None,
        }
    }

    pub fn total_time(&self) -> Duration {
        self.diagram_time + self.measure_time
    }

    /// 以原有驱动的措辞输出结果。
    pub fn emit(&self, sink: &mut dyn DiagnosticsSink) {
        if let Some(check) = &self.check {
            if check.satisfied {
                sink.success("Yes! The formula is satisfied.");
            } else {
                sink.success("No! The formula is not satisfied.");
            }
            sink.text(&format!("Probability: {}", check.probability));
        }
        if self.termination == Termination::Truncated {
            sink.error(&format!(
                "Region diagram truncated at t = {} (horizon {}).",
                self.covered_until, self.horizon
            ));
        }
        sink.text(&format!("Number of regions: {}", self.region_count));
        sink.text(&format!(
            "Time to generate STD: {} ms",
            self.diagram_time.as_millis()
        ));
        if !self.measure_time.is_zero() {
            sink.text(&format!(
                "Total time computing measures: {} ms",
                self.measure_time.as_millis()
            ));
        }
        sink.text(&format!(
            "Total execution time: {} ms",
            self.total_time().as_millis()
        ));
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "区域图分析报告")?;
        writeln!(f, "模型: {}", self.model)?;
        writeln!(f, "时间上界: {}", self.horizon)?;
        writeln!(f, "覆盖至: {} ({:?})", self.covered_until, self.termination)?;
        writeln!(f, "区域数: {}", self.region_count)?;
        if let Some(governing) = &self.governing {
            writeln!(f, "主导迁移: {}", governing)?;
        }
        writeln!(f, "生成耗时: {:?}", self.diagram_time)?;
        if let Some((rows, cols)) = self.grid {
            writeln!(f, "网格: {} x {}", rows, cols)?;
            writeln!(f, "计算耗时: {:?}", self.measure_time)?;
        }
        if let Some(check) = &self.check {
            writeln!(f, "\n公式: {}", check.formula)?;
            writeln!(f, "满足集: {}", check.satisfaction)?;
            writeln!(f, "t = {} 时的概率: {}", check.at_time, check.probability)?;
            if let Some(threshold) = check.threshold {
                writeln!(f, "阈值: {}", threshold)?;
            }
            writeln!(f, "结论: {}", if check.satisfied { "满足" } else { "不满足" })?;
        }
        Ok(())
    }
}

/// 以空白分隔写出矩阵，每行一条记录。
pub fn write_matrix<P: AsRef<Path>>(path: P, rows: &[Vec<f64>]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        for value in row {
            write!(writer, " {}", value)?;
        }
        writeln!(writer)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramConfig, generate};
    use crate::net::{Model, Place, Transition};

    fn report() -> RunReport {
        let mut model = Model::empty();
        let tank = model.add_place(Place::fluid("tank", 4.0));
        let drain = model.add_transition(Transition::fluid("drain", 2.0));
        model.add_input_arc(tank, drain, 1);
        let diagram =
            generate(&model, model.initial_marking(), &DiagramConfig::with_horizon(5.0)).unwrap();
        RunReport::new("tank", &diagram, Duration::from_millis(3))
    }

    #[test]
    fn emit_uses_driver_wording() {
        let mut report = report();
        report.check = Some(CheckSummary::new(
            "tank >= 1",
            0.0,
            &IntervalSet::full(0.0, 1.5),
            0.25,
            Some(0.5),
            false,
        ));
        let mut sink = MemorySink::new();
        report.emit(&mut sink);
        let successes: Vec<&str> = sink.messages(DiagnosticLevel::Success).collect();
        assert_eq!(successes, vec!["No! The formula is not satisfied."]);
        assert!(sink
            .messages(DiagnosticLevel::Text)
            .any(|m| m == "Number of regions: 2"));
        assert_eq!(sink.messages(DiagnosticLevel::Error).count(), 0);
        assert!(report.to_string().contains("满足集: [0, 1.5]"));
    }

    #[test]
    fn writes_matrix_and_json() {
        let dir = std::env::temp_dir().join(format!("hpng-report-{}", std::process::id()));
        let dat = dir.join("tank_2d.dat");
        write_matrix(&dat, &[vec![0.5, 1.0], vec![0.25, 0.0]]).unwrap();
        assert_eq!(fs::read_to_string(&dat).unwrap(), " 0.5 1\n 0.25 0\n");

        let json = dir.join("report.json");
        crate::net::io::write_json(&json, &report()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["region_count"], 2);
        fs::remove_dir_all(dir).unwrap();
    }
}
