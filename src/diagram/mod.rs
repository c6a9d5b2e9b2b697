//! 区域图：时间轴被划分为一串区域，每个区域内离散标识不变、流体量线性变化。
//!
//! 区域图由 [`generate`] 构造，构造后只读，可在多个线程间共享。
mod generator;

pub use generator::generate;

use std::fs;
use std::path::Path;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use thiserror::Error;

use crate::distribution::{Distribution, DistributionError};
use crate::interval::Interval;
use crate::net::core::{FireError, ModelError, Slot, escape_label};
use crate::net::ids::{Idx, IndexVec, PlaceId, RegionId, TransitionId};
use crate::net::structure::Weight;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("horizon must be positive, finite and after the marking origin, got {0}")]
    InvalidHorizon(f64),
    #[error("initial marking has {found} {kind} entries, model expects {expected}")]
    MarkingMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("more than {steps} zero-time firings at t = {time}")]
    ZenoBehaviour { time: f64, steps: usize },
    #[error("region diagram covers time up to {reached} only, horizon is {horizon}")]
    HorizonExceeded { reached: f64, horizon: f64 },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("transition `{transition}`: {source}")]
    Distribution {
        transition: String,
        #[source]
        source: DistributionError,
    },
    #[error(transparent)]
    Fire(#[from] FireError),
}

#[derive(Debug, Clone)]
pub struct DiagramConfig {
    /// 探索的最大时间。
    pub horizon: f64,
    /// 同优先级冲突的加权随机选择所用种子，每次构造重新播种。
    pub seed: u64,
    /// 区域数量上限，None 表示不设上限。
    pub max_regions: Option<usize>,
    /// 同一时刻内零时间发生的次数上限。
    pub max_instant_steps: usize,
    pub epsilon: f64,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            horizon: 100.0,
            seed: 42,
            max_regions: Some(100_000),
            max_instant_steps: 1_000,
            epsilon: 1e-9,
        }
    }
}

impl DiagramConfig {
    pub fn with_horizon(horizon: f64) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }
}

/// The event that closed a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RegionEvent {
    /// A timed transition's clock expired and it fired.
    TransitionFired(TransitionId),
    /// A clock expired but the transition lost the conflict or was disabled.
    ClockExpired(TransitionId),
    GuardCrossed(PlaceId),
    BoundaryReached(PlaceId),
    Horizon,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionEdge {
    pub at: f64,
    pub event: RegionEvent,
    /// 在该时刻依次发生的迁移（含零时间迁移）。
    pub fired: Vec<TransitionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub id: RegionId,
    pub entry: f64,
    pub exit: f64,
    pub tokens: Vec<Weight>,
    /// 进入区域时的流体量。
    pub levels: Vec<f64>,
    pub rates: Vec<f64>,
    pub enabled: Vec<TransitionId>,
    /// 进入区域时各计时迁移已累积的使能时间。
    pub clocks: Vec<(TransitionId, f64)>,
}

impl Region {
    pub fn span(&self) -> Interval {
        Interval {
            start: self.entry,
            end: self.exit,
        }
    }

    pub fn duration(&self) -> f64 {
        self.exit - self.entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    Horizon,
    /// 没有计时迁移在运行且所有速率为零，最后一个区域延伸到时间上界。
    Absorbing,
    Truncated,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceInfo {
    pub name: String,
    pub slot: Slot,
}

/// 主导迁移及其发生时间分布。
#[derive(Debug, Clone)]
pub struct Governing {
    pub transition: TransitionId,
    pub name: String,
    pub distribution: Distribution,
}

#[derive(Debug, Clone)]
pub struct Diagram {
    graph: DiGraph<Region, RegionEdge>,
    origin: f64,
    horizon: f64,
    covered_until: f64,
    termination: Termination,
    places: IndexVec<PlaceId, PlaceInfo>,
    transitions: IndexVec<TransitionId, String>,
    governing: Option<Governing>,
}

impl Diagram {
    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn covered_until(&self) -> f64 {
        self.covered_until
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn is_truncated(&self) -> bool {
        self.termination == Termination::Truncated
    }

    pub fn require_complete(&self) -> Result<(), GenerateError> {
        if self.is_truncated() {
            return Err(GenerateError::HorizonExceeded {
                reached: self.covered_until,
                horizon: self.horizon,
            });
        }
        Ok(())
    }

    pub fn region_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.graph.node_weight(NodeIndex::new(id.index()))
    }

    /// 包含时刻 `t` 的区域；落在两个区域边界上时返回后一个。
    pub fn region_at(&self, t: f64) -> Option<&Region> {
        let nodes = self.graph.raw_nodes();
        let idx = nodes.partition_point(|node| node.weight.entry <= t);
        let region = &nodes.get(idx.checked_sub(1)?)?.weight;
        (t <= region.exit).then_some(region)
    }

    /// Regions whose span intersects `[lo, hi]`, in time order.
    pub fn regions_in(&self, lo: f64, hi: f64) -> impl Iterator<Item = &Region> {
        let nodes = self.graph.raw_nodes();
        let first = nodes.partition_point(|node| node.weight.exit < lo);
        nodes[first..]
            .iter()
            .map(|node| &node.weight)
            .take_while(move |region| region.entry <= hi)
    }

    pub fn successors(&self, id: RegionId) -> impl Iterator<Item = (RegionId, &RegionEdge)> {
        self.graph
            .edges(NodeIndex::new(id.index()))
            .map(|edge| (RegionId::from_usize(edge.target().index()), edge.weight()))
    }

    pub fn discrete_sequence(&self) -> Vec<Vec<Weight>> {
        self.regions().map(|region| region.tokens.clone()).collect()
    }

    pub fn place_info(&self, place: PlaceId) -> Option<&PlaceInfo> {
        self.places.get(place)
    }

    pub fn place_by_name(&self, name: &str) -> Option<(PlaceId, &PlaceInfo)> {
        self.places.iter_enumerated().find(|(_, info)| info.name == name)
    }

    pub fn transition_name(&self, transition: TransitionId) -> Option<&str> {
        self.transitions.get(transition).map(String::as_str)
    }

    pub fn governing(&self) -> Option<&Governing> {
        self.governing.as_ref()
    }

    fn describe_event(&self, event: &RegionEvent) -> String {
        let transition = |t: &TransitionId| self.transition_name(*t).unwrap_or("?").to_string();
        let place = |p: &PlaceId| {
            self.place_info(*p)
                .map(|info| info.name.clone())
                .unwrap_or_else(|| "?".into())
        };
        match event {
            RegionEvent::TransitionFired(t) => format!("fire {}", transition(t)),
            RegionEvent::ClockExpired(t) => format!("clock {}", transition(t)),
            RegionEvent::GuardCrossed(p) => format!("guard {}", place(p)),
            RegionEvent::BoundaryReached(p) => format!("bound {}", place(p)),
            RegionEvent::Horizon => "horizon".into(),
        }
    }

    pub fn dot(&self) -> String {
        let discrete: Vec<&str> = self.places_of(|slot| matches!(slot, Slot::Discrete(_)));
        let fluid: Vec<&str> = self.places_of(|slot| matches!(slot, Slot::Fluid(_)));

        let edge_attr = |_, edge: EdgeReference<RegionEdge>| -> String {
            let weight = edge.weight();
            let mut label = format!(
                "t={:.3} {}",
                weight.at,
                escape_label(&self.describe_event(&weight.event))
            );
            let fired: Vec<String> = weight
                .fired
                .iter()
                .filter_map(|t| self.transition_name(*t))
                .map(escape_label)
                .collect();
            if !fired.is_empty() {
                label.push_str(&format!("\\nfired: {}", fired.join(", ")));
            }
            format!("label=\"{}\"", label)
        };

        let node_attr = |_, (_idx, region): (NodeIndex, &Region)| -> String {
            let tokens: Vec<String> = discrete
                .iter()
                .zip(&region.tokens)
                .map(|(name, count)| format!("{}:{}", escape_label(name), count))
                .collect();
            let levels: Vec<String> = fluid
                .iter()
                .zip(region.levels.iter().zip(&region.rates))
                .map(|(name, (level, rate))| format!("{}={:.3} ({:+.3})", escape_label(name), level, rate))
                .collect();
            let mut label = format!("{:?} [{:.3}, {:.3}]", region.id, region.entry, region.exit);
            if !tokens.is_empty() {
                label.push_str(&format!("\\nmarking: {}", tokens.join(", ")));
            }
            if !levels.is_empty() {
                label.push_str(&format!("\\nfluid: {}", levels.join(", ")));
            }
            format!("label=\"{}\", shape=box", label)
        };

        format!(
            "{:?}",
            Dot::with_attr_getters(&self.graph, &[Config::EdgeNoLabel], &edge_attr, &node_attr)
        )
    }

    fn places_of(&self, keep: impl Fn(Slot) -> bool) -> Vec<&str> {
        let mut selected: Vec<(usize, &str)> = self
            .places
            .iter()
            .filter(|info| keep(info.slot))
            .map(|info| match info.slot {
                Slot::Discrete(i) | Slot::Fluid(i) => (i, info.name.as_str()),
            })
            .collect();
        selected.sort_by_key(|(slot, _)| *slot);
        selected.into_iter().map(|(_, name)| name).collect()
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let dot = self.dot();
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Model, Place, Transition};

    fn drain_diagram() -> Diagram {
        let mut model = Model::empty();
        let tank = model.add_place(Place::fluid("tank", 10.0));
        let on = model.add_place(Place::discrete("on", 1));
        let drain = model.add_transition(Transition::fluid("drain", 1.0));
        model.add_input_arc(tank, drain, 1);
        model.add_input_arc(on, drain, 1);
        let marking = model.initial_marking();
        generate(&model, marking, &DiagramConfig::with_horizon(20.0)).unwrap()
    }

    #[test]
    fn point_and_range_queries() {
        let diagram = drain_diagram();
        assert_eq!(diagram.region_count(), 2);
        assert_eq!(diagram.region_at(3.0).unwrap().id, RegionId::new(0));
        assert_eq!(diagram.region_at(10.0).unwrap().id, RegionId::new(1));
        assert_eq!(diagram.region_at(20.0).unwrap().id, RegionId::new(1));
        assert!(diagram.region_at(20.5).is_none());
        assert_eq!(diagram.regions_in(0.0, 5.0).count(), 1);
        assert_eq!(diagram.regions_in(5.0, 15.0).count(), 2);
        assert_eq!(diagram.regions_in(12.0, 15.0).count(), 1);
    }

    #[test]
    fn successors_follow_time() {
        let diagram = drain_diagram();
        let next: Vec<_> = diagram.successors(RegionId::new(0)).collect();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].0, RegionId::new(1));
        assert_eq!(next[0].1.event, RegionEvent::BoundaryReached(PlaceId::new(0)));
        assert_eq!(diagram.successors(RegionId::new(1)).count(), 0);
    }

    #[test]
    fn dot_labels_regions_and_events() {
        let dot = drain_diagram().dot();
        assert!(dot.contains("r0 [0.000, 10.000]"));
        assert!(dot.contains("tank=10.000 (-1.000)"));
        assert!(dot.contains("bound tank"));
    }
}
