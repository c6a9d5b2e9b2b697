//! 混合 Petri 网静态结构元素：库所、迁移、守卫、弧描述与标识。
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::ids::{PlaceId, TransitionId};

pub type Weight = u64;

/// 库所种类：离散库所持有整数令牌，流体库所持有连续流体量。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlaceKind {
    Discrete {
        tokens: Weight,
        #[serde(default)]
        capacity: Option<Weight>,
    },
    Fluid {
        level: f64,
        #[serde(default)]
        capacity: Option<f64>,
    },
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub kind: PlaceKind,
}

impl Place {
    pub fn discrete(name: impl Into<String>, tokens: Weight) -> Self {
        Self {
            name: name.into(),
            kind: PlaceKind::Discrete {
                tokens,
                capacity: None,
            },
        }
    }

    pub fn fluid(name: impl Into<String>, level: f64) -> Self {
        Self {
            name: name.into(),
            kind: PlaceKind::Fluid {
                level,
                capacity: None,
            },
        }
    }

    /// Bounds the place. Discrete capacities are truncated to whole tokens.
    pub fn with_capacity(mut self, bound: f64) -> Self {
        match &mut self.kind {
            PlaceKind::Discrete { capacity, .. } => *capacity = Some(bound.max(0.0) as Weight),
            PlaceKind::Fluid { capacity, .. } => *capacity = Some(bound),
        }
        self
    }

    pub fn is_fluid(&self) -> bool {
        matches!(self.kind, PlaceKind::Fluid { .. })
    }
}

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PlaceKind::Discrete { tokens, .. } => {
                f.debug_tuple("Discrete").field(&self.name).field(&tokens).finish()
            }
            PlaceKind::Fluid { level, .. } => {
                f.debug_tuple("Fluid").field(&self.name).field(&level).finish()
            }
        }
    }
}

/// 随机迁移的发生时间分布。`General` 携带以 `x` 为自变量的 CDF 表达式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FiringLaw {
    Exponential { rate: f64 },
    Gamma { shape: f64, rate: f64 },
    Uniform { a: f64, b: f64 },
    Normal { mu: f64, sigma: f64 },
    General { cdf: String },
}

impl FiringLaw {
    pub fn family(&self) -> &'static str {
        match self {
            FiringLaw::Exponential { .. } => "exponential",
            FiringLaw::Gamma { .. } => "gamma",
            FiringLaw::Uniform { .. } => "uniform",
            FiringLaw::Normal { .. } => "normal",
            FiringLaw::General { .. } => "general",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransitionKind {
    Immediate,
    Deterministic { delay: f64 },
    Stochastic(FiringLaw),
    Fluid { rate: f64 },
}

impl TransitionKind {
    /// Transitions driven by an enabling clock.
    pub fn is_timed(&self) -> bool {
        matches!(
            self,
            TransitionKind::Deterministic { .. } | TransitionKind::Stochastic(_)
        )
    }
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    pub kind: TransitionKind,
    /// 优先级越高越先发生。
    #[serde(default)]
    pub priority: u32,
    /// 同优先级冲突时的加权随机份额，必须为正。
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Transition {
    pub fn new(name: impl Into<String>, kind: TransitionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            priority: 0,
            weight: default_weight(),
        }
    }

    pub fn immediate(name: impl Into<String>) -> Self {
        Self::new(name, TransitionKind::Immediate)
    }

    pub fn deterministic(name: impl Into<String>, delay: f64) -> Self {
        Self::new(name, TransitionKind::Deterministic { delay })
    }

    pub fn stochastic(name: impl Into<String>, law: FiringLaw) -> Self {
        Self::new(name, TransitionKind::Stochastic(law))
    }

    pub fn fluid(name: impl Into<String>, rate: f64) -> Self {
        Self::new(name, TransitionKind::Fluid { rate })
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition")
            .field(&self.name)
            .field(&self.kind)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardKind {
    AtLeast,
    AtMost,
}

/// 流体库所上的守卫：只有当 `level >= threshold`（或 `<=`）时迁移才可使能。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    pub transition: TransitionId,
    pub place: PlaceId,
    pub kind: GuardKind,
    pub threshold: f64,
}

impl Guard {
    /// 点语义：在给定时刻是否成立。
    pub fn holds_at(&self, level: f64, epsilon: f64) -> bool {
        match self.kind {
            GuardKind::AtLeast => level >= self.threshold - epsilon,
            GuardKind::AtMost => level <= self.threshold + epsilon,
        }
    }

    /// 右极限语义：在紧随当前时刻的开区间上是否成立。
    pub fn holds_after(&self, level: f64, rate: f64, epsilon: f64) -> bool {
        let on_threshold = (level - self.threshold).abs() <= epsilon;
        match self.kind {
            GuardKind::AtLeast => level > self.threshold + epsilon || (on_threshold && rate >= 0.0),
            GuardKind::AtMost => level < self.threshold - epsilon || (on_threshold && rate <= 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    #[default]
    Input,
    Output,
    Inhibitor,
}

fn default_arc_weight() -> Weight {
    1
}

/// 模型文件中按名称引用的弧。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcSpec {
    pub place: String,
    pub transition: String,
    #[serde(default)]
    pub direction: ArcDirection,
    #[serde(default = "default_arc_weight")]
    pub weight: Weight,
}

/// 模型文件中按名称引用的守卫。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSpec {
    pub transition: String,
    pub place: String,
    pub kind: GuardKind,
    pub threshold: f64,
}

/// 全状态快照：每个离散库所的令牌数，每个流体库所的流体量，以及时间原点。
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Marking {
    pub tokens: Vec<Weight>,
    pub levels: Vec<f64>,
    #[serde(default)]
    pub origin: f64,
}

impl Marking {
    pub fn new(tokens: Vec<Weight>, levels: Vec<f64>) -> Self {
        Self {
            tokens,
            levels,
            origin: 0.0,
        }
    }

    pub fn with_origin(mut self, origin: f64) -> Self {
        self.origin = origin;
        self
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marking")
            .field("tokens", &self.tokens)
            .field("levels", &self.levels)
            .field("origin", &self.origin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(kind: GuardKind) -> Guard {
        Guard {
            transition: TransitionId::new(0),
            place: PlaceId::new(0),
            kind,
            threshold: 5.0,
        }
    }

    #[test]
    fn guard_point_semantics_include_threshold() {
        assert!(guard(GuardKind::AtLeast).holds_at(5.0, 1e-9));
        assert!(!guard(GuardKind::AtLeast).holds_at(4.0, 1e-9));
        assert!(guard(GuardKind::AtMost).holds_at(5.0, 1e-9));
    }

    #[test]
    fn guard_right_limit_follows_rate_direction() {
        let at_least = guard(GuardKind::AtLeast);
        assert!(at_least.holds_after(5.0, 1.0, 1e-9));
        assert!(!at_least.holds_after(5.0, -1.0, 1e-9));
        let at_most = guard(GuardKind::AtMost);
        assert!(at_most.holds_after(5.0, -1.0, 1e-9));
        assert!(!at_most.holds_after(5.0, 1.0, 1e-9));
    }

    #[test]
    fn capacity_applies_to_both_kinds() {
        let place = Place::discrete("buffer", 1).with_capacity(3.0);
        assert_eq!(
            place.kind,
            PlaceKind::Discrete {
                tokens: 1,
                capacity: Some(3)
            }
        );
        assert!(Place::fluid("tank", 2.0).with_capacity(10.0).is_fluid());
    }
}
