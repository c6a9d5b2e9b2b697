//! Firing-time distributions and their cumulative distribution functions.
//!
//! 命名分布族的 CDF 由 `statrs` 给出；`General` 分布持有一个编译好的 `evalexpr`
//! 表达式，变量为 `x`（别名 `t`）。
use std::fmt;

use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value};
use statrs::distribution::{
    ContinuousCDF, Exp, Gamma as GammaLaw, Normal as NormalLaw, Uniform as UniformLaw,
};
use thiserror::Error;

use crate::net::structure::{FiringLaw, TransitionKind};

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("invalid {family} parameters: {reason}")]
    InvalidParameters {
        family: &'static str,
        reason: String,
    },
    #[error("cdf expression `{expression}` is unusable: {reason}")]
    Expression { expression: String, reason: String },
    #[error("{0} transitions have no firing-time distribution")]
    NoLaw(&'static str),
}

/// A compiled CDF expression. Dropping it releases the parsed tree.
#[derive(Debug, Clone)]
pub struct CdfExpression {
    source: String,
    tree: Node,
}

impl CdfExpression {
    pub fn compile(source: &str) -> Result<Self, DistributionError> {
        let fail = |reason: String| DistributionError::Expression {
            expression: source.to_string(),
            reason,
        };
        if source.trim().is_empty() {
            return Err(fail("expression is empty".into()));
        }
        let tree = evalexpr::build_operator_tree(source).map_err(|e| fail(e.to_string()))?;
        let compiled = Self {
            source: source.to_string(),
            tree,
        };
        // 未知标识符只会在求值时暴露
        compiled.evaluate(1.0)?;
        Ok(compiled)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, x: f64) -> Result<f64, DistributionError> {
        let fail = |reason: String| DistributionError::Expression {
            expression: self.source.clone(),
            reason,
        };
        let mut context = HashMapContext::new();
        for name in ["x", "t"] {
            context
                .set_value(name.into(), Value::Float(x))
                .map_err(|e| fail(e.to_string()))?;
        }
        let value = self
            .tree
            .eval_number_with_context(&context)
            .map_err(|e| fail(e.to_string()))?;
        if value.is_nan() {
            return Err(fail(format!("evaluates to NaN at x = {x}")));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone)]
pub enum Distribution {
    Deterministic { delay: f64 },
    Exponential { rate: f64 },
    Gamma { shape: f64, rate: f64 },
    Uniform { a: f64, b: f64 },
    Normal { mu: f64, sigma: f64 },
    General(CdfExpression),
}

fn invalid<E: fmt::Display>(family: &'static str) -> impl Fn(E) -> DistributionError {
    move |err| DistributionError::InvalidParameters {
        family,
        reason: err.to_string(),
    }
}

fn ensure(family: &'static str, ok: bool, reason: &str) -> Result<(), DistributionError> {
    if ok {
        Ok(())
    } else {
        Err(DistributionError::InvalidParameters {
            family,
            reason: reason.to_string(),
        })
    }
}

impl Distribution {
    pub fn from_law(law: &FiringLaw) -> Result<Self, DistributionError> {
        let family = law.family();
        let distribution = match law {
            FiringLaw::Exponential { rate } => {
                ensure(family, rate.is_finite() && *rate > 0.0, "rate must be positive")?;
                Distribution::Exponential { rate: *rate }
            }
            FiringLaw::Gamma { shape, rate } => {
                ensure(
                    family,
                    shape.is_finite() && *shape > 0.0 && rate.is_finite() && *rate > 0.0,
                    "shape and rate must be positive",
                )?;
                Distribution::Gamma {
                    shape: *shape,
                    rate: *rate,
                }
            }
            FiringLaw::Uniform { a, b } => {
                ensure(family, a.is_finite() && b.is_finite() && a < b, "need a < b")?;
                Distribution::Uniform { a: *a, b: *b }
            }
            FiringLaw::Normal { mu, sigma } => {
                ensure(
                    family,
                    mu.is_finite() && sigma.is_finite() && *sigma > 0.0,
                    "sigma must be positive",
                )?;
                Distribution::Normal {
                    mu: *mu,
                    sigma: *sigma,
                }
            }
            FiringLaw::General { cdf } => Distribution::General(CdfExpression::compile(cdf)?),
        };
        // statrs 自身的参数校验
        distribution.cdf(0.0)?;
        Ok(distribution)
    }

    pub fn for_transition(kind: &TransitionKind) -> Result<Self, DistributionError> {
        match kind {
            TransitionKind::Immediate => Ok(Distribution::Deterministic { delay: 0.0 }),
            TransitionKind::Deterministic { delay } => {
                ensure("deterministic", delay.is_finite() && *delay >= 0.0, "delay must be non-negative")?;
                Ok(Distribution::Deterministic { delay: *delay })
            }
            TransitionKind::Stochastic(law) => Self::from_law(law),
            TransitionKind::Fluid { .. } => Err(DistributionError::NoLaw("fluid")),
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Distribution::Deterministic { .. } => "deterministic",
            Distribution::Exponential { .. } => "exponential",
            Distribution::Gamma { .. } => "gamma",
            Distribution::Uniform { .. } => "uniform",
            Distribution::Normal { .. } => "normal",
            Distribution::General(_) => "general",
        }
    }

    /// `F(x) = P(X <= x)`, clamped to `[0, 1]`.
    pub fn cdf(&self, x: f64) -> Result<f64, DistributionError> {
        if x.is_nan() || x == f64::NEG_INFINITY {
            return Ok(0.0);
        }
        if x == f64::INFINITY {
            return Ok(1.0);
        }
        let value = match self {
            Distribution::Deterministic { delay } => {
                if x >= *delay {
                    1.0
                } else {
                    0.0
                }
            }
            Distribution::Exponential { rate } => {
                Exp::new(*rate).map_err(invalid("exponential"))?.cdf(x)
            }
            Distribution::Gamma { shape, rate } => {
                if x <= 0.0 {
                    0.0
                } else {
                    GammaLaw::new(*shape, *rate).map_err(invalid("gamma"))?.cdf(x)
                }
            }
            Distribution::Uniform { a, b } => {
                UniformLaw::new(*a, *b).map_err(invalid("uniform"))?.cdf(x)
            }
            Distribution::Normal { mu, sigma } => {
                NormalLaw::new(*mu, *sigma).map_err(invalid("normal"))?.cdf(x)
            }
            Distribution::General(expression) => {
                if x < 0.0 {
                    0.0
                } else {
                    expression.evaluate(x)?
                }
            }
        };
        Ok(value.clamp(0.0, 1.0))
    }

    /// `P(X < x)`: differs from [`Distribution::cdf`] only where the law has an atom.
    pub fn cdf_before(&self, x: f64) -> Result<f64, DistributionError> {
        match self {
            Distribution::Deterministic { delay } if x.is_finite() => {
                Ok(if x > *delay { 1.0 } else { 0.0 })
            }
            Distribution::General(_) if x <= 0.0 => Ok(0.0),
            _ => self.cdf(x),
        }
    }

    /// `P(start <= X <= end)`.
    pub fn mass(&self, start: f64, end: f64) -> Result<f64, DistributionError> {
        Ok((self.cdf(end)? - self.cdf_before(start)?).max(0.0))
    }

    /// 非主导随机迁移在区域图中使用的确定化延迟：均值，`General` 取中位数。
    pub fn characteristic_delay(&self) -> Result<f64, DistributionError> {
        match self {
            Distribution::Deterministic { delay } => Ok(*delay),
            Distribution::Exponential { rate } => Ok(1.0 / rate),
            Distribution::Gamma { shape, rate } => Ok(shape / rate),
            Distribution::Uniform { a, b } => Ok((a + b) / 2.0),
            Distribution::Normal { mu, .. } => Ok(mu.max(0.0)),
            Distribution::General(_) => self.median(),
        }
    }

    fn median(&self) -> Result<f64, DistributionError> {
        let mut hi = 1.0;
        while self.cdf(hi)? < 0.5 {
            hi *= 2.0;
            if hi > 1e12 {
                return Ok(f64::INFINITY);
            }
        }
        let mut lo = 0.0;
        for _ in 0..200 {
            if hi - lo <= 1e-12 * hi.max(1.0) {
                break;
            }
            let mid = 0.5 * (lo + hi);
            if self.cdf(mid)? >= 0.5 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Deterministic { delay } => write!(f, "Det({delay})"),
            Distribution::Exponential { rate } => write!(f, "Exp({rate})"),
            Distribution::Gamma { shape, rate } => write!(f, "Gamma({shape}, {rate})"),
            Distribution::Uniform { a, b } => write!(f, "Uniform({a}, {b})"),
            Distribution::Normal { mu, sigma } => write!(f, "Normal({mu}, {sigma})"),
            Distribution::General(expression) => write!(f, "General({})", expression.source()),
        }
    }
}
