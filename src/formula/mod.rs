//! 时间逻辑公式：解析得到的 [`Expr`] 经 [`resolve`] 绑定到库所后成为 [`Formula`]，
//! 再由 [`evaluate`] 在区域图的时间轴上求出满足集。
mod eval;
mod parser;

pub use eval::evaluate;
pub use parser::{FormulaSyntaxError, parse_formula};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagram::Diagram;
use crate::net::core::{Model, Slot};
use crate::net::ids::PlaceId;
use crate::net::structure::Weight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Less,
    LessEq,
    Equal,
    GreaterEq,
    Greater,
}

impl Comparison {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Less => lhs < rhs,
            Comparison::LessEq => lhs <= rhs,
            Comparison::Equal => lhs == rhs,
            Comparison::GreaterEq => lhs >= rhs,
            Comparison::Greater => lhs > rhs,
        }
    }

    pub fn is_strict(self) -> bool {
        matches!(self, Comparison::Less | Comparison::Greater)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::LessEq => "<=",
            Comparison::Equal => "==",
            Comparison::GreaterEq => ">=",
            Comparison::Greater => ">",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Relative time window `[lower, upper]` of a bounded operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub lower: f64,
    pub upper: f64,
}

impl Window {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Formula as written, places still referenced by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    True,
    False,
    Atom {
        place: String,
        cmp: Comparison,
        constant: f64,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Until(Box<Expr>, Box<Expr>, Window),
    Eventually(Window, Box<Expr>),
    Always(Window, Box<Expr>),
}

impl Expr {
    pub fn atom(place: impl Into<String>, cmp: Comparison, constant: f64) -> Self {
        Expr::Atom {
            place: place.into(),
            cmp,
            constant,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::True => write!(f, "true"),
            Expr::False => write!(f, "false"),
            Expr::Atom {
                place,
                cmp,
                constant,
            } => write!(f, "{} {} {}", place, cmp, constant),
            Expr::Not(e) => write!(f, "¬({})", e),
            Expr::And(e1, e2) => write!(f, "({} ∧ {})", e1, e2),
            Expr::Or(e1, e2) => write!(f, "({} ∨ {})", e1, e2),
            Expr::Until(e1, e2, w) => write!(f, "({} U{} {})", e1, w, e2),
            Expr::Eventually(w, e) => write!(f, "F{} ({})", w, e),
            Expr::Always(w, e) => write!(f, "G{} ({})", w, e),
        }
    }
}

/// A place reference after name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceRef {
    pub id: PlaceId,
    pub slot: usize,
    pub name: String,
}

/// 解析完成、可直接求值的公式。派生算子已展开为 `Until`。
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    True,
    False,
    Fluid {
        place: PlaceRef,
        cmp: Comparison,
        constant: f64,
    },
    Discrete {
        place: PlaceRef,
        cmp: Comparison,
        count: Weight,
    },
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Until {
        lhs: Box<Formula>,
        rhs: Box<Formula>,
        window: Window,
    },
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Fluid {
                place,
                cmp,
                constant,
            } => write!(f, "{} {} {}", place.name, cmp, constant),
            Formula::Discrete { place, cmp, count } => {
                write!(f, "{} {} {}", place.name, cmp, count)
            }
            Formula::Not(e) => write!(f, "¬({})", e),
            Formula::And(e1, e2) => write!(f, "({} ∧ {})", e1, e2),
            Formula::Or(e1, e2) => write!(f, "({} ∨ {})", e1, e2),
            Formula::Until { lhs, rhs, window } => write!(f, "({} U{} {})", lhs, window, rhs),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("unknown place `{0}`")]
    UnknownPlace(String),
    #[error("invalid time parameter {name} = {value}")]
    InvalidTimeParameter { name: &'static str, value: f64 },
    #[error("place `{place}` is discrete, {value} is not a token count")]
    NonIntegralCount { place: String, value: f64 },
    #[error("place `{place}` compared against non-finite constant {value}")]
    InvalidConstant { place: String, value: f64 },
    #[error("place `{place}` has no slot {slot} in the region diagram")]
    SlotOutOfRange { place: String, slot: usize },
}

/// Name lookup used while resolving a formula.
pub trait PlaceLookup {
    fn lookup_place(&self, name: &str) -> Option<(PlaceId, Slot)>;
}

impl PlaceLookup for Model {
    fn lookup_place(&self, name: &str) -> Option<(PlaceId, Slot)> {
        let place = self.place_by_name(name)?;
        Some((place, self.slot(place)?))
    }
}

impl PlaceLookup for Diagram {
    fn lookup_place(&self, name: &str) -> Option<(PlaceId, Slot)> {
        self.place_by_name(name).map(|(id, info)| (id, info.slot))
    }
}

fn check_window(window: Window) -> Result<Window, FormulaError> {
    if !(window.lower.is_finite() && window.lower >= 0.0) {
        return Err(FormulaError::InvalidTimeParameter {
            name: "lower bound",
            value: window.lower,
        });
    }
    if !(window.upper.is_finite() && window.upper >= window.lower) {
        return Err(FormulaError::InvalidTimeParameter {
            name: "upper bound",
            value: window.upper,
        });
    }
    Ok(window)
}

/// 绑定库所名并展开派生算子；任何错误都在求值之前报告。
pub fn resolve(expr: &Expr, places: &impl PlaceLookup) -> Result<Formula, FormulaError> {
    let boxed = |e: &Expr| resolve(e, places).map(Box::new);
    Ok(match expr {
        Expr::True => Formula::True,
        Expr::False => Formula::False,
        Expr::Atom {
            place,
            cmp,
            constant,
        } => {
            let (id, slot) = places
                .lookup_place(place)
                .ok_or_else(|| FormulaError::UnknownPlace(place.clone()))?;
            if !constant.is_finite() {
                return Err(FormulaError::InvalidConstant {
                    place: place.clone(),
                    value: *constant,
                });
            }
            match slot {
                Slot::Fluid(slot) => Formula::Fluid {
                    place: PlaceRef {
                        id,
                        slot,
                        name: place.clone(),
                    },
                    cmp: *cmp,
                    constant: *constant,
                },
                Slot::Discrete(slot) => {
                    if constant.fract() != 0.0 || *constant < 0.0 {
                        return Err(FormulaError::NonIntegralCount {
                            place: place.clone(),
                            value: *constant,
                        });
                    }
                    Formula::Discrete {
                        place: PlaceRef {
                            id,
                            slot,
                            name: place.clone(),
                        },
                        cmp: *cmp,
                        count: *constant as Weight,
                    }
                }
            }
        }
        Expr::Not(e) => Formula::Not(boxed(e)?),
        Expr::And(e1, e2) => Formula::And(boxed(e1)?, boxed(e2)?),
        Expr::Or(e1, e2) => Formula::Or(boxed(e1)?, boxed(e2)?),
        Expr::Until(e1, e2, window) => Formula::Until {
            lhs: boxed(e1)?,
            rhs: boxed(e2)?,
            window: check_window(*window)?,
        },
        Expr::Eventually(window, e) => Formula::Until {
            lhs: Box::new(Formula::True),
            rhs: boxed(e)?,
            window: check_window(*window)?,
        },
        Expr::Always(window, e) => Formula::Not(Box::new(Formula::Until {
            lhs: Box::new(Formula::True),
            rhs: Box::new(Formula::Not(boxed(e)?)),
            window: check_window(*window)?,
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Place, Transition};

    fn model() -> Model {
        let mut model = Model::empty();
        model.add_place(Place::discrete("on", 1));
        model.add_place(Place::fluid("tank", 10.0));
        model.add_transition(Transition::fluid("drain", 1.0));
        model
    }

    #[test]
    fn resolves_atoms_by_place_kind() {
        let model = model();
        let fluid = resolve(&Expr::atom("tank", Comparison::GreaterEq, 5.0), &model).unwrap();
        assert!(matches!(fluid, Formula::Fluid { ref place, .. } if place.slot == 0));
        let discrete = resolve(&Expr::atom("on", Comparison::Equal, 1.0), &model).unwrap();
        assert!(matches!(discrete, Formula::Discrete { count: 1, .. }));
        assert_eq!(discrete.to_string(), "on == 1");
    }

    #[test]
    fn rejects_unknown_places_and_bad_windows() {
        let model = model();
        let unknown = Expr::Not(Box::new(Expr::atom("pump", Comparison::Less, 1.0)));
        assert_eq!(
            resolve(&unknown, &model),
            Err(FormulaError::UnknownPlace("pump".into()))
        );
        let reversed = Expr::Eventually(
            Window::new(3.0, 1.0),
            Box::new(Expr::atom("tank", Comparison::Less, 1.0)),
        );
        assert!(matches!(
            resolve(&reversed, &model),
            Err(FormulaError::InvalidTimeParameter { name: "upper bound", .. })
        ));
        let fractional = Expr::atom("on", Comparison::GreaterEq, 0.5);
        assert!(matches!(
            resolve(&fractional, &model),
            Err(FormulaError::NonIntegralCount { .. })
        ));
    }

    #[test]
    fn derived_operators_expand_to_until() {
        let model = model();
        let always = Expr::Always(
            Window::new(0.0, 2.0),
            Box::new(Expr::atom("tank", Comparison::Greater, 1.0)),
        );
        let resolved = resolve(&always, &model).unwrap();
        assert_eq!(
            resolved.to_string(),
            "¬((true U[0, 2] ¬(tank > 1)))"
        );
    }
}
