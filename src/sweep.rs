//! 时间与流体常数网格上的概率扫描。区域图只构造一次，各行在 `rayon` 线程池上并行计算。
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::checker::{fluid_place, governing_distribution, level_atom};
use crate::diagram::Diagram;
use crate::error::CheckError;
use crate::formula::evaluate;
use crate::interval::IntervalSet;
use crate::probability::probability_from;

/// Inclusive range `start, start + step, …, end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl GridSpec {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    pub fn values(&self) -> Result<Vec<f64>, CheckError> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(CheckError::InvalidTimeParameter {
                name: "step",
                value: self.step,
            });
        }
        if !(self.start.is_finite() && self.end.is_finite() && self.start <= self.end) {
            return Err(CheckError::InvalidTimeParameter {
                name: "end",
                value: self.end,
            });
        }
        // 端点在浮点误差内视为包含
        let count = ((self.end - self.start) / self.step + 1e-9).floor() as usize + 1;
        Ok((0..count)
            .map(|i| self.start + i as f64 * self.step)
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GridResult {
    pub place: String,
    pub times: Vec<f64>,
    pub constants: Vec<f64>,
    /// 每个时间点一行，每个常数一列。
    pub values: Vec<Vec<f64>>,
}

impl GridResult {
    pub fn dimensions(&self) -> (usize, usize) {
        (self.times.len(), self.constants.len())
    }
}

/// Probability that `place >= c` holds when the governing transition fires,
/// with its delay started at `t`, for every `t` in `times` and `c` in `constants`.
pub fn sweep_surface(
    diagram: &Diagram,
    place: &str,
    times: &[f64],
    constants: &[f64],
) -> Result<GridResult, CheckError> {
    let place_ref = fluid_place(diagram, place)?;
    let distribution = governing_distribution(diagram)?;
    if let Some(&t) = times.iter().find(|t| !t.is_finite() || **t < 0.0) {
        return Err(CheckError::InvalidTimeParameter {
            name: "time",
            value: t,
        });
    }

    let atoms = constants
        .iter()
        .map(|&constant| level_atom(place_ref.clone(), constant))
        .collect::<Result<Vec<_>, _>>()?;

    let sets: Vec<IntervalSet> = atoms
        .par_iter()
        .map(|atom| evaluate(atom, diagram).map_err(CheckError::from))
        .collect::<Result<_, _>>()?;

    let values: Vec<Vec<f64>> = times
        .par_iter()
        .map(|&t| {
            sets.iter()
                .map(|set| probability_from(set, distribution, t).map_err(CheckError::from))
                .collect::<Result<Vec<f64>, _>>()
        })
        .collect::<Result<_, _>>()?;

    log::debug!(
        "swept {} x {} grid over `{}`",
        times.len(),
        constants.len(),
        place
    );
    Ok(GridResult {
        place: place.to_string(),
        times: times.to_vec(),
        constants: constants.to_vec(),
        values,
    })
}

/// [`sweep_surface`] with a single constant column.
pub fn sweep_curve(
    diagram: &Diagram,
    place: &str,
    constant: f64,
    times: &[f64],
) -> Result<GridResult, CheckError> {
    sweep_surface(diagram, place, times, &[constant])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramConfig, generate};
    use crate::net::{FiringLaw, Model, Place, Transition};

    fn diagram() -> Diagram {
        let mut model = Model::empty();
        let tank = model.add_place(Place::fluid("tank", 10.0));
        let on = model.add_place(Place::discrete("on", 1));
        let drain = model.add_transition(Transition::fluid("drain", 1.0));
        model.add_input_arc(tank, drain, 1);
        model.add_input_arc(on, drain, 1);
        model.add_transition(Transition::stochastic(
            "failure",
            FiringLaw::Uniform { a: 0.0, b: 20.0 },
        ));
        generate(&model, model.initial_marking(), &DiagramConfig::with_horizon(20.0)).unwrap()
    }

    #[test]
    fn grid_spec_is_inclusive() {
        assert_eq!(GridSpec::new(0.0, 1.0, 0.25).values().unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(GridSpec::new(0.0, 0.3, 0.1).values().unwrap().len(), 4);
        assert!(GridSpec::new(0.0, 1.0, 0.0).values().is_err());
        assert!(GridSpec::new(2.0, 1.0, 0.5).values().is_err());
    }

    #[test]
    fn surface_has_one_row_per_time() {
        let diagram = diagram();
        let times = GridSpec::new(0.0, 10.0, 2.5).values().unwrap();
        let constants = GridSpec::new(0.0, 10.0, 5.0).values().unwrap();
        let grid = sweep_surface(&diagram, "tank", &times, &constants).unwrap();
        assert_eq!(grid.dimensions(), (5, 3));
        assert!(grid.values.iter().all(|row| row.len() == 3));
        // tank >= 5 on [0, 5], delay uniform on [0, 20] from t = 0
        assert!((grid.values[0][1] - 0.25).abs() < 1e-12);
        // tank >= 0 everywhere
        assert!((grid.values[0][0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn curve_matches_surface_column() {
        let diagram = diagram();
        let times = [0.0, 1.0, 2.0];
        let curve = sweep_curve(&diagram, "tank", 5.0, &times).unwrap();
        let surface = sweep_surface(&diagram, "tank", &times, &[0.0, 5.0]).unwrap();
        for (row, full) in curve.values.iter().zip(&surface.values) {
            assert_eq!(row[0], full[1]);
        }
        assert!((curve.values[1][0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn rejects_discrete_and_unknown_places() {
        let diagram = diagram();
        assert!(matches!(
            sweep_curve(&diagram, "on", 1.0, &[0.0]),
            Err(CheckError::InvalidPlaceReference { .. })
        ));
        assert!(matches!(
            sweep_curve(&diagram, "pump", 1.0, &[0.0]),
            Err(CheckError::UnknownPlace(_))
        ));
    }

    #[test]
    fn non_finite_levels_are_rejected() {
        let diagram = diagram();
        assert!(matches!(
            sweep_curve(&diagram, "tank", f64::NAN, &[0.0]),
            Err(CheckError::InvalidTimeParameter { name: "constant", .. })
        ));
        assert!(matches!(
            sweep_surface(&diagram, "tank", &[0.0, 1.0], &[0.0, f64::INFINITY]),
            Err(CheckError::InvalidTimeParameter { name: "constant", .. })
        ));
    }
}
