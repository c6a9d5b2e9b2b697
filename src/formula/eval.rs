use crate::diagram::{Diagram, Region};
use crate::interval::{Interval, IntervalSet, MERGE_EPSILON};

use super::{Comparison, Formula, FormulaError, PlaceRef, Window};

/// 公式在区域图时间轴 `[origin, covered_until]` 上的满足集。
pub fn evaluate(formula: &Formula, diagram: &Diagram) -> Result<IntervalSet, FormulaError> {
    let (lo, hi) = (diagram.origin(), diagram.covered_until());
    Ok(match formula {
        Formula::True => IntervalSet::full(lo, hi),
        Formula::False => IntervalSet::empty(),
        Formula::Fluid {
            place,
            cmp,
            constant,
        } => {
            let mut spans = Vec::new();
            for region in diagram.regions() {
                check_slot(place, region.levels.len())?;
                spans.extend(fluid_span(region, place.slot, *cmp, *constant));
            }
            IntervalSet::from_intervals(spans)
        }
        Formula::Discrete { place, cmp, count } => {
            let mut spans = Vec::new();
            for region in diagram.regions() {
                check_slot(place, region.tokens.len())?;
                if cmp.holds(region.tokens[place.slot] as f64, *count as f64) {
                    spans.push(region.span());
                }
            }
            IntervalSet::from_intervals(spans)
        }
        Formula::Not(e) => evaluate(e, diagram)?.complement(lo, hi),
        Formula::And(e1, e2) => evaluate(e1, diagram)?.intersect_closed(&evaluate(e2, diagram)?),
        Formula::Or(e1, e2) => evaluate(e1, diagram)?.union(&evaluate(e2, diagram)?),
        Formula::Until { lhs, rhs, window } => {
            until(&evaluate(lhs, diagram)?, &evaluate(rhs, diagram)?, *window)
        }
    })
}

fn check_slot(place: &PlaceRef, len: usize) -> Result<(), FormulaError> {
    if place.slot < len {
        Ok(())
    } else {
        Err(FormulaError::SlotOutOfRange {
            place: place.name.clone(),
            slot: place.slot,
        })
    }
}

/// 区域内 `level(t) = l0 + r (t - entry)` 与常数比较的解集。
fn fluid_span(region: &Region, slot: usize, cmp: Comparison, constant: f64) -> Option<Interval> {
    let (entry, exit) = (region.entry, region.exit);
    let level = region.levels[slot];
    let rate = region.rates[slot];

    if rate == 0.0 {
        let holds = match cmp {
            Comparison::Equal => (level - constant).abs() <= MERGE_EPSILON,
            _ => cmp.holds(level, constant),
        };
        return holds.then_some(region.span());
    }

    // 水平线与常数的交点
    let crossing = entry + (constant - level) / rate;
    let span = match (cmp, rate > 0.0) {
        (Comparison::Equal, _) => {
            return (entry..=exit)
                .contains(&crossing)
                .then(|| Interval::point(crossing));
        }
        (Comparison::GreaterEq | Comparison::Greater, true)
        | (Comparison::LessEq | Comparison::Less, false) => {
            Interval::new(crossing.max(entry), exit)
        }
        (Comparison::GreaterEq | Comparison::Greater, false)
        | (Comparison::LessEq | Comparison::Less, true) => {
            Interval::new(entry, crossing.min(exit))
        }
    }?;
    // 严格比较在交点处不成立，只剩交点时为空
    if cmp.is_strict() && span.length() <= MERGE_EPSILON {
        return None;
    }
    Some(span)
}

/// `{ t | ∃τ ∈ [t+a, t+b]: ψ2(τ) ∧ ∀τ' ∈ [t, τ]: ψ1(τ') }`。
///
/// 对 ψ1 的每个极大区间 `I`，ψ2 在 `I` 内的每段 `[c, d]` 贡献
/// `[c - b, d - a] ∩ I`。
pub(super) fn until(lhs: &IntervalSet, rhs: &IntervalSet, window: Window) -> IntervalSet {
    let mut out = Vec::new();
    for hold in lhs.iter() {
        let scope = IntervalSet::from_intervals([*hold]);
        for goal in rhs.intersect_closed(&scope).iter() {
            let start = (goal.start - window.upper).max(hold.start);
            let end = (goal.end - window.lower).min(hold.end);
            if let Some(iv) = Interval::new(start, end) {
                out.push(iv);
            }
        }
    }
    IntervalSet::from_intervals(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{DiagramConfig, generate};
    use crate::formula::{Expr, parse_formula, resolve};
    use crate::net::{Model, Place, Transition};

    fn iv(start: f64, end: f64) -> Interval {
        Interval { start, end }
    }

    fn set(parts: &[(f64, f64)]) -> IntervalSet {
        parts.iter().map(|&(s, e)| iv(s, e)).collect()
    }

    fn tank_diagram() -> (Model, Diagram) {
        let mut model = Model::empty();
        let tank = model.add_place(Place::fluid("tank", 10.0));
        let on = model.add_place(Place::discrete("on", 1));
        let drain = model.add_transition(Transition::fluid("drain", 1.0));
        model.add_input_arc(tank, drain, 1);
        model.add_input_arc(on, drain, 1);
        let diagram =
            generate(&model, model.initial_marking(), &DiagramConfig::with_horizon(20.0)).unwrap();
        (model, diagram)
    }

    fn sat(text: &str, model: &Model, diagram: &Diagram) -> IntervalSet {
        let expr: Expr = parse_formula(text).unwrap();
        evaluate(&resolve(&expr, model).unwrap(), diagram).unwrap()
    }

    #[test]
    fn fluid_atoms_solve_per_region() {
        let (model, diagram) = tank_diagram();
        assert_eq!(sat("tank >= 5", &model, &diagram), set(&[(0.0, 5.0)]));
        assert_eq!(sat("tank < 5", &model, &diagram), set(&[(5.0, 20.0)]));
        assert_eq!(sat("tank == 0", &model, &diagram), set(&[(10.0, 20.0)]));
        assert_eq!(sat("tank == 4", &model, &diagram), set(&[(6.0, 6.0)]));
        assert!(sat("tank > 10", &model, &diagram).is_empty());
    }

    #[test]
    fn discrete_atoms_cover_whole_regions() {
        let (model, diagram) = tank_diagram();
        assert_eq!(sat("on == 1", &model, &diagram), set(&[(0.0, 20.0)]));
        assert!(sat("on >= 2", &model, &diagram).is_empty());
    }

    #[test]
    fn boolean_connectives() {
        let (model, diagram) = tank_diagram();
        assert_eq!(
            sat("!(tank >= 8) & tank > 2", &model, &diagram),
            set(&[(2.0, 8.0)])
        );
        assert_eq!(
            sat("tank >= 8 | tank <= 2", &model, &diagram),
            set(&[(0.0, 2.0), (8.0, 20.0)])
        );
        assert_eq!(sat("true", &model, &diagram), set(&[(0.0, 20.0)]));
    }

    #[test]
    fn negated_point_keeps_the_axis_whole() {
        let (model, diagram) = tank_diagram();
        let rest = sat("!(tank == 4)", &model, &diagram);
        assert_eq!(rest, set(&[(0.0, 20.0)]));
        assert_eq!(rest.len(), 1);
        assert_eq!(
            sat("tank == 4 & on == 1", &model, &diagram),
            set(&[(6.0, 6.0)])
        );
        assert_eq!(
            sat("tank >= 5 & !(tank >= 5)", &model, &diagram),
            set(&[(5.0, 5.0)])
        );
    }

    #[test]
    fn until_reaches_a_degenerate_goal() {
        let result = until(&set(&[(0.0, 10.0)]), &set(&[(5.0, 5.0)]), Window::new(0.0, 3.0));
        assert_eq!(result, set(&[(2.0, 5.0)]));
        assert!(result.contains(5.0));
    }

    #[test]
    fn until_respects_window_and_lhs() {
        let result = until(&set(&[(0.0, 4.0)]), &set(&[(6.0, 8.0)]), Window::new(0.0, 5.0));
        assert!(result.is_empty());
        let result = until(&set(&[(0.0, 10.0)]), &set(&[(6.0, 8.0)]), Window::new(1.0, 2.0));
        assert_eq!(result, set(&[(4.0, 7.0)]));
    }

    #[test]
    fn eventually_on_the_tank() {
        let (model, diagram) = tank_diagram();
        assert_eq!(
            sat("F[0,2] tank <= 3", &model, &diagram),
            set(&[(5.0, 20.0)])
        );
        assert_eq!(
            sat("G[0,2] tank >= 3", &model, &diagram),
            set(&[(0.0, 5.0)])
        );
    }
}
