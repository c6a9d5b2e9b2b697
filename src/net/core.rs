//! 运行时：混合网的使能判定、离散发生语义与流体速率计算。
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

use crate::distribution::Distribution;
use crate::net::ids::{Idx, IndexVec, PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::structure::{
    FiringLaw, Guard, Marking, Place, PlaceKind, Transition, TransitionKind, Weight,
};

#[derive(Debug, Error)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
    #[error("fluid transition {0:?} has no discrete firing")]
    Continuous(TransitionId),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate place name `{0}`")]
    DuplicatePlace(String),
    #[error("duplicate transition name `{0}`")]
    DuplicateTransition(String),
    #[error("unknown place `{0}`")]
    UnknownPlace(String),
    #[error("unknown transition `{0}`")]
    UnknownTransition(String),
    #[error("arc between `{place}` and `{transition}` is not allowed: {reason}")]
    InvalidArc {
        place: String,
        transition: String,
        reason: &'static str,
    },
    #[error("invalid {name} = {value} on `{owner}`")]
    InvalidParameter {
        owner: String,
        name: &'static str,
        value: f64,
    },
    #[error("guard of `{transition}` must reference a fluid place, got `{place}`")]
    GuardOnDiscretePlace { transition: String, place: String },
    #[error("firing law of `{transition}` is invalid: {reason}")]
    InvalidLaw { transition: String, reason: String },
}

/// 库所在标识向量中的位置：离散库所与流体库所各自连续编号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Slot {
    Discrete(usize),
    Fluid(usize),
}

/// 混合 Petri 网。`pre`/`post` 在离散库所行上是令牌权重，在流体库所行上是
/// 流体弧的速率倍数；`inhibitor` 只用于离散库所。
#[derive(Clone)]
pub struct Model {
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    pre: Incidence,
    post: Incidence,
    inhibitor: Incidence,
    guards: Vec<Guard>,
    slots: IndexVec<PlaceId, Slot>,
    discrete: Vec<PlaceId>,
    fluid: Vec<PlaceId>,
    place_index: IndexMap<String, PlaceId>,
    transition_index: IndexMap<String, TransitionId>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .field("guards", &self.guards)
            .finish()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::empty()
    }
}

impl Model {
    pub fn empty() -> Self {
        Self {
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            pre: Incidence::empty(),
            post: Incidence::empty(),
            inhibitor: Incidence::empty(),
            guards: Vec::new(),
            slots: IndexVec::new(),
            discrete: Vec::new(),
            fluid: Vec::new(),
            place_index: IndexMap::new(),
            transition_index: IndexMap::new(),
        }
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        let slot = if place.is_fluid() {
            Slot::Fluid(self.fluid.len())
        } else {
            Slot::Discrete(self.discrete.len())
        };
        let name = place.name.clone();
        let place_id = self.places.push(place);
        self.pre.add_place();
        self.post.add_place();
        self.inhibitor.add_place();
        self.slots.push(slot);
        match slot {
            Slot::Discrete(_) => self.discrete.push(place_id),
            Slot::Fluid(_) => self.fluid.push(place_id),
        }
        self.place_index.entry(name).or_insert(place_id);
        place_id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let name = transition.name.clone();
        let transition_id = self.transitions.push(transition);
        self.pre.add_transition();
        self.post.add_transition();
        self.inhibitor.add_transition();
        self.transition_index.entry(name).or_insert(transition_id);
        transition_id
    }

    /// 输入弧: place -> transition
    pub fn add_input_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.pre.add(place, transition, weight);
    }

    /// 输出弧: transition -> place
    pub fn add_output_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.post.add(place, transition, weight);
    }

    /// 抑制弧：`tokens >= weight` 时迁移被禁止。
    pub fn add_inhibitor_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.inhibitor.set(place, transition, weight);
    }

    pub fn add_guard(&mut self, guard: Guard) {
        self.guards.push(guard);
    }

    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter_enumerated()
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter_enumerated()
    }

    pub fn place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn place_by_name(&self, name: &str) -> Option<PlaceId> {
        self.place_index.get(name).copied()
    }

    pub fn transition_by_name(&self, name: &str) -> Option<TransitionId> {
        self.transition_index.get(name).copied()
    }

    pub fn slot(&self, place: PlaceId) -> Option<Slot> {
        self.slots.get(place).copied()
    }

    pub fn discrete_places(&self) -> &[PlaceId] {
        &self.discrete
    }

    pub fn fluid_places(&self) -> &[PlaceId] {
        &self.fluid
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn pre(&self) -> &Incidence {
        &self.pre
    }

    pub fn post(&self) -> &Incidence {
        &self.post
    }

    pub fn inhibitor(&self) -> &Incidence {
        &self.inhibitor
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn initial_marking(&self) -> Marking {
        let mut tokens = Vec::with_capacity(self.discrete.len());
        let mut levels = Vec::with_capacity(self.fluid.len());
        for place in self.places.iter() {
            match place.kind {
                PlaceKind::Discrete { tokens: count, .. } => tokens.push(count),
                PlaceKind::Fluid { level, .. } => levels.push(level),
            }
        }
        Marking::new(tokens, levels)
    }

    pub fn fluid_capacity(&self, slot: usize) -> Option<f64> {
        let place = self.fluid.get(slot)?;
        match self.places[*place].kind {
            PlaceKind::Fluid { capacity, .. } => capacity,
            PlaceKind::Discrete { .. } => None,
        }
    }

    /// 流体库所电平的自然上界：容量，无容量时取初始电平。
    pub fn level_ceiling(&self, name: &str) -> Option<f64> {
        let place = self.place(self.place_by_name(name)?)?;
        match place.kind {
            PlaceKind::Fluid { level, capacity } => Some(capacity.unwrap_or(level)),
            PlaceKind::Discrete { .. } => None,
        }
    }

    /// 决定概率测度的迁移：名称以 `failure` 开头的随机迁移优先，其次是第一个
    /// `General` 迁移，最后是第一个随机迁移。
    pub fn governing_transition(&self) -> Option<TransitionId> {
        let stochastic = || {
            self.transitions
                .iter_enumerated()
                .filter(|(_, t)| matches!(t.kind, TransitionKind::Stochastic(_)))
        };
        stochastic()
            .find(|(_, t)| t.name.starts_with("failure"))
            .or_else(|| {
                stochastic().find(|(_, t)| {
                    matches!(
                        t.kind,
                        TransitionKind::Stochastic(FiringLaw::General { .. })
                    )
                })
            })
            .or_else(|| stochastic().next())
            .map(|(id, _)| id)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.place_index.len() != self.places.len() {
            let mut seen = std::collections::HashSet::new();
            if let Some(place) = self.places.iter().find(|p| !seen.insert(p.name.as_str())) {
                return Err(ModelError::DuplicatePlace(place.name.clone()));
            }
        }
        if self.transition_index.len() != self.transitions.len() {
            let mut seen = std::collections::HashSet::new();
            if let Some(t) = self.transitions.iter().find(|t| !seen.insert(t.name.as_str())) {
                return Err(ModelError::DuplicateTransition(t.name.clone()));
            }
        }

        for place in self.places.iter() {
            let invalid = |name, value| ModelError::InvalidParameter {
                owner: place.name.clone(),
                name,
                value,
            };
            match place.kind {
                PlaceKind::Discrete { tokens, capacity } => {
                    if let Some(capacity) = capacity.filter(|cap| *cap < tokens) {
                        return Err(invalid("capacity", capacity as f64));
                    }
                }
                PlaceKind::Fluid { level, capacity } => {
                    if !level.is_finite() || level < 0.0 {
                        return Err(invalid("level", level));
                    }
                    if let Some(capacity) = capacity {
                        if !capacity.is_finite() || capacity < level {
                            return Err(invalid("capacity", capacity));
                        }
                    }
                }
            }
        }

        for (id, transition) in self.transitions.iter_enumerated() {
            let invalid = |name, value| ModelError::InvalidParameter {
                owner: transition.name.clone(),
                name,
                value,
            };
            if !transition.weight.is_finite() || transition.weight <= 0.0 {
                return Err(invalid("weight", transition.weight));
            }
            match &transition.kind {
                TransitionKind::Immediate => {}
                TransitionKind::Deterministic { delay } => {
                    if !delay.is_finite() || *delay < 0.0 {
                        return Err(invalid("delay", *delay));
                    }
                }
                TransitionKind::Fluid { rate } => {
                    if !rate.is_finite() || *rate < 0.0 {
                        return Err(invalid("rate", *rate));
                    }
                }
                TransitionKind::Stochastic(law) => {
                    Distribution::from_law(law).map_err(|err| ModelError::InvalidLaw {
                        transition: transition.name.clone(),
                        reason: err.to_string(),
                    })?;
                }
            }
            self.validate_arcs(id, transition)?;
        }

        for guard in &self.guards {
            let transition = self
                .transition(guard.transition)
                .ok_or_else(|| ModelError::UnknownTransition(format!("{:?}", guard.transition)))?;
            let place = self
                .place(guard.place)
                .ok_or_else(|| ModelError::UnknownPlace(format!("{:?}", guard.place)))?;
            if !place.is_fluid() {
                return Err(ModelError::GuardOnDiscretePlace {
                    transition: transition.name.clone(),
                    place: place.name.clone(),
                });
            }
            if !guard.threshold.is_finite() || guard.threshold < 0.0 {
                return Err(ModelError::InvalidParameter {
                    owner: transition.name.clone(),
                    name: "guard threshold",
                    value: guard.threshold,
                });
            }
        }
        Ok(())
    }

    fn validate_arcs(&self, id: TransitionId, transition: &Transition) -> Result<(), ModelError> {
        let is_fluid_transition = matches!(transition.kind, TransitionKind::Fluid { .. });
        let reject = |place: PlaceId, reason| ModelError::InvalidArc {
            place: self.places[place].name.clone(),
            transition: transition.name.clone(),
            reason,
        };
        for place in self.places.indices() {
            let pre = self.pre.weight(place, id);
            let post = self.post.weight(place, id);
            let inhibitor = self.inhibitor.weight(place, id);
            match self.slots[place] {
                Slot::Fluid(_) => {
                    if inhibitor > 0 {
                        return Err(reject(place, "inhibitor arcs need a discrete place"));
                    }
                    if (pre > 0 || post > 0) && !is_fluid_transition {
                        return Err(reject(place, "fluid arcs need a fluid transition"));
                    }
                }
                Slot::Discrete(_) => {
                    if post > 0 && is_fluid_transition {
                        return Err(reject(place, "fluid transitions cannot produce tokens"));
                    }
                }
            }
        }
        Ok(())
    }

    /// 离散部分的使能判定：输入弧、抑制弧与容量。守卫另行判定。
    fn discrete_enabled(&self, transition: TransitionId, tokens: &[Weight]) -> bool {
        let consumes = !matches!(
            self.transitions[transition].kind,
            TransitionKind::Fluid { .. }
        );
        for &place in &self.discrete {
            let Slot::Discrete(slot) = self.slots[place] else {
                continue;
            };
            let have = tokens[slot];
            let pre = self.pre.weight(place, transition);
            if have < pre {
                return false;
            }
            let inhibitor = self.inhibitor.weight(place, transition);
            if inhibitor > 0 && have >= inhibitor {
                return false;
            }
            if consumes {
                let post = self.post.weight(place, transition);
                if let PlaceKind::Discrete {
                    capacity: Some(capacity),
                    ..
                } = self.places[place].kind
                {
                    if post > 0 && have - pre + post > capacity {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn guards_of(&self, transition: TransitionId) -> impl Iterator<Item = (&Guard, usize)> {
        self.guards
            .iter()
            .filter(move |guard| guard.transition == transition)
            .filter_map(|guard| match self.slots.get(guard.place) {
                Some(Slot::Fluid(slot)) => Some((guard, *slot)),
                _ => None,
            })
    }

    /// 点语义下的使能判定。
    pub fn is_enabled_at(
        &self,
        transition: TransitionId,
        tokens: &[Weight],
        levels: &[f64],
        epsilon: f64,
    ) -> bool {
        self.discrete_enabled(transition, tokens)
            && self
                .guards_of(transition)
                .all(|(guard, slot)| guard.holds_at(levels[slot], epsilon))
    }

    /// 紧随当前时刻的开区间上的使能判定，守卫按流体速率方向取右极限。
    pub fn is_enabled_after(
        &self,
        transition: TransitionId,
        tokens: &[Weight],
        levels: &[f64],
        rates: &[f64],
        epsilon: f64,
    ) -> bool {
        self.discrete_enabled(transition, tokens)
            && self
                .guards_of(transition)
                .all(|(guard, slot)| guard.holds_after(levels[slot], rates[slot], epsilon))
    }

    /// 发生离散迁移，返回新的令牌向量。
    pub fn fire(&self, transition: TransitionId, tokens: &[Weight]) -> Result<Vec<Weight>, FireError> {
        let Some(kind) = self.transitions.get(transition).map(|t| &t.kind) else {
            return Err(FireError::OutOfBounds(transition));
        };
        if matches!(kind, TransitionKind::Fluid { .. }) {
            return Err(FireError::Continuous(transition));
        }
        if !self.discrete_enabled(transition, tokens) {
            return Err(FireError::NotEnabled(transition));
        }
        let mut next = tokens.to_vec();
        for &place in &self.discrete {
            let Slot::Discrete(slot) = self.slots[place] else {
                continue;
            };
            next[slot] = next[slot] - self.pre.weight(place, transition) + self.post.weight(place, transition);
        }
        Ok(next)
    }

    /// 各流体库所的净变化率。
    ///
    /// 处于下界（空）且净流出的库所按比例缩减其流出迁移的速率，处于容量上界且净流入
    /// 的库所按比例缩减其流入迁移的速率，反复调整直到所有边界库所的净速率不再越界。
    pub fn fluid_rates(&self, enabled: &[TransitionId], levels: &[f64], epsilon: f64) -> Vec<f64> {
        let active: Vec<(TransitionId, f64)> = enabled
            .iter()
            .filter_map(|t| match self.transitions[*t].kind {
                TransitionKind::Fluid { rate } if rate > 0.0 => Some((*t, rate)),
                _ => None,
            })
            .collect();
        let mut factors = vec![1.0_f64; active.len()];

        for _ in 0..=active.len() {
            let (inflow, outflow) = self.fluid_flows(&active, &factors);
            let mut adjusted = false;
            for (slot, &place) in self.fluid.iter().enumerate() {
                let net = inflow[slot] - outflow[slot];
                let at_bottom = levels[slot] <= epsilon && net < -epsilon;
                let at_top = self
                    .fluid_capacity(slot)
                    .is_some_and(|cap| levels[slot] >= cap - epsilon && net > epsilon);
                if !(at_bottom || at_top) {
                    continue;
                }
                let (scale, matrix) = if at_bottom {
                    (inflow[slot] / outflow[slot], &self.pre)
                } else {
                    (outflow[slot] / inflow[slot], &self.post)
                };
                for (idx, (transition, _)) in active.iter().enumerate() {
                    if matrix.weight(place, *transition) > 0 {
                        factors[idx] *= scale;
                    }
                }
                adjusted = true;
            }
            if !adjusted {
                break;
            }
        }

        let (inflow, outflow) = self.fluid_flows(&active, &factors);
        inflow
            .iter()
            .zip(outflow.iter())
            .enumerate()
            .map(|(slot, (i, o))| {
                let net = i - o;
                if net.abs() <= epsilon {
                    return 0.0;
                }
                let blocked_low = levels[slot] <= epsilon && net < 0.0;
                let blocked_high = self
                    .fluid_capacity(slot)
                    .is_some_and(|cap| levels[slot] >= cap - epsilon && net > 0.0);
                if blocked_low || blocked_high { 0.0 } else { net }
            })
            .collect()
    }

    fn fluid_flows(&self, active: &[(TransitionId, f64)], factors: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut inflow = vec![0.0; self.fluid.len()];
        let mut outflow = vec![0.0; self.fluid.len()];
        for ((transition, rate), factor) in active.iter().zip(factors) {
            for (slot, &place) in self.fluid.iter().enumerate() {
                let drain = self.pre.weight(place, *transition);
                let fill = self.post.weight(place, *transition);
                outflow[slot] += rate * factor * drain as f64;
                inflow[slot] += rate * factor * fill as f64;
            }
        }
        (inflow, outflow)
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph HybridNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (place_id, place) in self.places.iter_enumerated() {
            let (label, shape) = match place.kind {
                PlaceKind::Discrete { tokens, .. } => {
                    (format!("{}\\n{}", escape_label(&place.name), tokens), "circle")
                }
                PlaceKind::Fluid { level, .. } => {
                    (format!("{}\\n{:.2}", escape_label(&place.name), level), "doublecircle")
                }
            };
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\", shape={}, style=filled, fillcolor=\"#e3f2fd\"];",
                place_id.index(),
                label,
                shape
            );
        }

        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let kind = match &transition.kind {
                TransitionKind::Immediate => "immediate".to_string(),
                TransitionKind::Deterministic { delay } => format!("det {delay}"),
                TransitionKind::Stochastic(law) => law.family().to_string(),
                TransitionKind::Fluid { rate } => format!("fluid {rate}"),
            };
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\\n{}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
                transition_id.index(),
                escape_label(&transition.name),
                kind
            );
        }

        let matrices = [
            (&self.pre, true, ""),
            (&self.post, false, ""),
            (&self.inhibitor, true, ", arrowhead=odot"),
        ];
        for (matrix, into_transition, style) in matrices {
            for place in self.places.indices() {
                for (transition, weight) in matrix.arcs_at(place) {
                    let (from, to) = if into_transition {
                        (format!("place_{}", place.index()), format!("trans_{}", transition.index()))
                    } else {
                        (format!("trans_{}", transition.index()), format!("place_{}", place.index()))
                    };
                    let _ = writeln!(&mut dot, "    {from} -> {to} [label=\"{weight}\"{style}];");
                }
            }
        }

        for guard in &self.guards {
            let _ = writeln!(
                &mut dot,
                "    place_{} -> trans_{} [style=dashed, label=\"{:?} {}\"];",
                guard.place.index(),
                guard.transition.index(),
                guard.kind,
                guard.threshold
            );
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }
}

pub(crate) fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::GuardKind;

    fn tank_model() -> (Model, PlaceId, PlaceId, TransitionId, TransitionId) {
        let mut model = Model::empty();
        let on = model.add_place(Place::discrete("on", 1));
        let tank = model.add_place(Place::fluid("tank", 10.0).with_capacity(20.0));
        let drain = model.add_transition(Transition::fluid("drain", 1.0));
        let stop = model.add_transition(Transition::deterministic("stop", 4.0));
        model.add_input_arc(on, drain, 1);
        model.add_input_arc(tank, drain, 1);
        model.add_input_arc(on, stop, 1);
        (model, on, tank, drain, stop)
    }

    #[test]
    fn slots_follow_place_kinds() {
        let (model, on, tank, ..) = tank_model();
        assert_eq!(model.slot(on), Some(Slot::Discrete(0)));
        assert_eq!(model.slot(tank), Some(Slot::Fluid(0)));
        let marking = model.initial_marking();
        assert_eq!(marking.tokens, vec![1]);
        assert_eq!(marking.levels, vec![10.0]);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn firing_consumes_tokens_and_disables() {
        let (model, _, _, drain, stop) = tank_model();
        let marking = model.initial_marking();
        assert!(model.is_enabled_at(drain, &marking.tokens, &marking.levels, 1e-9));
        assert!(model.is_enabled_at(stop, &marking.tokens, &marking.levels, 1e-9));
        let next = model.fire(stop, &marking.tokens).unwrap();
        assert_eq!(next, vec![0]);
        assert!(!model.is_enabled_at(drain, &next, &marking.levels, 1e-9));
        assert!(matches!(
            model.fire(stop, &next),
            Err(FireError::NotEnabled(_))
        ));
        assert!(matches!(
            model.fire(drain, &marking.tokens),
            Err(FireError::Continuous(_))
        ));
    }

    #[test]
    fn level_ceiling_prefers_capacity() {
        let (mut model, ..) = tank_model();
        model.add_place(Place::fluid("buffer", 3.5));
        assert_eq!(model.level_ceiling("tank"), Some(20.0));
        assert_eq!(model.level_ceiling("buffer"), Some(3.5));
        assert_eq!(model.level_ceiling("on"), None);
        assert_eq!(model.level_ceiling("pump"), None);
    }

    #[test]
    fn inhibitor_blocks_at_threshold() {
        let (mut model, on, ..) = tank_model();
        let idle = model.add_transition(Transition::immediate("idle"));
        model.add_inhibitor_arc(on, idle, 1);
        assert!(!model.is_enabled_at(idle, &[1], &[10.0], 1e-9));
        assert!(model.is_enabled_at(idle, &[0], &[10.0], 1e-9));
    }

    #[test]
    fn draining_an_empty_place_is_clamped() {
        let (model, _, _, drain, _) = tank_model();
        assert_eq!(model.fluid_rates(&[drain], &[10.0], 1e-9), vec![-1.0]);
        assert_eq!(model.fluid_rates(&[drain], &[0.0], 1e-9), vec![0.0]);
    }

    #[test]
    fn empty_buffer_passes_inflow_through() {
        let mut model = Model::empty();
        let source = model.add_place(Place::fluid("source", 10.0));
        let buffer = model.add_place(Place::fluid("buffer", 0.0));
        let sink = model.add_place(Place::fluid("sink", 0.0));
        let fill = model.add_transition(Transition::fluid("fill", 1.0));
        let empty = model.add_transition(Transition::fluid("empty", 3.0));
        model.add_input_arc(source, fill, 1);
        model.add_output_arc(buffer, fill, 1);
        model.add_input_arc(buffer, empty, 1);
        model.add_output_arc(sink, empty, 1);

        let rates = model.fluid_rates(&[fill, empty], &[10.0, 0.0, 0.0], 1e-9);
        assert_eq!(rates[0], -1.0);
        assert!(rates[1].abs() < 1e-12);
        assert!((rates[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn validation_rejects_bad_structure() {
        let (mut model, on, _, drain, stop) = tank_model();
        model.add_output_arc(on, drain, 1);
        assert!(matches!(model.validate(), Err(ModelError::InvalidArc { .. })));

        let (mut model, ..) = tank_model();
        model.add_place(Place::discrete("on", 0));
        assert!(matches!(model.validate(), Err(ModelError::DuplicatePlace(_))));

        let (mut model, on, ..) = tank_model();
        model.add_guard(Guard {
            transition: stop,
            place: on,
            kind: GuardKind::AtLeast,
            threshold: 1.0,
        });
        assert!(matches!(
            model.validate(),
            Err(ModelError::GuardOnDiscretePlace { .. })
        ));

        let (mut model, ..) = tank_model();
        model.add_transition(Transition::stochastic(
            "broken",
            FiringLaw::Uniform { a: 3.0, b: 1.0 },
        ));
        assert!(matches!(model.validate(), Err(ModelError::InvalidLaw { .. })));
    }

    #[test]
    fn governing_transition_prefers_failure_prefix() {
        let (mut model, ..) = tank_model();
        assert_eq!(model.governing_transition(), None);
        let repair = model.add_transition(Transition::stochastic(
            "repair",
            FiringLaw::Exponential { rate: 1.0 },
        ));
        assert_eq!(model.governing_transition(), Some(repair));
        let general = model.add_transition(Transition::stochastic(
            "wear",
            FiringLaw::General {
                cdf: "1 - math::exp(-x)".into(),
            },
        ));
        assert_eq!(model.governing_transition(), Some(general));
        let failure = model.add_transition(Transition::stochastic(
            "failure_pump",
            FiringLaw::Gamma {
                shape: 2.0,
                rate: 1.0,
            },
        ));
        assert_eq!(model.governing_transition(), Some(failure));
    }

    #[test]
    fn dot_lists_every_node() {
        let (model, ..) = tank_model();
        let dot = model.to_dot();
        assert!(dot.contains("place_1 [label=\"tank\\n10.00\", shape=doublecircle"));
        assert!(dot.contains("trans_1 [label=\"stop\\ndet 4\""));
        assert!(dot.contains("place_0 -> trans_0"));
    }
}
