//! 区域图构造：在每个时刻先处理零时间发生，再计算区域内的流体速率与最近事件。
use petgraph::graph::{DiGraph, NodeIndex};
use rand::SeedableRng;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;

use super::{
    Diagram, DiagramConfig, GenerateError, Governing, PlaceInfo, Region, RegionEdge, RegionEvent,
    Termination,
};
use crate::distribution::Distribution;
use crate::net::core::{Model, Slot};
use crate::net::ids::{Idx, IndexVec, PlaceId, RegionId, TransitionId};
use crate::net::structure::{Marking, TransitionKind, Weight};

/// Builds the region diagram of `model` from `initial` up to `config.horizon`.
///
/// The same inputs (seed included) always yield the same diagram.
pub fn generate(
    model: &Model,
    initial: Marking,
    config: &DiagramConfig,
) -> Result<Diagram, GenerateError> {
    if !(config.horizon.is_finite() && config.horizon > 0.0)
        || !(initial.origin.is_finite() && initial.origin >= 0.0 && initial.origin < config.horizon)
    {
        return Err(GenerateError::InvalidHorizon(config.horizon));
    }
    model.validate()?;
    if initial.tokens.len() != model.discrete_places().len() {
        return Err(GenerateError::MarkingMismatch {
            kind: "discrete",
            expected: model.discrete_places().len(),
            found: initial.tokens.len(),
        });
    }
    if initial.levels.len() != model.fluid_places().len() {
        return Err(GenerateError::MarkingMismatch {
            kind: "fluid",
            expected: model.fluid_places().len(),
            found: initial.levels.len(),
        });
    }

    let mut generator = Generator::new(model, initial, config)?;
    generator.run()?;
    let diagram = generator.finish()?;
    log::info!(
        "region diagram: {} regions over [{}, {}] ({:?})",
        diagram.region_count(),
        diagram.origin(),
        diagram.covered_until(),
        diagram.termination()
    );
    Ok(diagram)
}

struct Candidate {
    id: TransitionId,
    priority: u32,
    weight: f64,
}

struct Generator<'m> {
    model: &'m Model,
    config: &'m DiagramConfig,
    rng: StdRng,
    governing: Option<TransitionId>,
    /// 计时迁移的确定化延迟；瞬时、流体与主导迁移为 None。
    delays: IndexVec<TransitionId, Option<f64>>,
    clocks: IndexVec<TransitionId, Option<f64>>,
    origin: f64,
    time: f64,
    tokens: Vec<Weight>,
    levels: Vec<f64>,
    regions: Vec<Region>,
    edges: Vec<RegionEdge>,
    termination: Termination,
}

impl<'m> Generator<'m> {
    fn new(
        model: &'m Model,
        initial: Marking,
        config: &'m DiagramConfig,
    ) -> Result<Self, GenerateError> {
        let governing = model.governing_transition();
        let mut delays = IndexVec::new();
        for (id, transition) in model.transitions() {
            let delay = if transition.kind.is_timed() && Some(id) != governing {
                let delay = Distribution::for_transition(&transition.kind)
                    .and_then(|law| law.characteristic_delay())
                    .map_err(|source| GenerateError::Distribution {
                        transition: transition.name.clone(),
                        source,
                    })?;
                Some(delay)
            } else {
                None
            };
            delays.push(delay);
        }
        let clocks = IndexVec::from_vec(vec![None; model.transitions_len()]);
        let Marking {
            tokens,
            levels,
            origin,
        } = initial;
        Ok(Self {
            model,
            config,
            rng: StdRng::seed_from_u64(config.seed),
            governing,
            delays,
            clocks,
            origin,
            time: origin,
            tokens,
            levels,
            regions: Vec::new(),
            edges: Vec::new(),
            termination: Termination::Horizon,
        })
    }

    fn run(&mut self) -> Result<(), GenerateError> {
        let eps = self.config.epsilon;
        let step_limit = self
            .config
            .max_regions
            .map_or(usize::MAX, |limit| limit.saturating_mul(16).max(1024));
        let mut pending: Option<RegionEvent> = None;

        for _ in 0..step_limit {
            let fired = self.settle_instant()?;
            let (enabled, rates) = self.dynamics();
            self.sync_clocks(&enabled);

            let unchanged = self.regions.last().is_some_and(|last| {
                last.tokens == self.tokens
                    && last.enabled == enabled
                    && last
                        .rates
                        .iter()
                        .zip(&rates)
                        .all(|(a, b)| (a - b).abs() <= eps)
            });
            if !unchanged {
                if self
                    .config
                    .max_regions
                    .is_some_and(|limit| self.regions.len() >= limit)
                {
                    log::warn!(
                        "region limit {:?} reached at t = {}, diagram truncated",
                        self.config.max_regions,
                        self.time
                    );
                    self.truncate();
                    return Ok(());
                }
                if let Some(last) = self.regions.last_mut() {
                    last.exit = self.time;
                }
                if let Some(event) = pending.take() {
                    let event = match event {
                        RegionEvent::ClockExpired(t) if fired.contains(&t) => {
                            RegionEvent::TransitionFired(t)
                        }
                        other => other,
                    };
                    self.edges.push(RegionEdge {
                        at: self.time,
                        event,
                        fired,
                    });
                }
                self.open_region(enabled.clone(), rates.clone());
            }

            let (delta, event, quiescent) = self.next_event(&enabled, &rates);
            if event == RegionEvent::Horizon {
                self.time = self.config.horizon;
                if let Some(last) = self.regions.last_mut() {
                    last.exit = self.config.horizon;
                }
                self.termination = if quiescent {
                    Termination::Absorbing
                } else {
                    Termination::Horizon
                };
                return Ok(());
            }
            self.advance(delta, event, &enabled, &rates);
            pending = Some(event);
        }

        log::warn!("step limit reached at t = {}, diagram truncated", self.time);
        self.truncate();
        Ok(())
    }

    fn truncate(&mut self) {
        if let Some(last) = self.regions.last_mut() {
            last.exit = self.time;
        }
        self.termination = Termination::Truncated;
    }

    fn point_enabled(&self, transition: TransitionId) -> bool {
        self.model
            .is_enabled_at(transition, &self.tokens, &self.levels, self.config.epsilon)
    }

    fn due(&self, transition: TransitionId) -> bool {
        match self.delays[transition] {
            Some(delay) => {
                self.clocks[transition].unwrap_or(0.0) >= delay - self.config.epsilon
            }
            None => false,
        }
    }

    /// 处理当前时刻的零时间发生：先瞬时迁移，再到期的计时迁移，一次一个。
    fn settle_instant(&mut self) -> Result<Vec<TransitionId>, GenerateError> {
        let mut fired = Vec::new();
        loop {
            let immediate: Vec<Candidate> = self
                .model
                .transitions()
                .filter(|(id, t)| {
                    matches!(t.kind, TransitionKind::Immediate) && self.point_enabled(*id)
                })
                .map(|(id, t)| Candidate {
                    id,
                    priority: t.priority,
                    weight: t.weight,
                })
                .collect();
            let candidates = if immediate.is_empty() {
                self.model
                    .transitions()
                    .filter(|(id, _)| self.due(*id) && self.point_enabled(*id))
                    .map(|(id, t)| Candidate {
                        id,
                        priority: t.priority,
                        weight: t.weight,
                    })
                    .collect()
            } else {
                immediate
            };
            if candidates.is_empty() {
                return Ok(fired);
            }
            if fired.len() >= self.config.max_instant_steps {
                return Err(GenerateError::ZenoBehaviour {
                    time: self.time,
                    steps: fired.len(),
                });
            }

            let chosen = self.choose(&candidates);
            self.tokens = self.model.fire(chosen, &self.tokens)?;
            self.clocks[chosen] = None;
            log::debug!("t = {}: fired {:?} -> {:?}", self.time, chosen, self.tokens);
            fired.push(chosen);

            for transition in self.clocks.indices() {
                if self.clocks[transition].is_some() && !self.point_enabled(transition) {
                    self.clocks[transition] = None;
                }
            }
        }
    }

    /// 最高优先级者胜出；同优先级按权重随机选择。
    fn choose(&mut self, candidates: &[Candidate]) -> TransitionId {
        let top = candidates.iter().map(|c| c.priority).max().unwrap_or(0);
        let best: Vec<&Candidate> = candidates.iter().filter(|c| c.priority == top).collect();
        if best.len() == 1 {
            return best[0].id;
        }
        match WeightedIndex::new(best.iter().map(|c| c.weight)) {
            Ok(index) => best[index.sample(&mut self.rng)].id,
            Err(_) => best[0].id,
        }
    }

    /// 区域内（右极限语义）使能的迁移及流体速率，守卫与速率互相依赖，迭代至不动点。
    fn dynamics(&self) -> (Vec<TransitionId>, Vec<f64>) {
        let eps = self.config.epsilon;
        let candidates: Vec<TransitionId> = self
            .model
            .transitions()
            .filter(|(_, t)| !matches!(t.kind, TransitionKind::Immediate))
            .map(|(id, _)| id)
            .collect();
        let mut enabled: Vec<TransitionId> = candidates
            .iter()
            .copied()
            .filter(|t| self.point_enabled(*t))
            .collect();
        let mut rates = self.model.fluid_rates(&enabled, &self.levels, eps);

        for _ in 0..=self.model.guards().len() {
            let next: Vec<TransitionId> = candidates
                .iter()
                .copied()
                .filter(|t| {
                    self.model
                        .is_enabled_after(*t, &self.tokens, &self.levels, &rates, eps)
                })
                .collect();
            let next_rates = self.model.fluid_rates(&next, &self.levels, eps);
            let stable = next == enabled
                && next_rates
                    .iter()
                    .zip(&rates)
                    .all(|(a, b)| (a - b).abs() <= eps);
            enabled = next;
            rates = next_rates;
            if stable {
                break;
            }
        }
        (enabled, rates)
    }

    /// 使能记忆：失去使能的计时迁移时钟清零，新使能的从零开始。
    fn sync_clocks(&mut self, enabled: &[TransitionId]) {
        for transition in self.clocks.indices() {
            if self.delays[transition].is_none() {
                continue;
            }
            if enabled.contains(&transition) {
                self.clocks[transition].get_or_insert(0.0);
            } else {
                self.clocks[transition] = None;
            }
        }
    }

    fn open_region(&mut self, enabled: Vec<TransitionId>, rates: Vec<f64>) {
        let clocks = enabled
            .iter()
            .filter_map(|t| self.clocks[*t].map(|clock| (*t, clock)))
            .collect();
        let region = Region {
            id: RegionId::from_usize(self.regions.len()),
            entry: self.time,
            exit: self.time,
            tokens: self.tokens.clone(),
            levels: self.levels.clone(),
            rates,
            enabled,
            clocks,
        };
        log::debug!(
            "open {:?} at t = {}: tokens {:?}, levels {:?}, rates {:?}",
            region.id,
            region.entry,
            region.tokens,
            region.levels,
            region.rates
        );
        self.regions.push(region);
    }

    fn fluid_place(&self, slot: usize) -> PlaceId {
        self.model.fluid_places()[slot]
    }

    fn fluid_slot(&self, place: PlaceId) -> Option<usize> {
        match self.model.slot(place) {
            Some(Slot::Fluid(slot)) => Some(slot),
            _ => None,
        }
    }

    /// 最近的区域结束事件。第三个返回值表示流体静止且没有计时迁移在运行。
    fn next_event(&self, enabled: &[TransitionId], rates: &[f64]) -> (f64, RegionEvent, bool) {
        let eps = self.config.epsilon;
        let mut best = (self.config.horizon - self.time, RegionEvent::Horizon);
        let quiescent = rates.iter().all(|rate| *rate == 0.0)
            && enabled.iter().all(|t| {
                self.clocks[*t].is_none() || !self.delays[*t].is_some_and(f64::is_finite)
            });
        let mut offer = |delta: f64, event: RegionEvent| {
            if delta.is_finite() && delta > eps && delta < best.0 {
                best = (delta, event);
            }
        };

        for &transition in enabled {
            if let (Some(delay), Some(clock)) = (self.delays[transition], self.clocks[transition]) {
                offer(delay - clock, RegionEvent::ClockExpired(transition));
            }
        }
        for (slot, &rate) in rates.iter().enumerate() {
            let level = self.levels[slot];
            let place = self.fluid_place(slot);
            if rate < 0.0 {
                offer(level / -rate, RegionEvent::BoundaryReached(place));
            } else if rate > 0.0 {
                if let Some(capacity) = self.model.fluid_capacity(slot) {
                    offer((capacity - level) / rate, RegionEvent::BoundaryReached(place));
                }
            }
        }
        for guard in self.model.guards() {
            let Some(slot) = self.fluid_slot(guard.place) else {
                continue;
            };
            let rate = rates[slot];
            if rate != 0.0 {
                offer(
                    (guard.threshold - self.levels[slot]) / rate,
                    RegionEvent::GuardCrossed(guard.place),
                );
            }
        }
        (best.0, best.1, quiescent)
    }

    fn advance(
        &mut self,
        delta: f64,
        event: RegionEvent,
        enabled: &[TransitionId],
        rates: &[f64],
    ) {
        self.time += delta;
        for slot in 0..self.levels.len() {
            let mut level = (self.levels[slot] + rates[slot] * delta).max(0.0);
            if let Some(capacity) = self.model.fluid_capacity(slot) {
                level = level.min(capacity);
            }
            self.levels[slot] = level;
        }

        match event {
            RegionEvent::BoundaryReached(place) => {
                if let Some(slot) = self.fluid_slot(place) {
                    self.levels[slot] = if rates[slot] < 0.0 {
                        0.0
                    } else {
                        self.model.fluid_capacity(slot).unwrap_or(self.levels[slot])
                    };
                }
            }
            RegionEvent::GuardCrossed(place) => {
                if let Some(slot) = self.fluid_slot(place) {
                    let level = self.levels[slot];
                    let nearest = self
                        .model
                        .guards()
                        .iter()
                        .filter(|guard| guard.place == place)
                        .map(|guard| guard.threshold)
                        .min_by(|a, b| (a - level).abs().total_cmp(&(b - level).abs()));
                    if let Some(threshold) = nearest {
                        self.levels[slot] = threshold;
                    }
                }
            }
            _ => {}
        }

        for &transition in enabled {
            if let Some(clock) = self.clocks[transition].as_mut() {
                *clock += delta;
            }
        }
        if let RegionEvent::ClockExpired(transition) = event {
            self.clocks[transition] = self.delays[transition];
        }
    }

    fn finish(self) -> Result<Diagram, GenerateError> {
        let model = self.model;
        let governing = match self.governing {
            Some(transition) => {
                let spec = model
                    .transition(transition)
                    .ok_or(crate::net::core::FireError::OutOfBounds(transition))?;
                let distribution = Distribution::for_transition(&spec.kind).map_err(|source| {
                    GenerateError::Distribution {
                        transition: spec.name.clone(),
                        source,
                    }
                })?;
                Some(Governing {
                    transition,
                    name: spec.name.clone(),
                    distribution,
                })
            }
            None => None,
        };

        let mut graph = DiGraph::with_capacity(self.regions.len(), self.edges.len());
        for region in self.regions {
            graph.add_node(region);
        }
        for (idx, edge) in self.edges.into_iter().enumerate() {
            graph.add_edge(NodeIndex::new(idx), NodeIndex::new(idx + 1), edge);
        }

        let places = model
            .places()
            .filter_map(|(id, place)| {
                model.slot(id).map(|slot| PlaceInfo {
                    name: place.name.clone(),
                    slot,
                })
            })
            .collect::<Vec<_>>();
        let transitions = model
            .transitions()
            .map(|(_, t)| t.name.clone())
            .collect::<Vec<_>>();
        let covered_until = match self.termination {
            Termination::Truncated => self.time,
            Termination::Horizon | Termination::Absorbing => self.config.horizon,
        };

        Ok(Diagram {
            graph,
            origin: self.origin,
            horizon: self.config.horizon,
            covered_until,
            termination: self.termination,
            places: IndexVec::from_vec(places),
            transitions: IndexVec::from_vec(transitions),
            governing,
        })
    }
}
