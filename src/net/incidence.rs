//! 弧权表：按库所分行、按迁移分列，0 表示无弧。
//!
//! 模型为输入弧、输出弧与抑制弧各保存一张。
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::ids::{Idx, IndexVec, PlaceId, TransitionId};
use crate::net::structure::Weight;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incidence {
    rows: IndexVec<PlaceId, SmallVec<[Weight; 4]>>,
    transitions: usize,
}

impl Incidence {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends a place row with no arcs.
    pub fn add_place(&mut self) -> PlaceId {
        self.rows.push(SmallVec::from_elem(0, self.transitions))
    }

    /// Appends a transition column with no arcs.
    pub fn add_transition(&mut self) -> TransitionId {
        self.rows.iter_mut().for_each(|row| row.push(0));
        self.transitions += 1;
        TransitionId::from_usize(self.transitions - 1)
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.transitions
    }

    pub fn weight(&self, place: PlaceId, transition: TransitionId) -> Weight {
        self.rows[place][transition.index()]
    }

    /// Parallel arcs accumulate.
    pub fn add(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.rows[place][transition.index()] += weight;
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.rows[place][transition.index()] = weight;
    }

    /// 迁移 `transition` 的所有弧。
    pub fn arcs_of(&self, transition: TransitionId) -> impl Iterator<Item = (PlaceId, Weight)> {
        self.rows
            .iter_enumerated()
            .map(move |(place, row)| (place, row[transition.index()]))
            .filter(|(_, weight)| *weight > 0)
    }

    /// 库所 `place` 的所有弧。
    pub fn arcs_at(&self, place: PlaceId) -> impl Iterator<Item = (TransitionId, Weight)> {
        self.rows[place]
            .iter()
            .enumerate()
            .filter(|(_, weight)| **weight > 0)
            .map(|(idx, weight)| (TransitionId::from_usize(idx), *weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_stay_rectangular_while_growing() {
        let mut arcs = Incidence::empty();
        let p0 = arcs.add_place();
        let t0 = arcs.add_transition();
        let p1 = arcs.add_place();
        let t1 = arcs.add_transition();
        arcs.add(p0, t0, 2);
        arcs.add(p0, t0, 1);
        arcs.set(p1, t1, 3);

        assert_eq!((arcs.places(), arcs.transitions()), (2, 2));
        assert_eq!(arcs.weight(p0, t0), 3);
        assert_eq!(arcs.weight(p1, t0), 0);
        assert_eq!(arcs.arcs_of(t0).collect::<Vec<_>>(), vec![(p0, 3)]);
        assert_eq!(arcs.arcs_at(p1).collect::<Vec<_>>(), vec![(t1, 3)]);
    }
}
