//! # 混合 Petri 网核心定义
//!
//! 设离散库所集合 `P_d`、流体库所集合 `P_c` 与迁移集合 `T`。离散标识
//! `M ∈ ℕ^{|P_d|}`，流体标识 `X ∈ ℝ≥0^{|P_c|}`。
//!
//! * 迁移 `t` **可使能** 当且仅当 `∀p ∈ P_d: M[p] ≥ Pre[p, t]`，所有抑制弧
//!   `(p, t)` 满足 `M[p] < I[p, t]`，离散输出不超过容量，并且 `t` 的每个守卫
//!   `X[p] ≥ θ`（或 `≤ θ`）成立；
//! * 离散迁移发生后 `M' = M - Pre[:, t] + Post[:, t]`，流体量不变；
//! * 流体迁移在使能期间以恒定速率从流体输入库所抽取、向流体输出库所注入，
//!   空库所与满库所的速率按比例调整。
//!
//! ## 示例
//!
//! ```rust
//! use hpng::net::*;
//!
//! let mut model = Model::empty();
//! let on = model.add_place(Place::discrete("on", 1));
//! let tank = model.add_place(Place::fluid("tank", 10.0));
//! let drain = model.add_transition(Transition::fluid("drain", 1.0));
//! let stop = model.add_transition(Transition::deterministic("stop", 4.0));
//! model.add_input_arc(on, drain, 1);
//! model.add_input_arc(tank, drain, 1);
//! model.add_input_arc(on, stop, 1);
//! model.validate().unwrap();
//!
//! let marking = model.initial_marking();
//! assert!(model.is_enabled_at(stop, &marking.tokens, &marking.levels, 1e-9));
//! assert_eq!(model.fire(stop, &marking.tokens).unwrap(), vec![0]);
//! assert_eq!(model.fluid_rates(&[drain], &marking.levels, 1e-9), vec![-1.0]);
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod io;
pub mod structure;

pub use self::core::{FireError, Model, ModelError, Slot};
pub use ids::{Idx, IndexVec, PlaceId, RegionId, TransitionId};
pub use incidence::Incidence;
pub use io::{IoError, ModelFile, load_model};
pub use structure::{
    ArcDirection, ArcSpec, FiringLaw, Guard, GuardKind, GuardSpec, Marking, Place, PlaceKind,
    Transition, TransitionKind, Weight,
};
