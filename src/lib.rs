//! Region diagrams and interval-set model checking for hybrid Petri nets
//! with general transitions.
//!
//! 流程：[`net`] 描述模型，[`diagram::generate`] 构造区域图，
//! [`formula`] 在区域图时间轴上求满足集，[`probability`] 对主导迁移的发生时间分布积分。
//! [`checker`] 把这些步骤组合为请求接口。

pub mod checker;
pub mod config;
pub mod diagram;
pub mod distribution;
pub mod error;
pub mod formula;
pub mod interval;
pub mod net;
pub mod options;
pub mod probability;
pub mod report;
pub mod sweep;

pub use checker::{
    CheckOutcome, Checker, build_diagram, build_diagram_with, check, check_with_threshold,
    evaluate_point, parse_formula,
};
pub use error::CheckError;
