//! 请求边界上的统一错误类型，各层错误通过 `From` 汇入 [`CheckError`]。
use thiserror::Error;

use crate::diagram::GenerateError;
use crate::distribution::DistributionError;
use crate::formula::{FormulaError, FormulaSyntaxError};
use crate::net::{IoError, ModelError};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no model loaded")]
    ModelMissing,
    #[error("invalid reference to place `{place}`: {reason}")]
    InvalidPlaceReference { place: String, reason: String },
    #[error("invalid time parameter {name} = {value}")]
    InvalidTimeParameter { name: &'static str, value: f64 },
    #[error(transparent)]
    FormulaSyntax(#[from] FormulaSyntaxError),
    #[error("unknown place `{0}`")]
    UnknownPlace(String),
    #[error("unsupported distribution: {0}")]
    UnsupportedDistribution(String),
    #[error("region diagram covers time up to {reached} only, horizon is {horizon}")]
    HorizonExceeded { reached: f64, horizon: f64 },
    #[error("model has no stochastic transition to take probabilities over")]
    MissingFailureTransition,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Generate(GenerateError),
    #[error(transparent)]
    Io(#[from] IoError),
}

impl From<GenerateError> for CheckError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::HorizonExceeded { reached, horizon } => {
                CheckError::HorizonExceeded { reached, horizon }
            }
            GenerateError::InvalidHorizon(value) => CheckError::InvalidTimeParameter {
                name: "horizon",
                value,
            },
            GenerateError::Model(err) => CheckError::Model(err),
            GenerateError::Distribution { transition, source } => {
                CheckError::UnsupportedDistribution(format!("transition `{transition}`: {source}"))
            }
            other => CheckError::Generate(other),
        }
    }
}

impl From<DistributionError> for CheckError {
    fn from(err: DistributionError) -> Self {
        CheckError::UnsupportedDistribution(err.to_string())
    }
}

impl From<FormulaError> for CheckError {
    fn from(err: FormulaError) -> Self {
        match err {
            FormulaError::UnknownPlace(place) => CheckError::UnknownPlace(place),
            FormulaError::InvalidTimeParameter { name, value } => {
                CheckError::InvalidTimeParameter { name, value }
            }
            FormulaError::NonIntegralCount { ref place, .. }
            | FormulaError::InvalidConstant { ref place, .. }
            | FormulaError::SlotOutOfRange { ref place, .. } => CheckError::InvalidPlaceReference {
                place: place.clone(),
                reason: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CheckError {
    fn from(err: std::io::Error) -> Self {
        CheckError::Io(IoError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_errors_map_to_request_errors() {
        let err: CheckError = FormulaError::UnknownPlace("pump".into()).into();
        assert!(matches!(err, CheckError::UnknownPlace(ref p) if p == "pump"));

        let err: CheckError = GenerateError::HorizonExceeded {
            reached: 3.0,
            horizon: 10.0,
        }
        .into();
        assert!(matches!(err, CheckError::HorizonExceeded { reached, .. } if reached == 3.0));

        let err: CheckError = FormulaError::NonIntegralCount {
            place: "on".into(),
            value: 0.5,
        }
        .into();
        assert!(matches!(err, CheckError::InvalidPlaceReference { ref place, .. } if place == "on"));

        let err: CheckError = DistributionError::NoLaw("fluid").into();
        assert!(matches!(err, CheckError::UnsupportedDistribution(_)));
    }
}
