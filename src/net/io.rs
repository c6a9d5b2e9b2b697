//! I/O 支持：模型文件（JSON、RON）读写与校验。
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::core::{Model, ModelError};
use crate::net::ids::Idx;
use crate::net::structure::{ArcDirection, ArcSpec, Guard, GuardSpec, Place, Transition};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron error: {0}")]
    RonSyntax(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported model file extension `{0}` (expected .json or .ron)")]
    Extension(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// 磁盘上的模型格式：弧与守卫按名称引用库所和迁移。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub name: Option<String>,
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub arcs: Vec<ArcSpec>,
    #[serde(default)]
    pub guards: Vec<GuardSpec>,
}

impl ModelFile {
    /// Resolves names and validates the result.
    pub fn into_model(self) -> Result<Model, ModelError> {
        let mut model = Model::empty();
        for place in self.places {
            model.add_place(place);
        }
        for transition in self.transitions {
            model.add_transition(transition);
        }
        let lookup = |model: &Model, place: &str, transition: &str| {
            let p = model
                .place_by_name(place)
                .ok_or_else(|| ModelError::UnknownPlace(place.to_string()))?;
            let t = model
                .transition_by_name(transition)
                .ok_or_else(|| ModelError::UnknownTransition(transition.to_string()))?;
            Ok::<_, ModelError>((p, t))
        };
        for arc in &self.arcs {
            let (place, transition) = lookup(&model, &arc.place, &arc.transition)?;
            match arc.direction {
                ArcDirection::Input => model.add_input_arc(place, transition, arc.weight),
                ArcDirection::Output => model.add_output_arc(place, transition, arc.weight),
                ArcDirection::Inhibitor => model.add_inhibitor_arc(place, transition, arc.weight),
            }
        }
        for guard in &self.guards {
            let (place, transition) = lookup(&model, &guard.place, &guard.transition)?;
            model.add_guard(Guard {
                transition,
                place,
                kind: guard.kind,
                threshold: guard.threshold,
            });
        }
        model.validate()?;
        Ok(model)
    }

    pub fn from_model(model: &Model) -> Self {
        let place_name = |idx: crate::net::ids::PlaceId| {
            model.place(idx).map(|p| p.name.clone()).unwrap_or_default()
        };
        let mut arcs = Vec::new();
        for (transition_id, transition) in model.transitions() {
            let matrices = [
                (model.pre(), ArcDirection::Input),
                (model.post(), ArcDirection::Output),
                (model.inhibitor(), ArcDirection::Inhibitor),
            ];
            for (matrix, direction) in matrices {
                for (place, weight) in matrix.arcs_of(transition_id) {
                    arcs.push(ArcSpec {
                        place: place_name(place),
                        transition: transition.name.clone(),
                        direction,
                        weight,
                    });
                }
            }
        }
        let guards = model
            .guards()
            .iter()
            .map(|guard| GuardSpec {
                transition: model
                    .transition(guard.transition)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| format!("t{}", guard.transition.index())),
                place: place_name(guard.place),
                kind: guard.kind,
                threshold: guard.threshold,
            })
            .collect();
        Self {
            name: None,
            places: model.places().map(|(_, p)| p.clone()).collect(),
            transitions: model.transitions().map(|(_, t)| t.clone()).collect(),
            arcs,
            guards,
        }
    }
}

/// 按扩展名读取 `.json` 或 `.ron` 模型文件并校验。
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model, IoError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let file: ModelFile = match extension.as_str() {
        "json" => read_json(path)?,
        "ron" => read_ron(path)?,
        other => return Err(IoError::Extension(other.to_string())),
    };
    log::debug!(
        "loaded model {:?}: {} places, {} transitions",
        file.name.as_deref().unwrap_or("<unnamed>"),
        file.places.len(),
        file.transitions.len()
    );
    Ok(file.into_model()?)
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    let content = to_json_string(value)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_json_str(&content)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(ron::ser::to_string_pretty(value, PrettyConfig::default())?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn read_ron<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_ron_str(&content)
}
