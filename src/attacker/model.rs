//! Attacker model descriptions.
//!
//! Models are written as `Name(key=value, ...)`, e.g.
//! `IgnorePastNLocationsReactiveAttacker(memory_size=4, start=60)`.
//! Only the known model names and their parameters are accepted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::topology::NodeId;

/// Errors raised while reading an attacker model description
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttackerModelError {
    #[error("Unknown attacker model '{0}'")]
    UnknownModel(String),

    #[error("The attacker model '{0}' is missing its brackets (did you mean '{0}()'?)")]
    MissingBrackets(String),

    #[error("Malformed attacker model '{0}'")]
    Malformed(String),

    #[error("{model} does not take the parameter '{parameter}'")]
    UnknownParameter { model: &'static str, parameter: String },

    #[error("{model} requires the parameter '{parameter}'")]
    MissingParameter { model: &'static str, parameter: &'static str },

    #[error("Invalid value '{value}' for parameter '{parameter}'")]
    InvalidValue { parameter: String, value: String },
}

/// Movement policy selected for an attacker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttackerModel {
    /// Always follow the latest hint
    Basic,
    /// Never step straight back to the previous position
    IgnorePreviousLocation,
    /// Never step back into any of the last `memory_size` positions
    IgnorePastNLocations { memory_size: usize },
    /// Fresh-per-source hints only, and at most one move per `wait_time_secs`
    TimeSensitive { wait_time_secs: f64 },
    /// Fresh hints per message kind
    SeqNo,
    /// Fresh hints per (source, message kind)
    SeqNos,
}

impl AttackerModel {
    pub fn name(&self) -> &'static str {
        match self {
            AttackerModel::Basic => "BasicReactiveAttacker",
            AttackerModel::IgnorePreviousLocation => "IgnorePreviousLocationReactiveAttacker",
            AttackerModel::IgnorePastNLocations { .. } => "IgnorePastNLocationsReactiveAttacker",
            AttackerModel::TimeSensitive { .. } => "TimeSensitiveReactiveAttacker",
            AttackerModel::SeqNo => "SeqNoReactiveAttacker",
            AttackerModel::SeqNos => "SeqNosReactiveAttacker",
        }
    }

    /// Every model name the parser accepts
    pub fn names() -> [&'static str; 6] {
        [
            "BasicReactiveAttacker",
            "IgnorePreviousLocationReactiveAttacker",
            "IgnorePastNLocationsReactiveAttacker",
            "TimeSensitiveReactiveAttacker",
            "SeqNoReactiveAttacker",
            "SeqNosReactiveAttacker",
        ]
    }
}

/// An attacker model plus where it starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackerSpec {
    pub model: AttackerModel,
    /// Start position; the first sink when absent
    pub start: Option<NodeId>,
}

impl Default for AttackerSpec {
    fn default() -> Self {
        Self { model: AttackerModel::SeqNos, start: None }
    }
}

fn parse_value<T: FromStr>(parameter: &str, value: &str) -> Result<T, AttackerModelError> {
    value.parse().map_err(|_| AttackerModelError::InvalidValue {
        parameter: parameter.to_string(),
        value: value.to_string(),
    })
}

impl FromStr for AttackerSpec {
    type Err = AttackerModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let Some(open) = s.find('(') else {
            return Err(if AttackerModel::names().contains(&s) {
                AttackerModelError::MissingBrackets(s.to_string())
            } else {
                AttackerModelError::UnknownModel(s.to_string())
            });
        };
        if !s.ends_with(')') {
            return Err(AttackerModelError::Malformed(s.to_string()));
        }

        let name = s[..open].trim();
        let inner = s[open + 1..s.len() - 1].trim();

        let mut params: BTreeMap<String, String> = BTreeMap::new();
        for part in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| AttackerModelError::Malformed(s.to_string()))?;
            params.insert(key.trim().to_string(), value.trim().to_string());
        }

        let start = params
            .remove("start")
            .map(|v| parse_value::<NodeId>("start", &v))
            .transpose()?;

        let mut take = |model: &'static str, parameter: &'static str| {
            params
                .remove(parameter)
                .ok_or(AttackerModelError::MissingParameter { model, parameter })
        };

        let model = match name {
            "BasicReactiveAttacker" => AttackerModel::Basic,
            "IgnorePreviousLocationReactiveAttacker" => AttackerModel::IgnorePreviousLocation,
            "IgnorePastNLocationsReactiveAttacker" => {
                let value = take("IgnorePastNLocationsReactiveAttacker", "memory_size")?;
                AttackerModel::IgnorePastNLocations {
                    memory_size: parse_value("memory_size", &value)?,
                }
            }
            "TimeSensitiveReactiveAttacker" => {
                let value = take("TimeSensitiveReactiveAttacker", "wait_time_secs")?;
                AttackerModel::TimeSensitive {
                    wait_time_secs: parse_value("wait_time_secs", &value)?,
                }
            }
            "SeqNoReactiveAttacker" => AttackerModel::SeqNo,
            "SeqNosReactiveAttacker" => AttackerModel::SeqNos,
            other => return Err(AttackerModelError::UnknownModel(other.to_string())),
        };

        if let Some(parameter) = params.into_keys().next() {
            return Err(AttackerModelError::UnknownParameter { model: model.name(), parameter });
        }

        Ok(AttackerSpec { model, start })
    }
}

impl fmt::Display for AttackerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = Vec::new();
        match &self.model {
            AttackerModel::IgnorePastNLocations { memory_size } => {
                params.push(format!("memory_size={}", memory_size))
            }
            AttackerModel::TimeSensitive { wait_time_secs } => {
                params.push(format!("wait_time_secs={}", wait_time_secs))
            }
            _ => {}
        }
        if let Some(start) = self.start {
            params.push(format!("start={}", start));
        }

        write!(f, "{}({})", self.model.name(), params.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_models() {
        let spec: AttackerSpec = "SeqNosReactiveAttacker()".parse().unwrap();
        assert_eq!(spec, AttackerSpec { model: AttackerModel::SeqNos, start: None });

        let spec: AttackerSpec = "IgnorePastNLocationsReactiveAttacker(memory_size=4, start=60)"
            .parse()
            .unwrap();
        assert_eq!(spec.model, AttackerModel::IgnorePastNLocations { memory_size: 4 });
        assert_eq!(spec.start, Some(60));

        let spec: AttackerSpec = "TimeSensitiveReactiveAttacker(wait_time_secs=0.5)".parse().unwrap();
        assert_eq!(spec.model, AttackerModel::TimeSensitive { wait_time_secs: 0.5 });
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "SeqNoReactiveAttacker".parse::<AttackerSpec>(),
            Err(AttackerModelError::MissingBrackets("SeqNoReactiveAttacker".to_string()))
        );
        assert!(matches!(
            "CleverAttacker()".parse::<AttackerSpec>(),
            Err(AttackerModelError::UnknownModel(_))
        ));
        assert!(matches!(
            "IgnorePastNLocationsReactiveAttacker()".parse::<AttackerSpec>(),
            Err(AttackerModelError::MissingParameter { parameter: "memory_size", .. })
        ));
        assert!(matches!(
            "BasicReactiveAttacker(speed=2)".parse::<AttackerSpec>(),
            Err(AttackerModelError::UnknownParameter { .. })
        ));
        assert!(matches!(
            "IgnorePastNLocationsReactiveAttacker(memory_size=many)".parse::<AttackerSpec>(),
            Err(AttackerModelError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "BasicReactiveAttacker()",
            "IgnorePastNLocationsReactiveAttacker(memory_size=3,start=7)",
            "TimeSensitiveReactiveAttacker(wait_time_secs=1.5)",
        ] {
            let spec: AttackerSpec = text.parse().unwrap();
            assert_eq!(spec.to_string(), text);
        }
    }
}
