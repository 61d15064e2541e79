//! Transform descriptor model and the structural deep-merge engine.
//!
//! A descriptor is a JSON object keyed by transform-kind key, where each value
//! is either a flag (`{"restore": true}`) or a parameter object
//! (`{"recolor": {"prompt": "car", "to": "#fff"}}`). Patches share the same
//! shape and are folded in with [`deep_merge`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{AspectRatio, TransformKind};

/// Cumulative transform descriptor applied to produce a Version-1 render.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformConfig(Map<String, Value>);

impl TransformConfig {
    /// Empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no kind has any parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters recorded for `kind`, if any.
    pub fn get(&self, kind: TransformKind) -> Option<&Value> {
        self.0.get(kind.as_key())
    }

    /// String parameter under `kind`, if present.
    pub fn param_str(&self, kind: TransformKind, name: &str) -> Option<&str> {
        self.get(kind)?.get(name)?.as_str()
    }

    /// Folds `patch` in, returning a new descriptor. Neither input is mutated.
    pub fn apply(&self, patch: &ConfigPatch) -> TransformConfig {
        let merged = deep_merge(&Value::Object(patch.0.clone()), &Value::Object(self.0.clone()));
        match merged {
            Value::Object(map) => TransformConfig(map),
            other => TransformConfig(single_entry("merged", other)),
        }
    }

    /// Raw JSON view, used when persisting the descriptor.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Partial per-kind parameter patch produced by form edits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigPatch(Map<String, Value>);

impl ConfigPatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the patch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Single-parameter patch: `{kind: {name: value}}`.
    pub fn field(kind: TransformKind, name: &str, value: impl Into<Value>) -> Self {
        Self(single_entry(
            kind.as_key(),
            Value::Object(single_entry(name, value.into())),
        ))
    }

    /// Flag patch enabling a parameterless kind: `{kind: true}`.
    pub fn kind_flag(kind: TransformKind) -> Self {
        Self(single_entry(kind.as_key(), Value::Bool(true)))
    }

    /// Fill patch targeting an aspect ratio preset.
    pub fn fill_aspect(aspect: AspectRatio) -> Self {
        Self::field(TransformKind::Fill, "aspectRatio", aspect.label())
    }

    /// Folds another patch into this one, last writer winning per leaf.
    pub fn merge(&self, later: &ConfigPatch) -> ConfigPatch {
        let merged = deep_merge(&Value::Object(later.0.clone()), &Value::Object(self.0.clone()));
        match merged {
            Value::Object(map) => ConfigPatch(map),
            other => ConfigPatch(single_entry("merged", other)),
        }
    }

    /// String parameter under `kind`, if present.
    pub fn param_str(&self, kind: TransformKind, name: &str) -> Option<&str> {
        self.0.get(kind.as_key())?.get(name)?.as_str()
    }
}

/// Structural deep merge of `patch` over `base`.
///
/// Objects merge recursively, scalar leaves overwrite, arrays replace
/// wholesale. Pure and idempotent: `deep_merge(p, &deep_merge(p, c)) ==
/// deep_merge(p, c)`.
pub fn deep_merge(patch: &Value, base: &Value) -> Value {
    match (patch, base) {
        (Value::Object(patch_map), Value::Object(base_map)) => {
            let mut out = base_map.clone();
            for (key, patch_val) in patch_map {
                let merged = match out.get(key) {
                    Some(base_val) => deep_merge(patch_val, base_val),
                    None => patch_val.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (Value::Null, base) => base.clone(),
        (patch, _) => patch.clone(),
    }
}

fn single_entry(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}
