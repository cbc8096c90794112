// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Parameter definitions and the two-layer parameter store.
//!
//! Persistent values are explicit user settings and survive across
//! loads. Transient values are auto-derived for the current track only
//! and are discarded wholesale when the next track loads. The effective
//! value of a parameter is transient-if-present, else persistent, else
//! the definition's default.
//!
//! The store holds values and validates ids; applying format-specific
//! side effects is the driver's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean toggle value.
    Bool(bool),
    /// An integer value (enum selections, bank indices).
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value (soundfont paths).
    Str(String),
}

impl ParamValue {
    /// Returns the integer value, coercing floats.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Returns the float value, coercing integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// The kind of control a parameter renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A pick-one list with grouped options.
    Enum,
    /// A numeric slider.
    Number,
    /// An on/off toggle.
    Toggle,
    /// A momentary action.
    Button,
}

/// One selectable option of an enum parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamOption {
    /// Display label.
    pub label: String,
    /// The value stored when selected.
    pub value: ParamValue,
}

/// A labeled group of options.
#[derive(Debug, Clone, Serialize)]
pub struct ParamOptionGroup {
    /// Group heading.
    pub label: String,
    /// The options in the group.
    pub items: Vec<ParamOption>,
}

/// A dependency on another parameter's current value; UIs hide the
/// parameter unless the dependency holds.
#[derive(Debug, Clone, Serialize)]
pub struct DependsOn {
    /// The parameter this one depends on.
    pub param: &'static str,
    /// The value that makes this parameter relevant.
    pub value: ParamValue,
}

/// A static parameter descriptor. Immutable after construction except
/// for option lists discovered during the session (soundfont files, MIDI
/// output devices), which may be appended.
#[derive(Debug, Clone, Serialize)]
pub struct ParamDef {
    /// Stable identifier.
    pub id: &'static str,
    /// Display label.
    pub label: String,
    /// Optional help text.
    pub hint: Option<String>,
    /// Control kind.
    pub kind: ParamKind,
    /// Grouped options for enum parameters.
    pub options: Vec<ParamOptionGroup>,
    /// Range for number parameters.
    pub min: Option<f64>,
    /// Range for number parameters.
    pub max: Option<f64>,
    /// Step for number parameters.
    pub step: Option<f64>,
    /// Default value; buttons have none.
    pub default: Option<ParamValue>,
    /// Visibility dependency.
    pub depends_on: Option<DependsOn>,
}

impl ParamDef {
    /// A minimal definition; callers fill in the rest with struct update
    /// syntax.
    pub fn new(id: &'static str, label: &str, kind: ParamKind) -> ParamDef {
        ParamDef {
            id,
            label: label.to_string(),
            hint: None,
            kind,
            options: Vec::new(),
            min: None,
            max: None,
            step: None,
            default: None,
            depends_on: None,
        }
    }
}

/// Errors raised by the parameter store.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    /// The id does not match any definition. Non-fatal; drivers log a
    /// warning and ignore the set.
    #[error("unknown parameter {0:?}")]
    UnknownParameter(String),
}

/// Holds parameter definitions plus the persistent and transient value
/// layers.
pub struct ParameterStore {
    defs: Vec<ParamDef>,
    persistent: HashMap<&'static str, ParamValue>,
    transient: HashMap<&'static str, ParamValue>,
}

impl ParameterStore {
    /// Creates a store over the given definitions.
    pub fn new(defs: Vec<ParamDef>) -> ParameterStore {
        ParameterStore {
            defs,
            persistent: HashMap::new(),
            transient: HashMap::new(),
        }
    }

    /// The parameter definitions, for UI enumeration.
    pub fn defs(&self) -> &[ParamDef] {
        &self.defs
    }

    /// Mutable access to a definition, for appending discovered options.
    pub fn def_mut(&mut self, id: &str) -> Option<&mut ParamDef> {
        self.defs.iter_mut().find(|def| def.id == id)
    }

    /// Writes a value. Transient writes go to the per-track layer; a
    /// persistent write clears any stale transient override for the id.
    pub fn set(&mut self, id: &str, value: ParamValue, transient: bool) -> Result<(), ParamError> {
        let def_id = self
            .defs
            .iter()
            .find(|def| def.id == id)
            .map(|def| def.id)
            .ok_or_else(|| ParamError::UnknownParameter(id.to_string()))?;

        if transient {
            self.transient.insert(def_id, value);
        } else {
            self.transient.remove(def_id);
            self.persistent.insert(def_id, value);
        }
        Ok(())
    }

    /// Resolves the effective value: transient, else persistent, else
    /// the definition default.
    pub fn get(&self, id: &str) -> Option<ParamValue> {
        if let Some(value) = self.transient.get(id) {
            return Some(value.clone());
        }
        if let Some(value) = self.persistent.get(id) {
            return Some(value.clone());
        }
        self.defs
            .iter()
            .find(|def| def.id == id)
            .and_then(|def| def.default.clone())
    }

    /// Returns the currently effective transient override for an id, if
    /// any.
    pub fn transient(&self, id: &str) -> Option<&ParamValue> {
        self.transient.get(id)
    }

    /// Discards the whole transient layer. Called at the start of every
    /// load, before per-track auto-detection repopulates it.
    pub fn reset_transient(&mut self) {
        self.transient.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn store() -> ParameterStore {
        ParameterStore::new(vec![
            ParamDef {
                default: Some(ParamValue::Int(0)),
                ..ParamDef::new("synthengine", "Synth Engine", ParamKind::Enum)
            },
            ParamDef {
                default: Some(ParamValue::Bool(true)),
                ..ParamDef::new("autoengine", "Auto Engine", ParamKind::Toggle)
            },
        ])
    }

    #[test]
    fn test_default_then_persistent_then_transient() {
        let mut store = store();
        assert_eq!(Some(ParamValue::Int(0)), store.get("synthengine"));

        store
            .set("synthengine", ParamValue::Int(1), false)
            .expect("set");
        assert_eq!(Some(ParamValue::Int(1)), store.get("synthengine"));

        store
            .set("synthengine", ParamValue::Int(2), true)
            .expect("set");
        assert_eq!(Some(ParamValue::Int(2)), store.get("synthengine"));
    }

    #[test]
    fn test_reset_transient_restores_persistent() {
        let mut store = store();
        store
            .set("synthengine", ParamValue::Int(1), false)
            .expect("set");
        store
            .set("synthengine", ParamValue::Int(2), true)
            .expect("set");

        store.reset_transient();
        assert_eq!(Some(ParamValue::Int(1)), store.get("synthengine"));
    }

    #[test]
    fn test_persistent_write_clears_transient() {
        let mut store = store();
        store
            .set("synthengine", ParamValue::Int(2), true)
            .expect("set");
        store
            .set("synthengine", ParamValue::Int(1), false)
            .expect("set");
        assert!(store.transient("synthengine").is_none());
        assert_eq!(Some(ParamValue::Int(1)), store.get("synthengine"));
    }

    #[test]
    fn test_unknown_parameter() {
        let mut store = store();
        assert!(store.set("bogus", ParamValue::Int(1), false).is_err());
        assert!(store.get("bogus").is_none());
    }
}
