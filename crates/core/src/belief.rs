//! Belief-state model for a single annotated turn.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::helpers::{python_list_literal, python_scalar_text};

/// A slot value as it appears in an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Scalar(String),
    List(Vec<String>),
}

impl SlotValue {
    /// Literal text used when the value is written into a flattened line.
    ///
    /// Lists keep their Python literal form (`['XXL', 'S']`), scalars are
    /// written as-is.
    pub fn literal(&self) -> String {
        match self {
            SlotValue::Scalar(s) => s.clone(),
            SlotValue::List(items) => python_list_literal(items),
        }
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        SlotValue::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for SlotValue {
    fn from(items: Vec<String>) -> Self {
        SlotValue::List(items)
    }
}

impl TryFrom<Value> for SlotValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(format!("list slot values must hold strings, found {}", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SlotValue::List),
            other => python_scalar_text(&other)
                .map(SlotValue::Scalar)
                .ok_or_else(|| format!("unsupported slot value {}", other)),
        }
    }
}

/// Structured state of one turn: dialog act, slots, requests and object refs.
///
/// Strings are kept exactly as annotated; trimming happens when the frame is
/// flattened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawAnnotation")]
pub struct BeliefFrame {
    pub act: String,
    /// Slot name/value pairs in annotation order.
    pub slot_values: Vec<(String, SlotValue)>,
    pub request_slots: Vec<String>,
    pub objects: Vec<i64>,
    pub disambiguation_candidates: Vec<i64>,
}

impl BeliefFrame {
    pub fn new(act: impl Into<String>) -> Self {
        Self {
            act: act.into(),
            ..Default::default()
        }
    }

    pub fn with_slot(mut self, name: impl Into<String>, value: impl Into<SlotValue>) -> Self {
        self.slot_values.push((name.into(), value.into()));
        self
    }

    pub fn with_request_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_slots.extend(slots.into_iter().map(Into::into));
        self
    }

    pub fn with_objects(mut self, objects: impl IntoIterator<Item = i64>) -> Self {
        self.objects.extend(objects);
        self
    }

    pub fn with_disambiguation_candidates(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.disambiguation_candidates.extend(ids);
        self
    }

    /// Slot names in annotation order.
    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slot_values.iter().map(|(name, _)| name.as_str())
    }
}

/// Annotation shape as stored in the corpus JSON.
#[derive(Debug, Default, Deserialize)]
struct RawAnnotation {
    #[serde(default)]
    act: String,
    #[serde(default)]
    act_attributes: RawActAttributes,
    #[serde(default)]
    disambiguation_candidates: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawActAttributes {
    #[serde(default)]
    slot_values: Map<String, Value>,
    #[serde(default)]
    request_slots: Vec<String>,
    #[serde(default)]
    objects: Vec<i64>,
}

impl TryFrom<RawAnnotation> for BeliefFrame {
    type Error = String;

    fn try_from(raw: RawAnnotation) -> Result<Self, Self::Error> {
        let slot_values = raw
            .act_attributes
            .slot_values
            .into_iter()
            .map(|(name, value)| {
                SlotValue::try_from(value)
                    .map(|v| (name.clone(), v))
                    .map_err(|e| format!("slot '{}': {}", name, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            act: raw.act,
            slot_values,
            request_slots: raw.act_attributes.request_slots,
            objects: raw.act_attributes.objects,
            disambiguation_candidates: raw.disambiguation_candidates,
        })
    }
}
