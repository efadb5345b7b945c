//! Named request inputs.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Name of an input a task may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    Prompt,
    Image,
}

impl InputField {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputField::Prompt => "prompt",
            InputField::Image => "image",
        }
    }
}

/// A single input value. Images are carried as the encoded bytes the caller
/// supplied; decoding is the executor's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValue {
    Text(String),
    Image(Vec<u8>),
}

/// The inputs of one request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    values: BTreeMap<InputField, InputValue>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.insert(InputField::Prompt, InputValue::Text(prompt.into()));
        self
    }

    pub fn with_image(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(InputField::Image, InputValue::Image(bytes.into()));
        self
    }

    pub fn insert(&mut self, field: InputField, value: InputValue) -> Option<InputValue> {
        self.values.insert(field, value)
    }

    pub fn get(&self, field: InputField) -> Option<&InputValue> {
        self.values.get(&field)
    }

    pub(crate) fn take(&mut self, field: InputField) -> Option<InputValue> {
        self.values.remove(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every input not in `declared`, returning the names that were dropped.
    pub(crate) fn retain_declared(&mut self, declared: &[InputField]) -> Vec<InputField> {
        let dropped = self.values
            .keys()
            .filter(|field| !declared.contains(*field))
            .copied()
            .collect::<Vec<_>>();
        self.values.retain(|field, _| declared.contains(field));
        dropped
    }

    /// Required fields absent from this request, in declaration order.
    pub(crate) fn missing(&self, required: &[InputField]) -> Vec<InputField> {
        required
            .iter()
            .filter(|field| !self.values.contains_key(*field))
            .copied()
            .collect()
    }
}
