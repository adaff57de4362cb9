use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::catalog::{CATALOG, ParameterSpec};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParameterError {
    #[error("unknown parameter: {0}")]
    UnknownKey(String),
    #[error("value for {key} is not finite: {value}")]
    NotFinite { key: String, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameParameter {
    pub key: &'static str,
    pub default_value: f64,
    pub current_value: f64,
    pub normalized_value: f64,
    pub min: f64,
    pub max: f64,
    pub description: &'static str,
}

impl GameParameter {
    fn from_spec(spec: &ParameterSpec) -> Self {
        Self {
            key: spec.key,
            default_value: spec.default_value,
            current_value: spec.default_value,
            normalized_value: 0.0,
            min: spec.min,
            max: spec.max,
            description: spec.description,
        }
    }

    /// Maps `[-1, 1]` onto `[min, max]`, piecewise around the default. The
    /// endpoints and zero map exactly.
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let v = normalized.clamp(-1.0, 1.0);
        if v <= -1.0 {
            self.min
        } else if v >= 1.0 {
            self.max
        } else if v < 0.0 {
            self.default_value + v * (self.default_value - self.min)
        } else if v > 0.0 {
            self.default_value + v * (self.max - self.default_value)
        } else {
            self.default_value
        }
    }

    pub fn normalize(&self, actual: f64) -> f64 {
        let x = actual.clamp(self.min, self.max);
        if x <= self.min {
            -1.0
        } else if x >= self.max {
            1.0
        } else if x < self.default_value {
            (x - self.default_value) / (self.default_value - self.min)
        } else if x > self.default_value {
            (x - self.default_value) / (self.max - self.default_value)
        } else {
            0.0
        }
    }

    pub fn is_default(&self) -> bool {
        self.normalized_value == 0.0
    }

    fn assign_normalized(&mut self, normalized: f64) {
        self.normalized_value = normalized.clamp(-1.0, 1.0);
        self.current_value = self.denormalize(self.normalized_value);
    }

    fn assign_actual(&mut self, actual: f64) {
        self.normalized_value = self.normalize(actual);
        self.current_value = self.denormalize(self.normalized_value);
    }

    fn reset(&mut self) {
        self.normalized_value = 0.0;
        self.current_value = self.default_value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterValue {
    Normalized(f64),
    Actual(f64),
}

impl ParameterValue {
    fn raw(self) -> f64 {
        match self {
            Self::Normalized(v) | Self::Actual(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub key: String,
    #[serde(flatten)]
    pub value: ParameterValue,
}

impl ParameterUpdate {
    pub fn normalized(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: ParameterValue::Normalized(value),
        }
    }

    pub fn actual(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: ParameterValue::Actual(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterSubscription(u64);

type Observer = Box<dyn FnMut(&GameParameter) + Send>;

pub struct ParameterStore {
    parameters: Vec<GameParameter>,
    index: HashMap<&'static str, usize>,
    observers: Vec<(ParameterSubscription, Observer)>,
    next_subscription: u64,
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("parameters", &self.parameters)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        let parameters: Vec<GameParameter> = CATALOG.iter().map(GameParameter::from_spec).collect();
        let index = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.key, i))
            .collect();

        Self {
            parameters,
            index,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<GameParameter> {
        self.index.get(key).map(|&i| self.parameters[i].clone())
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.index.get(key).map(|&i| self.parameters[i].current_value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameParameter> {
        self.parameters.iter()
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&GameParameter) + Send + 'static,
    ) -> ParameterSubscription {
        let id = ParameterSubscription(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ParameterSubscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn set_normalized(&mut self, key: &str, value: f64) -> Result<GameParameter, ParameterError> {
        self.apply(&ParameterUpdate::normalized(key, value))
    }

    pub fn set_actual(&mut self, key: &str, value: f64) -> Result<GameParameter, ParameterError> {
        self.apply(&ParameterUpdate::actual(key, value))
    }

    pub fn reset_all(&mut self) {
        for param in &mut self.parameters {
            param.reset();
        }
        for i in 0..self.parameters.len() {
            self.notify(i);
        }
        log::debug!("All parameters reset to defaults");
    }

    /// Validates the whole batch, applies it, and only then notifies. A batch
    /// with any invalid update changes nothing.
    pub fn batch_set(&mut self, updates: &[ParameterUpdate]) -> Result<Vec<GameParameter>, ParameterError> {
        let mut slots = Vec::with_capacity(updates.len());
        for update in updates {
            slots.push(self.validate(update)?);
        }

        for (slot, update) in slots.iter().zip(updates) {
            self.assign(*slot, update.value);
        }

        for &slot in &slots {
            self.notify(slot);
        }

        log::debug!("Applied batch of {} parameter updates", updates.len());
        Ok(slots.iter().map(|&i| self.parameters[i].clone()).collect())
    }

    fn apply(&mut self, update: &ParameterUpdate) -> Result<GameParameter, ParameterError> {
        let slot = self.validate(update)?;
        self.assign(slot, update.value);
        self.notify(slot);
        Ok(self.parameters[slot].clone())
    }

    fn validate(&self, update: &ParameterUpdate) -> Result<usize, ParameterError> {
        let slot = *self
            .index
            .get(update.key.as_str())
            .ok_or_else(|| ParameterError::UnknownKey(update.key.clone()))?;

        let raw = update.value.raw();
        if !raw.is_finite() {
            return Err(ParameterError::NotFinite {
                key: update.key.clone(),
                value: raw,
            });
        }

        Ok(slot)
    }

    fn assign(&mut self, slot: usize, value: ParameterValue) {
        let param = &mut self.parameters[slot];
        match value {
            ParameterValue::Normalized(v) => param.assign_normalized(v),
            ParameterValue::Actual(x) => param.assign_actual(x),
        }
        log::trace!(
            "{} = {} (normalized {})",
            param.key,
            param.current_value,
            param.normalized_value
        );
    }

    fn notify(&mut self, slot: usize) {
        let snapshot = self.parameters[slot].clone();
        for (_, observer) in &mut self.observers {
            observer(&snapshot);
        }
    }
}
