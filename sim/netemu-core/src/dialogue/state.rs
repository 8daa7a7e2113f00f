//! Per-walk session state.

use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error as ThisError;

/// A key-value store carried through one dialogue walk.
///
/// Every callable in a dialogue sees the same state, so a step can leave
/// something behind for a later one, such as a loop counter checked by a
/// fork.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State(FxHashMap<String, Value>);

impl State {
    pub fn new() -> Self {
        Default::default()
    }

    /// A builder function that adds the given key-value pair to the state.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Result<Self, StateError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Adds the given key-value pair, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), StateError> {
        let value = serde_json::to_value(value).map_err(|e| StateError::Codec(e.to_string()))?;
        self.0.insert(key.into(), value);
        Ok(())
    }

    /// Gets the value for the given key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| StateError::Missing(key.to_owned()))?;
        T::deserialize(value).map_err(|e| StateError::Codec(e.to_string()))
    }

    /// Gets the value for the given key, or `default` if it is not set.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, StateError> {
        match self.get(key) {
            Err(StateError::Missing(_)) => Ok(default),
            other => other,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("State key {0:?} missing")]
    Missing(String),
    #[error("{0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let state = State::new().with("count", 3u32).unwrap();
        assert_eq!(state.get::<u32>("count"), Ok(3));
        assert!(state.get::<String>("count").is_err());
        assert_eq!(
            state.get::<u32>("other"),
            Err(StateError::Missing("other".into()))
        );
        assert_eq!(state.get_or("other", 7u32), Ok(7));
    }
}
