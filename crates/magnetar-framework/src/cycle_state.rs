use crate::error::{Result, SchedulerError};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// A value stored in [`CycleState`].
///
/// Stored values must be able to produce an independent copy of themselves:
/// the runner forks the state when it evaluates multiple nodes concurrently,
/// and forks must not share mutable data.
pub trait StateData: fmt::Debug + Send + Sync {
    /// Produce an independent copy of this value
    fn clone_data(&self) -> Box<dyn StateData>;

    /// Access the value for typed reads
    fn as_any(&self) -> &dyn Any;
}

impl<T> StateData for T
where
    T: Any + Clone + fmt::Debug + Send + Sync,
{
    fn clone_data(&self) -> Box<dyn StateData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-scheduling-attempt key/value store.
///
/// Carries data produced by one phase for consumption by a later phase
/// within the same attempt. Created at the start of the scheduling cycle,
/// dropped when the binding cycle completes or fails, never shared across
/// pods. Concurrent writers on the same key are a caller error; the
/// container does not serialize them.
#[derive(Debug, Default)]
pub struct CycleState {
    data: HashMap<String, Box<dyn StateData>>,
}

impl CycleState {
    /// Create an empty cycle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under a key, overwriting any prior value
    pub fn write(&mut self, key: impl Into<String>, value: Box<dyn StateData>) {
        self.data.insert(key.into(), value);
    }

    /// Retrieve the value stored under a key, downcast to `T`
    pub fn read<T: Any>(&self, key: &str) -> Result<&T> {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| SchedulerError::StateKeyNotFound {
                key: key.to_string(),
            })?;

        (**value)
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SchedulerError::StateTypeMismatch {
                key: key.to_string(),
            })
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Fork the state for an independent per-node evaluation.
    ///
    /// Every entry is deep-copied via [`StateData::clone_data`], so writes
    /// to the fork never leak back into the base state.
    pub fn fork(&self) -> CycleState {
        let data = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), (**v).clone_data()))
            .collect();
        CycleState { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
