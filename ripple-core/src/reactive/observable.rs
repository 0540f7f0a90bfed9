//! Observable Implementation
//!
//! An Observable wraps a plain data object so that every field access goes
//! through the runtime.
//!
//! # How Observables Work
//!
//! 1. `observe` serializes the raw value with serde and keeps its fields in an
//!    insertion-ordered map, one entry per key.
//!
//! 2. A read of key `k` subscribes the running effect to `(object, k)`, then
//!    returns the stored value.
//!
//! 3. A write of key `k` stores the new value, then notifies the effects
//!    subscribed to `(object, k)`.
//!
//! Nothing else is intercepted. Nested objects and arrays are stored as plain
//! values; only the top level is observed.
//!
//! # Identity
//!
//! Every observable gets its own [`TargetId`]. Clones share the same object;
//! observing equal data twice yields two independent objects. Dropping the
//! last clone removes the object's entries from the dependency store.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::key::{PropertyKey, TargetId};
use super::runtime::RuntimeInner;
use crate::error::{ReactiveError, Result};

/// Whether the raw value was an object or an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

struct Target {
    id: TargetId,
    shape: Shape,
    fields: RefCell<IndexMap<PropertyKey, Value>>,
    runtime: Weak<RuntimeInner>,
}

impl Drop for Target {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_target(self.id);
        }
    }
}

/// An observed object.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let state = rt.observe(&serde_json::json!({ "ok": true, "text": "a" })).unwrap();
///
/// assert_eq!(state.get_as::<bool>("ok").unwrap(), true);
/// state.set("text", "b").unwrap();
/// assert_eq!(state.get_as::<String>("text").unwrap(), "b");
/// ```
#[derive(Clone)]
pub struct Observable {
    target: Rc<Target>,
}

impl Observable {
    pub(crate) fn new(runtime: Weak<RuntimeInner>, raw: Value) -> Result<Self> {
        let (shape, fields) = match raw {
            Value::Object(map) => (
                Shape::Object,
                map.into_iter()
                    .map(|(name, value)| (PropertyKey::from(name), value))
                    .collect(),
            ),
            Value::Array(items) => (
                Shape::Array,
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| (PropertyKey::Index(index), value))
                    .collect(),
            ),
            other => {
                return Err(ReactiveError::NotAnObject {
                    kind: kind_of(&other),
                })
            }
        };

        let target = Target {
            id: TargetId::new(),
            shape,
            fields: RefCell::new(fields),
            runtime,
        };
        tracing::debug!(object = %target.id, ?shape, "observing object");

        Ok(Self {
            target: Rc::new(target),
        })
    }

    pub fn id(&self) -> TargetId {
        self.target.id
    }

    pub fn shape(&self) -> Shape {
        self.target.shape
    }

    /// Read a field, subscribing the running effect to it.
    ///
    /// Absent keys are subscribed too, so an effect wakes when the key is
    /// first written.
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        let key = key.into();
        self.track(&key);
        self.target.fields.borrow().get(&key).cloned()
    }

    /// Read a field as `T`, subscribing the running effect to it.
    pub fn get_as<T: DeserializeOwned>(&self, key: impl Into<PropertyKey>) -> Result<T> {
        let key = key.into();
        let value = self
            .get(key.clone())
            .ok_or(ReactiveError::MissingKey(key))?;
        serde_json::from_value(value).map_err(ReactiveError::Decode)
    }

    /// Read a field without establishing a dependency.
    pub fn get_untracked(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        self.target.fields.borrow().get(&key.into()).cloned()
    }

    /// Write a field and notify its subscribers.
    ///
    /// Fails if the value cannot be encoded (storage is left untouched), or
    /// if a subscriber's scheduler fails and no error handler is installed.
    /// In the latter case the write itself has already happened.
    pub fn set<V: Serialize>(&self, key: impl Into<PropertyKey>, value: V) -> Result<()> {
        let value = serde_json::to_value(value).map_err(ReactiveError::Encode)?;
        self.write(key.into(), value)
    }

    /// Write a raw JSON value and notify its subscribers.
    pub fn set_value(&self, key: impl Into<PropertyKey>, value: Value) -> Result<()> {
        self.write(key.into(), value)
    }

    /// Read a field as `T`, transform it, and write it back.
    ///
    /// The read is tracked, exactly like `state.n = state.n + 1` would be.
    pub fn update<T, F>(&self, key: impl Into<PropertyKey>, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let key = key.into();
        let current = self.get_as::<T>(key.clone())?;
        self.set(key, f(current))
    }

    pub fn contains_key(&self, key: impl Into<PropertyKey>) -> bool {
        self.target.fields.borrow().contains_key(&key.into())
    }

    /// Field keys in insertion order. Untracked.
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.target.fields.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.target.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.fields.borrow().is_empty()
    }

    /// Current contents as a plain JSON value. Untracked.
    ///
    /// Symbol keys are private and left out. Arrays are rebuilt from index
    /// keys, with `null` filling any gaps.
    pub fn to_value(&self) -> Value {
        let fields = self.target.fields.borrow();
        match self.target.shape {
            Shape::Object => Value::Object(
                fields
                    .iter()
                    .filter_map(|(key, value)| Some((key.as_name()?.to_owned(), value.clone())))
                    .collect::<Map<_, _>>(),
            ),
            Shape::Array => {
                let len = fields
                    .keys()
                    .filter_map(PropertyKey::as_index)
                    .max()
                    .map_or(0, |max| max + 1);
                let mut items = vec![Value::Null; len];
                for (key, value) in fields.iter() {
                    if let Some(index) = key.as_index() {
                        items[index] = value.clone();
                    }
                }
                Value::Array(items)
            }
        }
    }

    /// Current contents converted back into a plain Rust value. Untracked.
    pub fn snapshot<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value()).map_err(ReactiveError::Decode)
    }

    /// Number of effects subscribed to `key`.
    pub fn subscriber_count(&self, key: impl Into<PropertyKey>) -> usize {
        self.target
            .runtime
            .upgrade()
            .map_or(0, |runtime| {
                runtime.store.borrow().subscriber_count(self.target.id, &key.into())
            })
    }

    fn track(&self, key: &PropertyKey) {
        if let Some(runtime) = self.target.runtime.upgrade() {
            runtime.track(self.target.id, key);
        }
    }

    fn write(&self, key: PropertyKey, value: Value) -> Result<()> {
        let previous = self.target.fields.borrow_mut().insert(key.clone(), value);
        drop(previous);

        match self.target.runtime.upgrade() {
            Some(runtime) => runtime.trigger(self.target.id, &key),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.target.id)
            .field("shape", &self.target.shape)
            .field("fields", &self.target.fields.borrow())
            .finish()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
