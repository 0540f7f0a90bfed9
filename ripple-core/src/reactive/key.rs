//! Identities used by the dependency store.
//!
//! Observed objects are tracked by identity, never by value: two observables
//! holding equal data get distinct [`TargetId`]s and independent dependency
//! entries. Ids come from process-wide counters and are never reused, so a
//! stale id can never alias a newer object.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Generate a new unique id.
            pub fn new() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(0);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Get the raw id value.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

counter_id!(
    /// Identity of an observed object (or a computed value's private target).
    TargetId,
    "target"
);

counter_id!(
    /// Identity of a registered effect.
    EffectId,
    "effect"
);

/// A unique, non-string property key.
///
/// Two symbols are never equal, even with the same description. Computed
/// values use one as the private key outer effects subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    id: u64,
    description: Cow<'static, str>,
}

impl SymbolKey {
    pub fn new(description: impl Into<Cow<'static, str>>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// The identifier read or written on an observed object.
///
/// Dependencies are recorded per `(TargetId, PropertyKey)` pair, which is what
/// makes tracking fine-grained: writing `a` never wakes an effect that only
/// read `b` on the same object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// A named field of an object.
    Name(Cow<'static, str>),
    /// A position in an array.
    Index(usize),
    /// A private key that cannot collide with data fields.
    Symbol(SymbolKey),
}

impl PropertyKey {
    /// Mint a fresh symbol key.
    pub fn symbol(description: impl Into<Cow<'static, str>>) -> Self {
        Self::Symbol(SymbolKey::new(description))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "`{name}`"),
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
        }
    }
}

impl From<&'static str> for PropertyKey {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<SymbolKey> for PropertyKey {
    fn from(symbol: SymbolKey) -> Self {
        Self::Symbol(symbol)
    }
}
