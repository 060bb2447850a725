//! # Logging Scopes
//!
//! A scope is contextual data a caller pushes for the duration of some work
//! ("request_id = 42", "processing batch 7") so that every record logged
//! inside that work carries it.
//!
//! ## Closed Variant Instead of Runtime Type Tests
//!
//! Scope frames come in three shapes, fixed when the frame is created:
//!
//! ```text
//! Scope::Pair("request_id", 42)             → merged as "request_id": 42
//! Scope::Pairs([("a", 1), ("b", 2)])        → merged as "a": 1, "b": 2
//! Scope::Text("processing batch 7")         → appended to "Scope": [...]
//! ```
//!
//! Anything that is not a pair or a pair collection is turned into text once,
//! at the call boundary, via [`Scope::text`]. The codec only ever matches on
//! these three variants.
//!
//! ## Explicit Stack
//!
//! [`ScopeStack`] is an ordinary value passed by reference to logging calls.
//! There is no thread-local or global scope state. Frames are iterated in push
//! order, outermost first; later frames overwrite earlier keys.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};

use serde_json::Value;

// =============================================================================
// Scope Frame
// =============================================================================

/// One frame of the scope stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// A single key/value pair.
    Pair(String, Value),
    /// A collection of key/value pairs, merged in order.
    Pairs(Vec<(String, Value)>),
    /// Anything else, already converted to text.
    Text(String),
}

impl Scope {
    pub fn pair(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Scope::Pair(key.into(), value.into())
    }

    pub fn pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Scope::Pairs(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wraps an opaque value as an unnamed scope using its `Display` form.
    pub fn text(value: impl fmt::Display) -> Self {
        Scope::Text(value.to_string())
    }
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for Scope {
    fn from((key, value): (K, V)) -> Self {
        Scope::pair(key, value)
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for Scope {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Scope::pairs(pairs)
    }
}

impl<K: Into<String>, V: Into<Value>> From<BTreeMap<K, V>> for Scope {
    fn from(map: BTreeMap<K, V>) -> Self {
        Scope::pairs(map)
    }
}

/// `HashMap` iteration order is unspecified, so pairs are sorted by key to
/// keep the stored state stable between runs.
impl<K: Into<String>, V: Into<Value>> From<HashMap<K, V>> for Scope {
    fn from(map: HashMap<K, V>) -> Self {
        let mut pairs: Vec<(String, Value)> =
            map.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Scope::Pairs(pairs)
    }
}

impl From<&str> for Scope {
    fn from(text: &str) -> Self {
        Scope::Text(text.to_string())
    }
}

impl From<String> for Scope {
    fn from(text: String) -> Self {
        Scope::Text(text)
    }
}

// =============================================================================
// Scope Stack
// =============================================================================

/// The active scopes for a unit of work, outermost first.
///
/// # Example
///
/// ```rust
/// use sqlite_logger::ScopeStack;
///
/// let mut scopes = ScopeStack::new();
/// scopes.push(("request_id", 42));
/// {
///     let inner = scopes.enter("[retry]");
///     assert_eq!(inner.len(), 2);
/// }
/// assert_eq!(scopes.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeStack {
    frames: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an innermost frame.
    pub fn push(&mut self, scope: impl Into<Scope>) {
        self.frames.push(scope.into());
    }

    /// Removes and returns the innermost frame.
    pub fn pop(&mut self) -> Option<Scope> {
        self.frames.pop()
    }

    /// Pushes a frame and returns a guard that pops it when dropped.
    ///
    /// The guard derefs to the stack, so it can be passed wherever a
    /// `&ScopeStack` is expected and nested with further `enter` calls.
    pub fn enter(&mut self, scope: impl Into<Scope>) -> ScopeGuard<'_> {
        let restore_len = self.frames.len();
        self.push(scope);
        ScopeGuard {
            stack: self,
            restore_len,
        }
    }

    /// Iterates frames outermost (first pushed) to innermost.
    pub fn iter(&self) -> std::slice::Iter<'_, Scope> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl<'a> IntoIterator for &'a ScopeStack {
    type Item = &'a Scope;
    type IntoIter = std::slice::Iter<'a, Scope>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<S: Into<Scope>> FromIterator<S> for ScopeStack {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Restores a [`ScopeStack`] to its previous depth when dropped.
///
/// # Rust Pattern: RAII Guard
///
/// Dropping the guard truncates the stack back to the length it had before
/// `enter`, so frames pushed through the guard afterwards are removed too.
pub struct ScopeGuard<'a> {
    stack: &'a mut ScopeStack,
    restore_len: usize,
}

impl Deref for ScopeGuard<'_> {
    type Target = ScopeStack;

    fn deref(&self) -> &ScopeStack {
        self.stack
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.stack.frames.truncate(self.restore_len);
    }
}

// =============================================================================
// Tests
// =============================================================================
