//! Host value model and its canonical rendering.
//!
//! Everything that flows into a version id or a cache key is a [`Value`]:
//! declared constants, captured globals and free variables, and call
//! arguments. Rendering is deterministic:
//!
//! - scalars, strings, booleans and null pass through unchanged
//! - lists recurse element-wise, maps recurse with keys sorted
//! - sets are rendered as a sorted sequence under a `$set` tag
//! - opaque handles collapse to a `$opaque` placeholder naming their type
//! - a [`Tracked`] value (the output of a prior invocation) is replaced by
//!   a `$invocation` reference token
//!
//! The canonical text is compact JSON, so the same value always renders to
//! the same bytes regardless of map insertion order or set iteration order.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};

use crate::error::CoreError;
use crate::id::InvocationId;

/// A host value as seen by the fingerprinting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Keyed container. Insertion order is kept for display only.
    Map(IndexMap<String, Value>),
    /// Unordered collection; element order never affects rendering.
    Set(Vec<Value>),
    /// A handle with no deterministic textual form (a socket, a client, a
    /// file descriptor). Only the type name reaches the hash.
    Opaque { type_name: String },
    /// The output of a prior invocation.
    Tracked(Tracked),
}

/// A program result tagged with the invocation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked {
    pub origin: InvocationId,
    pub value: Box<Value>,
}

impl Tracked {
    pub fn new(origin: InvocationId, value: Value) -> Self {
        Tracked {
            origin,
            value: Box::new(value),
        }
    }

    /// The first text unit of the payload, if any.
    pub fn text(&self) -> Option<&str> {
        match self.value.as_ref() {
            Value::Str(s) => Some(s),
            Value::List(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

impl Value {
    /// Placeholder for a value whose textual form is not deterministic.
    pub fn opaque(type_name: impl Into<String>) -> Self {
        Value::Opaque {
            type_name: type_name.into(),
        }
    }

    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Opaque { .. } => "opaque",
            Value::Tracked(_) => "tracked",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Tracked(t) => t.value.as_str(),
            _ => None,
        }
    }

    /// The invocation this value came from, if it is a tracked output.
    pub fn origin(&self) -> Option<InvocationId> {
        match self {
            Value::Tracked(t) => Some(t.origin),
            _ => None,
        }
    }

    /// Checks that this value has the shape of a program result: a single
    /// text unit or an ordered sequence of text units. Tracked wrappers
    /// are looked through.
    pub fn check_result_shape(&self) -> Result<(), CoreError> {
        match self {
            Value::Str(_) => Ok(()),
            Value::Tracked(t) => t.value.check_result_shape(),
            Value::List(items) => {
                for item in items {
                    if item.as_str().is_none() {
                        return Err(CoreError::TypeConstraint {
                            found: format!("list containing {}", item.type_name()),
                        });
                    }
                }
                Ok(())
            }
            other => Err(CoreError::TypeConstraint {
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Strips every [`Tracked`] wrapper, keeping only payloads.
    pub fn untracked(&self) -> Value {
        match self {
            Value::Tracked(t) => t.value.untracked(),
            Value::List(items) => Value::List(items.iter().map(Value::untracked).collect()),
            Value::Set(items) => Value::Set(items.iter().map(Value::untracked).collect()),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.untracked()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Collects the origins of every tracked value reachable from `self`,
    /// in first-seen order.
    pub fn collect_origins(&self, out: &mut IndexSet<InvocationId>) {
        match self {
            Value::Tracked(t) => {
                out.insert(t.origin);
            }
            Value::List(items) | Value::Set(items) => {
                for item in items {
                    item.collect_origins(out);
                }
            }
            Value::Map(entries) => {
                for value in entries.values() {
                    value.collect_origins(out);
                }
            }
            _ => {}
        }
    }

    /// Projects the value onto plain JSON with every non-deterministic part
    /// removed. Fails if a tracked value does not carry a result-shaped
    /// payload.
    pub fn to_canonical(&self) -> Result<serde_json::Value, CoreError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => match Number::from_f64(*f) {
                Some(n) => serde_json::Value::Number(n),
                // NaN and infinities have no JSON form.
                None => serde_json::Value::String(format!("$float:{}", f)),
            },
            Value::Str(s) => serde_json::Value::String(escape_marker(s)),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_canonical)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                let mut map = Map::new();
                for key in keys {
                    map.insert(escape_marker(key), entries[key].to_canonical()?);
                }
                serde_json::Value::Object(map)
            }
            Value::Set(items) => {
                let mut rendered: Vec<(String, serde_json::Value)> = items
                    .iter()
                    .map(|item| {
                        let canonical = item.to_canonical()?;
                        Ok((canonical.to_string(), canonical))
                    })
                    .collect::<Result<_, CoreError>>()?;
                rendered.sort_by(|a, b| a.0.cmp(&b.0));
                rendered.dedup_by(|a, b| a.0 == b.0);
                tagged(
                    "$set",
                    serde_json::Value::Array(rendered.into_iter().map(|(_, v)| v).collect()),
                )
            }
            Value::Opaque { type_name } => {
                tagged("$opaque", serde_json::Value::String(type_name.clone()))
            }
            Value::Tracked(t) => {
                t.value.check_result_shape()?;
                tagged("$invocation", serde_json::Value::String(t.origin.to_string()))
            }
        })
    }

    /// Compact canonical text of the value.
    pub fn render(&self) -> Result<String, CoreError> {
        Ok(self.to_canonical()?.to_string())
    }
}

/// User text starting with `$` gets one more `$`, so it can never read as
/// a tag (`$set`, `$opaque`, `$invocation`) or a `$float:` marker.
fn escape_marker(text: &str) -> String {
    if text.starts_with('$') {
        format!("${}", text)
    } else {
        text.to_string()
    }
}

fn tagged(tag: &str, inner: serde_json::Value) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), inner);
    serde_json::Value::Object(map)
}

/// Renders a named snapshot (globals or free variables) with names sorted.
pub fn render_snapshot(snapshot: &IndexMap<String, Value>) -> Result<String, CoreError> {
    let mut names: Vec<&String> = snapshot.keys().collect();
    names.sort();
    let mut map = Map::new();
    for name in names {
        map.insert(name.clone(), snapshot[name].to_canonical()?);
    }
    Ok(serde_json::Value::Object(map).to_string())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Tracked> for Value {
    fn from(t: Tracked) -> Self {
        Value::Tracked(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Arguments of one call: positional values plus named values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named argument, replacing any previous value for `name`.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Canonical form of the whole argument list.
    pub fn to_canonical(&self) -> Result<serde_json::Value, CoreError> {
        let positional = self
            .positional
            .iter()
            .map(Value::to_canonical)
            .collect::<Result<Vec<_>, _>>()?;
        let mut map = Map::new();
        map.insert("args".to_string(), serde_json::Value::Array(positional));
        map.insert(
            "kwargs".to_string(),
            Value::Map(self.named.clone()).to_canonical()?,
        );
        Ok(serde_json::Value::Object(map))
    }

    /// Origins of every tracked argument, first-seen, deduplicated.
    pub fn origins(&self) -> IndexSet<InvocationId> {
        let mut out = IndexSet::new();
        for value in self.positional.iter().chain(self.named.values()) {
            value.collect_origins(&mut out);
        }
        out
    }
}
