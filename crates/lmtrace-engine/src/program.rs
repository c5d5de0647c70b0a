//! Program declarations and handles.
//!
//! A [`ProgramDef`] is the explicit declaration a host supplies instead of
//! reflection: the program's qualified name and source text, the other
//! programs, constants and helper sources it depends on, the globals and
//! free variables it captures, and the body to run. Registering a def on a
//! [`Tracer`](crate::Tracer) yields a [`Program`] handle.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use lmtrace_core::{Args, CoreError, Value, VersionId};

use crate::closure::Closure;
use crate::session::Session;

/// Error type returned by program bodies.
pub type ProgramError = Box<dyn std::error::Error + Send + Sync>;

/// A program body. Nested program calls go through the session it receives.
pub type ProgramFn = dyn Fn(&mut Session<'_>, &Args) -> Result<Value, ProgramError> + Send + Sync;

/// One entry of a program's declared dependency list.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// Another registered program, by qualified name.
    Program(String),
    /// A named constant whose canonical rendering is part of the closure.
    Value { name: String, value: Value },
    /// Helper code that is not itself a program.
    Source { name: String, source: String },
}

impl Dependency {
    /// Stable identifier used in the rendered closure and the stored
    /// dependency list.
    pub fn key(&self) -> String {
        match self {
            Dependency::Program(name) => format!("program:{}", name),
            Dependency::Value { name, .. } => format!("value:{}", name),
            Dependency::Source { name, .. } => format!("source:{}", name),
        }
    }
}

/// A captured variable: either a fixed value or a probe read at call time.
#[derive(Clone)]
pub enum Capture {
    Fixed(Value),
    Live(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl Capture {
    pub fn read(&self) -> Value {
        match self {
            Capture::Fixed(value) => value.clone(),
            Capture::Live(probe) => probe(),
        }
    }
}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capture::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Capture::Live(_) => f.write_str("Live(..)"),
        }
    }
}

/// Whether calls may be answered from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CachePolicy {
    /// Always execute.
    #[default]
    Off = 0,
    /// Serve hits from the store, execute on a miss.
    ReadThrough = 1,
    /// Serve hits from the store, fail on a miss.
    CacheOnly = 2,
}

impl CachePolicy {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CachePolicy::ReadThrough,
            2 => CachePolicy::CacheOnly,
            _ => CachePolicy::Off,
        }
    }

    pub fn consults_cache(self) -> bool {
        self != CachePolicy::Off
    }
}

/// Declaration of a program, built up before registration.
#[derive(Clone)]
pub struct ProgramDef {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) globals: IndexMap<String, Capture>,
    pub(crate) free_vars: IndexMap<String, Capture>,
    pub(crate) cache: CachePolicy,
    pub(crate) body: Arc<ProgramFn>,
}

impl ProgramDef {
    /// Declares a program with its qualified name, source text and body.
    pub fn new<F>(name: impl Into<String>, source: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Session<'_>, &Args) -> Result<Value, ProgramError> + Send + Sync + 'static,
    {
        ProgramDef {
            name: name.into(),
            source: source.into(),
            dependencies: Vec::new(),
            globals: IndexMap::new(),
            free_vars: IndexMap::new(),
            cache: CachePolicy::Off,
            body: Arc::new(body),
        }
    }

    /// Declares a dependency on another registered program.
    pub fn uses_program(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::Program(name.into()));
        self
    }

    /// Declares a named constant the program reads.
    pub fn uses_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.dependencies.push(Dependency::Value {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Declares helper source code the program calls.
    pub fn uses_source(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::Source {
            name: name.into(),
            source: source.into(),
        });
        self
    }

    /// Captures a global with a fixed value.
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals
            .insert(name.into(), Capture::Fixed(value.into()));
        self
    }

    /// Captures a global read afresh on every call.
    pub fn live_global<F>(mut self, name: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.globals
            .insert(name.into(), Capture::Live(Arc::new(probe)));
        self
    }

    /// Captures a free (closed-over) variable with a fixed value.
    pub fn free_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.free_vars
            .insert(name.into(), Capture::Fixed(value.into()));
        self
    }

    /// Captures a free variable read afresh on every call.
    pub fn live_free_var<F>(mut self, name: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.free_vars
            .insert(name.into(), Capture::Live(Arc::new(probe)));
        self
    }

    /// Marks the program cache-eligible.
    pub fn cached(mut self, enabled: bool) -> Self {
        self.cache = if enabled {
            CachePolicy::ReadThrough
        } else {
            CachePolicy::Off
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Current values of the captured globals.
    pub fn read_globals(&self) -> IndexMap<String, Value> {
        read_all(&self.globals)
    }

    /// Current values of the captured free variables.
    pub fn read_free_vars(&self) -> IndexMap<String, Value> {
        read_all(&self.free_vars)
    }

    /// Renders the current globals and free variables.
    pub(crate) fn render_state(&self) -> Result<(String, String), CoreError> {
        Ok((
            lmtrace_core::value::render_snapshot(&self.read_globals())?,
            lmtrace_core::value::render_snapshot(&self.read_free_vars())?,
        ))
    }
}

fn read_all(captures: &IndexMap<String, Capture>) -> IndexMap<String, Value> {
    captures
        .iter()
        .map(|(name, capture)| (name.clone(), capture.read()))
        .collect()
}

impl fmt::Debug for ProgramDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramDef")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("globals", &self.globals)
            .field("free_vars", &self.free_vars)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Registry record behind a [`Program`] handle.
pub(crate) struct ProgramEntry {
    pub(crate) def: ProgramDef,
    policy: AtomicU8,
    closure: OnceLock<Closure>,
    /// Number of live freeze guards covering this program.
    freezes: AtomicUsize,
}

/// Handle to a registered program. Cheap to clone.
#[derive(Clone)]
pub struct Program(Arc<ProgramEntry>);

impl Program {
    pub(crate) fn new(def: ProgramDef, closure: Option<Closure>) -> Self {
        let policy = AtomicU8::new(def.cache as u8);
        let cell = OnceLock::new();
        if let Some(closure) = closure {
            let _ = cell.set(closure);
        }
        Program(Arc::new(ProgramEntry {
            def,
            policy,
            closure: cell,
            freezes: AtomicUsize::new(0),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.def.name
    }

    pub fn def(&self) -> &ProgramDef {
        &self.0.def
    }

    /// The effective cache policy: `CacheOnly` while any freeze guard is
    /// alive, the configured policy otherwise.
    pub fn cache_policy(&self) -> CachePolicy {
        if self.is_frozen() {
            CachePolicy::CacheOnly
        } else {
            self.base_policy()
        }
    }

    /// The configured policy, ignoring freezes.
    pub fn base_policy(&self) -> CachePolicy {
        CachePolicy::from_u8(self.0.policy.load(Ordering::Acquire))
    }

    /// Replaces the configured policy, returning the previous one.
    pub fn set_cache_policy(&self, policy: CachePolicy) -> CachePolicy {
        CachePolicy::from_u8(self.0.policy.swap(policy as u8, Ordering::AcqRel))
    }

    pub fn is_frozen(&self) -> bool {
        self.0.freezes.load(Ordering::Acquire) > 0
    }

    pub(crate) fn freeze(&self) {
        self.0.freezes.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one freeze. Each call pairs with an earlier `freeze`.
    pub(crate) fn thaw(&self) {
        let _ = self
            .0
            .freezes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// The resolved closure, if resolution has happened.
    pub fn closure(&self) -> Option<&Closure> {
        self.0.closure.get()
    }

    /// The version id, if the closure has been resolved.
    pub fn version_id(&self) -> Option<&VersionId> {
        self.closure().map(|c| &c.version_id)
    }

    /// Returns the cached closure or stores the one produced by `resolve`.
    pub(crate) fn closure_or_resolve(
        &self,
        resolve: impl FnOnce() -> Result<Closure, crate::EngineError>,
    ) -> Result<&Closure, crate::EngineError> {
        if let Some(closure) = self.0.closure.get() {
            return Ok(closure);
        }
        let computed = resolve()?;
        Ok(self.0.closure.get_or_init(|| computed))
    }

    pub(crate) fn call_body(
        &self,
        session: &mut Session<'_>,
        args: &Args,
    ) -> Result<Value, ProgramError> {
        (self.0.def.body)(session, args)
    }

    /// Whether two handles refer to the same registration.
    pub fn same_registration(&self, other: &Program) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name())
            .field("cache_policy", &self.cache_policy())
            .field("version_id", &self.version_id())
            .finish()
    }
}
