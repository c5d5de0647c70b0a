//! The tracer: program registry, store handle and configuration.
//!
//! One [`Tracer`] is shared by every thread of a host. It owns the store
//! behind a mutex that is held only for a cache lookup or a version and
//! invocation write, never while a program body runs. Calls go through a
//! [`Session`] opened per thread with [`Tracer::session`].

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use lmtrace_core::{Invocation, InvocationId, ProgramVersion, VersionId};
use lmtrace_storage::{InMemoryStore, TraceStore};

use crate::closure::{resolve, Closure};
use crate::config::{ResolutionMode, TracerConfig};
use crate::error::EngineError;
use crate::freeze::FreezeGuard;
use crate::program::{Program, ProgramDef};
use crate::provenance::{self, Direction, TraceEdge};
use crate::registrar;
use crate::registry::Registry;
use crate::session::Session;

pub struct Tracer {
    config: TracerConfig,
    registry: Registry,
    store: Option<Mutex<Box<dyn TraceStore>>>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.config)
            .field("programs", &self.registry.names())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Tracer {
    /// A tracer with no store. Calls run untracked.
    pub fn new(config: TracerConfig) -> Self {
        Tracer {
            config,
            registry: Registry::new(),
            store: None,
        }
    }

    pub fn with_store(store: impl TraceStore + 'static, config: TracerConfig) -> Self {
        Tracer {
            config,
            registry: Registry::new(),
            store: Some(Mutex::new(Box::new(store))),
        }
    }

    /// A tracer backed by a fresh [`InMemoryStore`] and default config.
    pub fn in_memory() -> Self {
        Self::with_store(InMemoryStore::new(), TracerConfig::default())
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Registers a program declaration and returns its handle.
    ///
    /// In eager mode the dependency closure is resolved now, so every
    /// program dependency must already be registered; on failure nothing
    /// is registered. In lazy mode resolution waits for the first call or
    /// [`Tracer::version_id`]. Registering a name again replaces the
    /// earlier handle for subsequent lookups.
    pub fn register(&self, def: ProgramDef) -> Result<Program, EngineError> {
        let closure = match self.config.resolution {
            ResolutionMode::Eager => Some(resolve(&def, &|name| self.registry.get(name))?),
            ResolutionMode::Lazy => None,
        };
        let program = Program::new(def, closure);
        if self.registry.insert(program.clone()).is_some() {
            debug!(program = program.name(), "registration replaced");
        }
        debug!(
            program = program.name(),
            version = ?program.version_id().map(VersionId::short),
            "program registered"
        );
        Ok(program)
    }

    pub fn program(&self, name: &str) -> Option<Program> {
        self.registry.get(name)
    }

    /// Names of all registered programs, sorted.
    pub fn program_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Opens a new call context.
    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// The program's version id, resolving its closure if needed.
    pub fn version_id(&self, program: &Program) -> Result<VersionId, EngineError> {
        Ok(self.closure_of(program)?.version_id.clone())
    }

    /// Writes the program's current version to the store without calling
    /// it. Idempotent.
    pub fn register_version(&self, program: &Program) -> Result<ProgramVersion, EngineError> {
        let closure = self.closure_of(program)?;
        let commit_messages = self.config.commit_messages;
        self.require_store(|store| {
            registrar::register(store, program.name(), closure, commit_messages)
        })
    }

    pub(crate) fn closure_of<'p>(&self, program: &'p Program) -> Result<&'p Closure, EngineError> {
        program.closure_or_resolve(|| resolve(program.def(), &|name| self.registry.get(name)))
    }

    // -----------------------------------------------------------------------
    // Store access
    // -----------------------------------------------------------------------

    pub(crate) fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Runs `f` under the store lock. `None` if no store is configured.
    pub(crate) fn lock_store<R>(&self, f: impl FnOnce(&mut dyn TraceStore) -> R) -> Option<R> {
        self.store.as_ref().map(|store| {
            // A panic while holding the lock cannot leave a half-written
            // row: every backend write is a single transaction.
            let mut guard = store.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut **guard)
        })
    }

    fn require_store<R>(
        &self,
        f: impl FnOnce(&mut dyn TraceStore) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.lock_store(f).unwrap_or_else(|| {
            Err(EngineError::Configuration(
                "no store is configured".to_string(),
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// All stored versions of `name`, ordered by version number.
    pub fn versions(&self, name: &str) -> Result<Vec<ProgramVersion>, EngineError> {
        self.require_store(|store| Ok(store.get_versions_by_name(name)?))
    }

    pub fn get_version(&self, id: &VersionId) -> Result<Option<ProgramVersion>, EngineError> {
        self.require_store(|store| Ok(store.get_version(id)?))
    }

    pub fn get_invocation(&self, id: InvocationId) -> Result<Option<Invocation>, EngineError> {
        self.require_store(|store| Ok(store.get_invocation(id)?))
    }

    pub fn list_invocations(&self, version: &VersionId) -> Result<Vec<Invocation>, EngineError> {
        self.require_store(|store| Ok(store.list_invocations(version)?))
    }

    /// Edges upstream of `id`: what it consumed, transitively, up to the
    /// configured provenance depth.
    pub fn trace(&self, id: InvocationId) -> Result<Vec<TraceEdge>, EngineError> {
        self.trace_in(id, Direction::Upstream, self.config.provenance_depth)
    }

    /// Edges downstream of `id`: every invocation that consumed it,
    /// transitively, up to the configured provenance depth.
    pub fn trace_consumers(&self, id: InvocationId) -> Result<Vec<TraceEdge>, EngineError> {
        self.trace_in(id, Direction::Downstream, self.config.provenance_depth)
    }

    /// Traversal with an explicit direction and depth bound.
    pub fn trace_in(
        &self,
        id: InvocationId,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<TraceEdge>, EngineError> {
        self.require_store(|store| Ok(provenance::trace(&*store, id, direction, max_depth)?))
    }

    // -----------------------------------------------------------------------
    // Freezing
    // -----------------------------------------------------------------------

    /// Switches `programs` to cache-only until the guard is dropped.
    ///
    /// While frozen, a call with no stored result for its fingerprint
    /// fails with [`EngineError::CacheMiss`] instead of executing.
    pub fn freeze(&self, programs: &[Program]) -> Result<FreezeGuard, EngineError> {
        if !self.has_store() {
            return Err(EngineError::Configuration(
                "freezing requires a store".to_string(),
            ));
        }
        info!(count = programs.len(), "freezing programs");
        Ok(FreezeGuard::new(programs))
    }

    /// Runs `f` with `programs` frozen. The freeze is released when `f`
    /// returns, errors or panics.
    pub fn with_frozen<R>(
        &self,
        programs: &[Program],
        f: impl FnOnce() -> R,
    ) -> Result<R, EngineError> {
        let _guard = self.freeze(programs)?;
        Ok(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmtrace_core::{Args, Value};

    use crate::program::CachePolicy;

    fn leaf(name: &str) -> ProgramDef {
        ProgramDef::new(name, format!("leaf {}", name), |_, _| Ok(Value::from("x")))
    }

    #[test]
    fn eager_registration_needs_dependencies_first() {
        let tracer = Tracer::in_memory();
        let err = tracer
            .register(leaf("top").uses_program("missing"))
            .unwrap_err();
        assert!(matches!(err, EngineError::DependencyResolution { .. }));
        assert!(tracer.program("top").is_none());
    }

    #[test]
    fn lazy_registration_defers_resolution() {
        let tracer = Tracer::with_store(InMemoryStore::new(), TracerConfig::default().lazy());
        let top = tracer.register(leaf("top").uses_program("dep")).unwrap();
        assert!(top.version_id().is_none());
        tracer.register(leaf("dep")).unwrap();
        let id = tracer.version_id(&top).unwrap();
        assert_eq!(top.version_id(), Some(&id));
    }

    #[test]
    fn register_version_is_idempotent() {
        let tracer = Tracer::in_memory();
        let p = tracer.register(leaf("p")).unwrap();
        let a = tracer.register_version(&p).unwrap();
        let b = tracer.register_version(&p).unwrap();
        assert_eq!(a, b);
        assert_eq!(tracer.versions("p").unwrap().len(), 1);
    }

    #[test]
    fn queries_need_a_store() {
        let tracer = Tracer::new(TracerConfig::default());
        let p = tracer.register(leaf("p")).unwrap();
        assert!(matches!(
            tracer.versions("p"),
            Err(EngineError::Configuration(_))
        ));
        assert!(matches!(
            tracer.register_version(&p),
            Err(EngineError::Configuration(_))
        ));
        assert!(matches!(
            tracer.freeze(&[p]),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn with_frozen_restores_policy() {
        let tracer = Tracer::in_memory();
        let p = tracer.register(leaf("p").cached(true)).unwrap();
        let inner = tracer
            .with_frozen(&[p.clone()], || p.cache_policy())
            .unwrap();
        assert_eq!(inner, CachePolicy::CacheOnly);
        assert_eq!(p.cache_policy(), CachePolicy::ReadThrough);
    }

    #[test]
    fn frozen_miss_then_hit() {
        let tracer = Tracer::in_memory();
        let p = tracer.register(leaf("p")).unwrap();
        let mut session = tracer.session();
        let first = session.call(&p, Args::new().arg("a")).unwrap();

        let guard = tracer.freeze(&[p.clone()]).unwrap();
        let hit = session.call(&p, Args::new().arg("a")).unwrap();
        assert_eq!(hit.origin(), first.origin());
        let miss = session.call(&p, Args::new().arg("b")).unwrap_err();
        assert!(matches!(miss, EngineError::CacheMiss { .. }));
        drop(guard);

        assert_eq!(p.cache_policy(), CachePolicy::Off);
        assert!(session.call(&p, Args::new().arg("b")).is_ok());
    }
}
