//! The invocation stack and recorder.
//!
//! A [`Session`] is the explicit per-context state threaded through every
//! program call: the tracer it records into and the stack of invocations
//! currently executing. Program bodies receive the session and make nested
//! calls through it, so the enclosing invocation is always the top of the
//! stack. Sessions are not shared between threads; each thread opens its
//! own from the same [`Tracer`].

use std::ops::{Deref, DerefMut};
use std::time::Instant;

use tracing::{debug, warn};

use lmtrace_core::time::now_iso8601;
use lmtrace_core::{Args, Invocation, InvocationId, Tracked, Usage, Value};

use crate::closure::Closure;
use crate::error::EngineError;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::program::{CachePolicy, Program};
use crate::registrar;
use crate::tracer::Tracer;

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    id: InvocationId,
    usage: Usage,
}

/// Per-context call state.
#[derive(Debug)]
pub struct Session<'t> {
    tracer: &'t Tracer,
    stack: Vec<StackEntry>,
}

/// Pops exactly one stack entry when dropped, including on error and panic.
struct Frame<'s, 't> {
    session: &'s mut Session<'t>,
}

impl<'s, 't> Frame<'s, 't> {
    fn push(session: &'s mut Session<'t>, id: InvocationId) -> Self {
        session.stack.push(StackEntry {
            id,
            usage: Usage::default(),
        });
        Frame { session }
    }

    fn usage(&self) -> Usage {
        self.session.stack.last().map(|e| e.usage).unwrap_or_default()
    }
}

impl<'t> Deref for Frame<'_, 't> {
    type Target = Session<'t>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl DerefMut for Frame<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl Drop for Frame<'_, '_> {
    fn drop(&mut self) {
        self.session.stack.pop();
    }
}

/// How the cache lookup went.
enum Lookup {
    Hit(Invocation),
    Miss,
    /// The store could not be read; run and return an untracked value.
    Degraded,
}

impl<'t> Session<'t> {
    pub(crate) fn new(tracer: &'t Tracer) -> Self {
        Session {
            tracer,
            stack: Vec::new(),
        }
    }

    pub fn tracer(&self) -> &'t Tracer {
        self.tracer
    }

    /// Number of invocations currently executing in this session.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The innermost executing invocation.
    pub fn current(&self) -> Option<InvocationId> {
        self.stack.last().map(|e| e.id)
    }

    /// Adds token usage to the innermost executing invocation. Outside any
    /// invocation this is a no-op.
    pub fn record_usage(&mut self, usage: Usage) {
        match self.stack.last_mut() {
            Some(entry) => entry.usage += usage,
            None => debug!("usage reported outside any invocation, dropped"),
        }
    }

    /// Calls a registered program by name.
    pub fn call_by_name(&mut self, name: &str, args: Args) -> Result<Value, EngineError> {
        let program = self
            .tracer
            .program(name)
            .ok_or_else(|| EngineError::UnknownProgram(name.to_string()))?;
        self.call(&program, args)
    }

    /// Calls `program` with `args`.
    ///
    /// With a store configured, the result comes back as
    /// [`Value::Tracked`] carrying the id of the invocation that produced
    /// it, either a new one or, on a cache hit, the earliest stored one.
    /// Without a store the body runs untracked and the plain value is
    /// returned.
    pub fn call(&mut self, program: &Program, args: Args) -> Result<Value, EngineError> {
        let tracer = self.tracer;
        let policy = program.cache_policy();

        if !tracer.has_store() {
            if policy == CachePolicy::CacheOnly {
                return Err(EngineError::Configuration(format!(
                    "program '{}' is frozen but no store is configured",
                    program.name()
                )));
            }
            return program
                .call_body(self, &args)
                .map_err(|source| EngineError::Program {
                    program: program.name().to_string(),
                    source,
                });
        }

        let closure = tracer.closure_of(program)?;
        let (globals, free_vars) = program.def().render_state()?;
        let fp = fingerprint(&args, &globals, &free_vars)?;

        let lookup = if policy.consults_cache() {
            self.lookup(program, closure, &fp, policy)?
        } else {
            Lookup::Miss
        };
        let degraded = match lookup {
            Lookup::Hit(hit) => {
                debug!(program = program.name(), invocation = %hit.id, "cache hit");
                return Ok(Value::Tracked(Tracked::new(hit.id, hit.result.untracked())));
            }
            Lookup::Miss => false,
            Lookup::Degraded => true,
        };

        let used_by = self.current();
        let id = InvocationId::new();
        let started = Instant::now();
        let (outcome, usage) = {
            let mut frame = Frame::push(self, id);
            let outcome = program.call_body(&mut frame, &args);
            let usage = frame.usage();
            (outcome, usage)
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let value = outcome.map_err(|source| EngineError::Program {
            program: program.name().to_string(),
            source,
        })?;
        value.check_result_shape()?;
        let result = value.untracked();

        if degraded {
            return Ok(result);
        }

        let invocation = Invocation {
            id,
            version_id: closure.version_id.clone(),
            cache_key: fp.cache_key,
            args: fp.inputs,
            latency_ms,
            usage,
            created_at: now_iso8601(),
            result,
            used_by,
            consumed: fp.consumed,
        };

        match self.persist(program, closure, &invocation) {
            Ok(()) => {
                debug!(
                    program = program.name(),
                    invocation = %id,
                    latency_ms,
                    "invocation recorded"
                );
                Ok(Value::Tracked(Tracked::new(id, invocation.result)))
            }
            Err(EngineError::StoreUnavailable(reason)) => {
                warn!(program = program.name(), %reason, "store unavailable, result not recorded");
                Ok(invocation.result)
            }
            Err(err) => Err(err),
        }
    }

    fn lookup(
        &self,
        program: &Program,
        closure: &Closure,
        fp: &Fingerprint,
        policy: CachePolicy,
    ) -> Result<Lookup, EngineError> {
        let found = self
            .tracer
            .lock_store(|store| store.get_cached(&closure.version_id, &fp.cache_key));
        match found {
            Some(Ok(hits)) => match hits.into_iter().next() {
                Some(hit) => Ok(Lookup::Hit(hit)),
                None if policy == CachePolicy::CacheOnly => Err(EngineError::CacheMiss {
                    program: program.name().to_string(),
                }),
                None => Ok(Lookup::Miss),
            },
            Some(Err(err)) if err.is_unavailable() && policy != CachePolicy::CacheOnly => {
                warn!(program = program.name(), error = %err, "cache lookup failed, running untracked");
                Ok(Lookup::Degraded)
            }
            Some(Err(err)) => Err(err.into()),
            None => Ok(Lookup::Miss),
        }
    }

    /// Registers the version if this store has not seen it, then writes
    /// the invocation. Registration is a lookup when the version exists.
    fn persist(
        &self,
        program: &Program,
        closure: &Closure,
        invocation: &Invocation,
    ) -> Result<(), EngineError> {
        let commit_messages = self.tracer.config().commit_messages;
        self.tracer
            .lock_store(|store| -> Result<(), EngineError> {
                registrar::register(store, program.name(), closure, commit_messages)?;
                store.write_invocation(invocation)?;
                Ok(())
            })
            .unwrap_or(Ok(()))
    }
}
