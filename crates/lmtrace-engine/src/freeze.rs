//! Scoped cache-only mode.
//!
//! Freezing is counted per program: every live [`FreezeGuard`] covering a
//! program holds one count, and the program answers only from the store
//! while its count is above zero. Guards may be dropped in any order, from
//! any thread; the configured policy is never touched.

use tracing::debug;

use crate::program::Program;

/// Releases its freezes when dropped.
///
/// Returned by [`Tracer::freeze`](crate::Tracer::freeze). While alive, the
/// frozen programs answer only from the store and fail on a miss.
#[must_use = "programs are unfrozen as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FreezeGuard {
    programs: Vec<Program>,
}

impl FreezeGuard {
    pub(crate) fn new(programs: &[Program]) -> Self {
        for program in programs {
            program.freeze();
            debug!(program = program.name(), "frozen");
        }
        FreezeGuard {
            programs: programs.to_vec(),
        }
    }
}

impl Drop for FreezeGuard {
    fn drop(&mut self) {
        for program in self.programs.drain(..) {
            program.thaw();
            debug!(
                program = program.name(),
                still_frozen = program.is_frozen(),
                "freeze released"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmtrace_core::Value;

    use crate::program::{CachePolicy, ProgramDef};
    use crate::Tracer;

    fn program(tracer: &Tracer) -> Program {
        tracer
            .register(ProgramDef::new("p", "p", |_, _| Ok(Value::from("x"))).cached(true))
            .unwrap()
    }

    #[test]
    fn guards_dropped_out_of_order_restore_policy() {
        let tracer = Tracer::in_memory();
        let p = program(&tracer);

        let first = tracer.freeze(&[p.clone()]).unwrap();
        let second = tracer.freeze(&[p.clone()]).unwrap();
        drop(first);
        assert_eq!(p.cache_policy(), CachePolicy::CacheOnly);
        drop(second);
        assert_eq!(p.cache_policy(), CachePolicy::ReadThrough);
    }

    #[test]
    fn same_program_twice_in_one_guard() {
        let tracer = Tracer::in_memory();
        let p = program(&tracer);

        let guard = tracer.freeze(&[p.clone(), p.clone()]).unwrap();
        assert!(p.is_frozen());
        drop(guard);
        assert!(!p.is_frozen());
        assert_eq!(p.cache_policy(), CachePolicy::ReadThrough);
    }

    #[test]
    fn overlapping_guards_across_threads() {
        let tracer = Tracer::in_memory();
        let p = program(&tracer);
        let barrier = std::sync::Barrier::new(2);

        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    let guard = tracer.freeze(&[p.clone()]).unwrap();
                    barrier.wait();
                    assert_eq!(p.cache_policy(), CachePolicy::CacheOnly);
                    drop(guard);
                });
            }
        });
        assert_eq!(p.cache_policy(), CachePolicy::ReadThrough);
    }
}
