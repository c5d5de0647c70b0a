//! Dependency closure resolution.
//!
//! Walks a program's declared dependencies depth-first, expanding every
//! program dependency into its own declarations, and renders the result as
//! a byte-stable text. The version id is the blake3 hash of the program's
//! source together with that text.
//!
//! # Determinism
//!
//! - Entries appear in first-seen order of the depth-first walk, which
//!   follows declaration order
//! - Each entry (keyed by [`Dependency::key`]) is rendered once
//! - Constants use the canonical value rendering
//!
//! # Cycles
//!
//! A program already on the current expansion path is emitted as a
//! reference entry naming it and is not expanded again, so mutually
//! recursive programs terminate.

use std::collections::HashSet;

use indexmap::IndexMap;

use lmtrace_core::VersionId;
use lmtrace_storage::hash_version;

use crate::error::EngineError;
use crate::program::{Dependency, Program, ProgramDef};

/// The resolved identity of a program version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub version_id: VersionId,
    pub source: String,
    /// Rendered dependency closure.
    pub dependencies: String,
    /// Entry keys in first-seen order.
    pub dependency_ids: Vec<String>,
    /// Canonical snapshot of the globals at resolution time.
    pub globals: String,
    /// Canonical snapshot of the free variables at resolution time.
    pub free_vars: String,
}

/// Resolves `def` against the programs `lookup` can find.
pub fn resolve(
    def: &ProgramDef,
    lookup: &dyn Fn(&str) -> Option<Program>,
) -> Result<Closure, EngineError> {
    let mut walker = Walker {
        lookup,
        entries: IndexMap::new(),
        on_path: HashSet::new(),
    };
    walker.on_path.insert(def.name.clone());
    walker.expand(def)?;

    let dependency_ids: Vec<String> = walker.entries.keys().cloned().collect();
    let dependencies = walker
        .entries
        .into_values()
        .collect::<Vec<_>>()
        .join("\n\n");
    let (globals, free_vars) = def.render_state()?;

    Ok(Closure {
        version_id: hash_version(&def.source, &dependencies),
        source: def.source.clone(),
        dependencies,
        dependency_ids,
        globals,
        free_vars,
    })
}

struct Walker<'a> {
    lookup: &'a dyn Fn(&str) -> Option<Program>,
    /// key -> rendered entry
    entries: IndexMap<String, String>,
    on_path: HashSet<String>,
}

impl Walker<'_> {
    fn expand(&mut self, def: &ProgramDef) -> Result<(), EngineError> {
        for dependency in &def.dependencies {
            let key = dependency.key();
            if self.entries.contains_key(&key) {
                continue;
            }
            match dependency {
                Dependency::Value { name, value } => {
                    let rendered = format!("# {}\n{} = {}", key, name, value.render()?);
                    self.entries.insert(key, rendered);
                }
                Dependency::Source { source, .. } => {
                    self.entries.insert(key.clone(), format!("# {}\n{}", key, source));
                }
                Dependency::Program(name) => {
                    if self.on_path.contains(name) {
                        self.entries
                            .insert(key.clone(), format!("# {} (recursive reference)", key));
                        continue;
                    }
                    let program = (self.lookup)(name).ok_or_else(|| {
                        EngineError::DependencyResolution {
                            program: def.name.clone(),
                            dependency: name.clone(),
                        }
                    })?;
                    let nested = program.def();
                    self.entries
                        .insert(key.clone(), format!("# {}\n{}", key, nested.source));
                    self.on_path.insert(name.clone());
                    self.expand(nested)?;
                    self.on_path.remove(name);
                }
            }
        }
        Ok(())
    }
}
