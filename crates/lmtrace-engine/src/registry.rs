use dashmap::DashMap;

use crate::program::Program;

/// Registered programs keyed by qualified name.
///
/// Lookups clone the handle out so no shard guard outlives the call.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    programs: DashMap<String, Program>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts `program`, replacing any earlier registration of the name.
    pub(crate) fn insert(&self, program: Program) -> Option<Program> {
        self.programs.insert(program.name().to_string(), program)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Program> {
        self.programs.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.programs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
