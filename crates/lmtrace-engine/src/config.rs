//! Tracer configuration.
//!
//! Reads overrides from environment variables:
//! - `LMTRACE_LAZY_VERSIONING`: `1`/`true` resolves closures on first call
//! - `LMTRACE_PROVENANCE_DEPTH`: hop limit for provenance traversal
//! - `LMTRACE_COMMIT_MESSAGES`: `0`/`false` disables commit message diffs
//!
//! Unparseable values fall back to the defaults.

/// Default hop limit for [`Tracer::trace`](crate::Tracer::trace).
pub const DEFAULT_PROVENANCE_DEPTH: usize = 4;

/// When a program's dependency closure is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// At registration; missing dependencies fail `Tracer::register`.
    #[default]
    Eager,
    /// On the first call; missing dependencies fail that call.
    Lazy,
}

/// Process-level settings for a [`Tracer`](crate::Tracer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    pub resolution: ResolutionMode,
    /// Maximum number of hops `trace` follows from its start node.
    pub provenance_depth: usize,
    /// Compute a diff against the previous version when registering.
    pub commit_messages: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            resolution: ResolutionMode::Eager,
            provenance_depth: DEFAULT_PROVENANCE_DEPTH,
            commit_messages: true,
        }
    }
}

impl TracerConfig {
    /// Defaults overridden by `LMTRACE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = TracerConfig::default();
        if let Some(lazy) = lookup("LMTRACE_LAZY_VERSIONING").and_then(|v| parse_flag(&v)) {
            config.resolution = if lazy {
                ResolutionMode::Lazy
            } else {
                ResolutionMode::Eager
            };
        }
        if let Some(depth) = lookup("LMTRACE_PROVENANCE_DEPTH").and_then(|v| v.trim().parse().ok()) {
            config.provenance_depth = depth;
        }
        if let Some(enabled) = lookup("LMTRACE_COMMIT_MESSAGES").and_then(|v| parse_flag(&v)) {
            config.commit_messages = enabled;
        }
        config
    }

    pub fn lazy(mut self) -> Self {
        self.resolution = ResolutionMode::Lazy;
        self
    }

    pub fn with_provenance_depth(mut self, depth: usize) -> Self {
        self.provenance_depth = depth;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
