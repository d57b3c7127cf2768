//! Save/load configuration.
//!
//! Resolved once per embedder and passed by reference to every save and
//! load call. The codec never consults the environment on its own.

// =============================================================================
// Saveload Configuration
// =============================================================================

/// Knobs that affect tracing and the stream's self-checks.
///
/// `checkpoints` changes the byte format: a stream saved with checkpoints can
/// only be loaded with checkpoints, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveloadConfig {
    /// Print `[saveload]` events (shape loads, deduplication, failures).
    pub trace: bool,

    /// Dump every saved or loaded instruction.
    pub trace_code: bool,

    /// Emit and verify stream offset checkpoints.
    pub checkpoints: bool,
}

impl Default for SaveloadConfig {
    fn default() -> Self {
        Self {
            trace: false,
            trace_code: false,
            checkpoints: cfg!(debug_assertions),
        }
    }
}

impl SaveloadConfig {
    /// Defaults overridden by `LITHOS_TRACE_SAVELOAD`,
    /// `LITHOS_TRACE_SAVELOAD_CODE` and `LITHOS_SAVELOAD_CHECKPOINTS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trace: Self::env_bool("LITHOS_TRACE_SAVELOAD"),
            trace_code: Self::env_bool("LITHOS_TRACE_SAVELOAD_CODE"),
            checkpoints: match std::env::var("LITHOS_SAVELOAD_CHECKPOINTS") {
                Ok(_) => Self::env_bool("LITHOS_SAVELOAD_CHECKPOINTS"),
                Err(_) => defaults.checkpoints,
            },
        }
    }

    #[inline]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    #[inline]
    pub fn with_trace_code(mut self, trace_code: bool) -> Self {
        self.trace_code = trace_code;
        self
    }

    #[inline]
    pub fn with_checkpoints(mut self, checkpoints: bool) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Check if an environment variable is set to a non-empty, truthy value.
    #[inline]
    fn env_bool(var: &str) -> bool {
        std::env::var(var)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================
