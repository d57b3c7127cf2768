//! Diagnostic output gated by [`SaveloadConfig`](crate::SaveloadConfig).

/// Print a `[saveload]` line when `$config.trace` is set.
macro_rules! trace_saveload {
    ($config:expr, $($arg:tt)*) => {
        if $config.trace {
            eprintln!("[saveload] {}", format_args!($($arg)*));
        }
    };
}
