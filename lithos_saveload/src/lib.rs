//! Lithos Save/Load Engine
//!
//! Persists an optimized compiled unit ([`Chunk`]) and every runtime object it
//! references, and reloads it into a fresh [`Heap`] where object identity from
//! the save cannot be trusted.
//!
//! # Architecture
//!
//! ```text
//!   chunk_codec ──► heap_codec ──► shape_codec ──► function_ref
//!        │              │               │               │
//!        └──────────────┴───────┬───────┴───────────────┘
//!                               ▼
//!                   stream (Writer / Reader + Status)
//! ```
//!
//! - **Stream**: fixed-width little-endian primitives with a status register
//!   that keeps the first failure and turns every later operation into a
//!   no-op.
//! - **Heap values**: primitives and heap objects, by instance type.
//! - **Shapes**: back-pointer chains re-walked through the destination's
//!   transition tree, then deduplicated against the global namespace.
//! - **Function references**: identity-independent keys tried in a fixed
//!   order.
//!
//! # Failures
//!
//! A [`SaveloadError`] means the caller should recompile. Malformed input
//! (unknown tags, checkpoint mismatches, broken invariants) panics.
//!
//! # Usage
//!
//! ```ignore
//! use lithos_saveload::{load_chunk, save_chunk, CompilationInfo, SaveloadConfig};
//!
//! let config = SaveloadConfig::from_env();
//! let bytes = save_chunk(&chunk, &heap, &CompilationInfo::new(closure), &config)?;
//! let chunk = load_chunk(&bytes, &mut fresh_heap, &CompilationInfo::new(fresh_closure), &config)?;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

#[macro_use]
mod trace;

pub mod chunk_codec;
pub mod code_block_db;
pub mod config;
pub mod context;
pub mod error;
pub mod function_ref;
pub mod heap_codec;
pub mod shape_codec;
pub mod stream;

pub use chunk_codec::live_constants;
pub use code_block_db::{CodeBlockDatabase, DatabaseError};
pub use config::SaveloadConfig;
pub use context::CompilationInfo;
pub use error::{SaveloadError, SaveloadResult};
pub use function_ref::{FunctionKey, FunctionRelocation, FunctionResolver, ResolveStrategy, STRATEGIES};
pub use stream::{Reader, Status, Writer};

use lithos_chunk::Chunk;
use lithos_heap::{Heap, Value};

use context::{Loader, Saver};

// =============================================================================
// Entry Points
// =============================================================================

/// Save `chunk`, compiled for `info`'s closure.
pub fn save_chunk(chunk: &Chunk, heap: &Heap, info: &CompilationInfo, config: &SaveloadConfig) -> SaveloadResult<Vec<u8>> {
    let mut saver = Saver::new(heap, *info, *config);
    let result = saver.save_chunk(chunk);
    saver.finish(result)
}

/// Rebuild a chunk saved by [`save_chunk`], resolving references in `heap`.
pub fn load_chunk(
    bytes: &[u8],
    heap: &mut Heap,
    info: &CompilationInfo,
    config: &SaveloadConfig,
) -> SaveloadResult<Chunk> {
    let mut loader = Loader::new(bytes, heap, *info, *config);
    let result = loader.load_chunk();
    loader.finish(result)
}

/// Save a single runtime value.
pub fn save_value(value: Value, heap: &Heap, info: &CompilationInfo, config: &SaveloadConfig) -> SaveloadResult<Vec<u8>> {
    let mut saver = Saver::new(heap, *info, *config);
    let result = saver.save_object(value);
    saver.finish(result)
}

/// Rebuild a value saved by [`save_value`].
pub fn load_value(
    bytes: &[u8],
    heap: &mut Heap,
    info: &CompilationInfo,
    config: &SaveloadConfig,
) -> SaveloadResult<Value> {
    let mut loader = Loader::new(bytes, heap, *info, *config);
    let result = loader.load_object();
    loader.finish(result)
}
