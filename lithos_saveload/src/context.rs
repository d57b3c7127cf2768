//! Per-call save and load state.
//!
//! One [`Saver`] or [`Loader`] exists for the duration of a single
//! `save_*`/`load_*` call. It owns the stream (and with it the status
//! register) and borrows the heap: shared for saving, exclusive for loading.
//! The codecs are `impl` blocks on these two types spread over the
//! `*_codec` modules.

use lithos_heap::{Heap, ObjectId, ShapeId};

use crate::config::SaveloadConfig;
use crate::error::{SaveloadError, SaveloadResult};
use crate::stream::{Reader, Writer};

// =============================================================================
// Compilation Info
// =============================================================================

/// The function a unit was compiled for.
///
/// Saving and loading are both relative to this closure: its context is the
/// start of scope-chain lookups and its shared unit is the root of
/// path-from-root references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationInfo {
    pub closure: ObjectId,
}

impl CompilationInfo {
    pub const fn new(closure: ObjectId) -> Self {
        CompilationInfo { closure }
    }

    /// Shared unit of the compiled closure.
    pub fn shared(&self, heap: &Heap) -> ObjectId {
        match heap.function(self.closure) {
            Some(function) => function.shared,
            None => panic!("compiled closure {} is not a function", self.closure),
        }
    }

    /// Context the compiled closure was created in.
    pub fn context(&self, heap: &Heap) -> ObjectId {
        match heap.function(self.closure) {
            Some(function) => function.context,
            None => panic!("compiled closure {} is not a function", self.closure),
        }
    }

    pub fn start_position(&self, heap: &Heap) -> i32 {
        heap.shared_of(self.closure).start_position
    }
}

// =============================================================================
// Saver
// =============================================================================

pub(crate) struct Saver<'h> {
    pub(crate) stream: Writer,
    pub(crate) heap: &'h Heap,
    pub(crate) info: CompilationInfo,
    pub(crate) config: SaveloadConfig,
    /// Shapes whose entry payload has been written but not their exit
    /// payload, innermost last.
    pub(crate) shape_chain_cache: Vec<ShapeId>,
}

impl<'h> Saver<'h> {
    pub(crate) fn new(heap: &'h Heap, info: CompilationInfo, config: SaveloadConfig) -> Self {
        Saver {
            stream: Writer::new(config.checkpoints),
            heap,
            info,
            config,
            shape_chain_cache: Vec::new(),
        }
    }

    /// Record `error` and return the stream's first failure.
    #[inline]
    pub(crate) fn fail<T>(&mut self, error: SaveloadError) -> SaveloadResult<T> {
        Err(self.stream.fail(error))
    }

    /// Close out a save whose top-level step returned `result`.
    pub(crate) fn finish(mut self, result: SaveloadResult<()>) -> SaveloadResult<Vec<u8>> {
        if let Err(error) = result {
            let first = self.stream.fail(error);
            trace_saveload!(self.config, "save failed: {}", first);
            return Err(first);
        }
        assert!(
            self.shape_chain_cache.is_empty(),
            "shape chain cache not empty after save: {:?}",
            self.shape_chain_cache
        );
        self.stream.finish()
    }
}

// =============================================================================
// Loader
// =============================================================================

pub(crate) struct Loader<'a, 'h> {
    pub(crate) stream: Reader<'a>,
    pub(crate) heap: &'h mut Heap,
    pub(crate) info: CompilationInfo,
    pub(crate) config: SaveloadConfig,
}

impl<'a, 'h> Loader<'a, 'h> {
    pub(crate) fn new(bytes: &'a [u8], heap: &'h mut Heap, info: CompilationInfo, config: SaveloadConfig) -> Self {
        Loader {
            stream: Reader::new(bytes, config.checkpoints),
            heap,
            info,
            config,
        }
    }

    #[inline]
    pub(crate) fn fail<T>(&mut self, error: SaveloadError) -> SaveloadResult<T> {
        Err(self.stream.fail(error))
    }

    /// Close out a load whose top-level step returned `result`.
    pub(crate) fn finish<T>(mut self, result: SaveloadResult<T>) -> SaveloadResult<T> {
        match result {
            Ok(value) => {
                self.stream.check()?;
                Ok(value)
            }
            Err(error) => {
                let first = self.stream.fail(error);
                trace_saveload!(self.config, "load failed: {}", first);
                Err(first)
            }
        }
    }
}
