//! Persisted saved units, keyed by the source start position of the
//! function they were compiled for.
//!
//! File layout, little-endian:
//!
//! ```text
//!   u64 count
//!   count × { i32 start_position, u64 size, size × u8 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::SaveloadConfig;
use crate::error::SaveloadError;
use crate::stream::{Reader, Writer};

/// Failure reading or writing a database file.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("code block database I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed code block database: {0}")]
    Malformed(#[from] SaveloadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CodeBlock {
    start_position: i32,
    code: Vec<u8>,
}

/// In-memory set of saved units, optionally backed by a file.
#[derive(Debug, Clone, Default)]
pub struct CodeBlockDatabase {
    source: Option<PathBuf>,
    blocks: Vec<CodeBlock>,
    config: SaveloadConfig,
}

impl CodeBlockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SaveloadConfig) -> Self {
        self.config = config;
        self
    }

    /// Load every block from `path`. The file must exist.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let mut db = Self::decode(&bytes)?;
        db.source = Some(path.to_path_buf());
        Ok(db)
    }

    /// Write every block to `path`, replacing the file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), DatabaseError> {
        let path = path.as_ref();
        fs::write(path, self.encode()?)?;
        trace_saveload!(self.config, "code block database saved to \"{}\"", path.display());
        Ok(())
    }

    /// File this database was read from.
    #[inline]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Insert or replace the unit saved for `start_position`.
    pub fn set_code(&mut self, start_position: i32, code: Vec<u8>) {
        match self.blocks.iter_mut().find(|b| b.start_position == start_position) {
            Some(block) => block.code = code,
            None => self.blocks.push(CodeBlock { start_position, code }),
        }
    }

    pub fn has_code(&self, start_position: i32) -> bool {
        self.blocks.iter().any(|b| b.start_position == start_position)
    }

    pub fn get_code(&self, start_position: i32) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|b| b.start_position == start_position)
            .map(|b| b.code.as_slice())
    }

    /// Drop the unit for `start_position`. Returns whether one existed.
    pub fn remove_code(&mut self, start_position: i32) -> bool {
        match self.blocks.iter().position(|b| b.start_position == start_position) {
            Some(index) => {
                self.blocks.remove(index);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    fn encode(&self) -> Result<Vec<u8>, SaveloadError> {
        let mut out = Writer::new(false);
        out.write(self.blocks.len() as u64);
        for block in &self.blocks {
            out.write(block.start_position);
            out.write_bytes(&block.code);
        }
        out.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, SaveloadError> {
        let mut input = Reader::new(bytes, false);
        let count = input.read::<u64>()?;
        let mut blocks = Vec::new();
        for _ in 0..count {
            let start_position = input.read::<i32>()?;
            let code = input.read_bytes()?.to_vec();
            blocks.push(CodeBlock { start_position, code });
        }
        Ok(CodeBlockDatabase {
            source: None,
            blocks,
            config: SaveloadConfig::default(),
        })
    }
}
