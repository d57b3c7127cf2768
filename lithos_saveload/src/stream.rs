//! Byte streams with a poison-on-first-failure status register.
//!
//! All primitives are fixed-width little-endian with no padding. Once a
//! stream has failed, writes are dropped and reads return the first
//! recorded failure, so a late error can never mask the original cause.
//!
//! ```text
//!   Writer ──write<T>──► Vec<u8>        Reader ◄──read<T>── &[u8]
//!      │                                   │
//!      └── Status::Ok ──fail(e)──► Status::Failed(e)   (sticky)
//! ```

use crate::error::{SaveloadError, SaveloadResult};

// =============================================================================
// Primitives
// =============================================================================

/// A fixed-width value with a little-endian encoding.
pub trait Primitive: Copy {
    const SIZE: usize;

    fn put(self, out: &mut Vec<u8>);

    /// Decode from exactly `SIZE` bytes.
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),*) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn put(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn take(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f64);

// =============================================================================
// Status
// =============================================================================

/// Outcome so far of one save or load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    Failed(SaveloadError),
}

impl Status {
    /// Record `error` unless a failure is already recorded. Returns the
    /// failure that is now current.
    fn fail(&mut self, error: SaveloadError) -> SaveloadError {
        match self {
            Status::Ok => {
                *self = Status::Failed(error.clone());
                error
            }
            Status::Failed(first) => first.clone(),
        }
    }

    #[inline]
    fn check(&self) -> SaveloadResult<()> {
        match self {
            Status::Ok => Ok(()),
            Status::Failed(first) => Err(first.clone()),
        }
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Append-only output stream.
#[derive(Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
    status: Status,
    checkpoints: bool,
}

impl Writer {
    pub fn new(checkpoints: bool) -> Self {
        Writer {
            bytes: Vec::new(),
            status: Status::Ok,
            checkpoints,
        }
    }

    #[inline]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Record a failure. The first one wins and is returned.
    pub fn fail(&mut self, error: SaveloadError) -> SaveloadError {
        self.status.fail(error)
    }

    /// `Err` with the first failure once the stream has failed.
    #[inline]
    pub fn check(&self) -> SaveloadResult<()> {
        self.status.check()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn write<T: Primitive>(&mut self, value: T) {
        if self.status == Status::Ok {
            value.put(&mut self.bytes);
        }
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write(value as u8);
    }

    /// Length-prefixed (`u64`) byte run.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write(bytes.len() as u64);
        if self.status == Status::Ok {
            self.bytes.extend_from_slice(bytes);
        }
    }

    #[inline]
    pub fn write_str(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Record the current offset so the reader can verify it is in step.
    pub fn checkpoint(&mut self) {
        if self.checkpoints {
            let offset = self.position() as i32;
            self.write(offset);
        }
    }

    /// Bytes written so far, or the first failure.
    pub fn finish(self) -> SaveloadResult<Vec<u8>> {
        self.status.check()?;
        Ok(self.bytes)
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Cursor over a saved byte sequence.
#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    status: Status,
    checkpoints: bool,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8], checkpoints: bool) -> Self {
        Reader {
            bytes,
            offset: 0,
            status: Status::Ok,
            checkpoints,
        }
    }

    #[inline]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Record a failure. The first one wins and is returned.
    pub fn fail(&mut self, error: SaveloadError) -> SaveloadError {
        self.status.fail(error)
    }

    #[inline]
    pub fn check(&self) -> SaveloadResult<()> {
        self.status.check()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> SaveloadResult<&'a [u8]> {
        self.status.check()?;
        if self.remaining() < len {
            return Err(self.fail(SaveloadError::UnexpectedEnd {
                offset: self.offset,
                needed: len - self.remaining(),
            }));
        }
        let bytes = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    #[inline]
    pub fn read<T: Primitive>(&mut self) -> SaveloadResult<T> {
        self.take(T::SIZE).map(T::take)
    }

    #[inline]
    pub fn read_bool(&mut self) -> SaveloadResult<bool> {
        Ok(self.read::<u8>()? != 0)
    }

    /// Length-prefixed (`u64`) byte run.
    pub fn read_bytes(&mut self) -> SaveloadResult<&'a [u8]> {
        let len = self.read::<u64>()?;
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        self.take(len)
    }

    pub fn read_string(&mut self) -> SaveloadResult<String> {
        let bytes = self.read_bytes()?;
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => Err(self.fail(SaveloadError::InvalidUtf8)),
        }
    }

    /// Verify the writer's recorded offset.
    ///
    /// # Panics
    ///
    /// Panics if the recorded offset differs: save and load are out of step.
    pub fn checkpoint(&mut self) -> SaveloadResult<()> {
        if self.checkpoints {
            let offset = self.offset;
            let saved = self.read::<i32>()?;
            assert_eq!(
                saved as usize, offset,
                "checkpoint mismatch: saved at offset {}, loading at offset {}",
                saved, offset
            );
        }
        Ok(())
    }
}
