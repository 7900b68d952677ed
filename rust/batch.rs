//! Read-only string batches and the two ways of indexing them.
//!
//! Engines accept any slice of byte-like (`AsRef<[u8]>`) or string-like (`AsRef<str>`)
//! elements. The element type decides the indexing: byte engines see raw octets, UTF-8
//! engines see Unicode scalar values, so the type system rules out undecodable input.

use crate::error::{Error, Result};

/// The text flavor a kernel runs over: raw bytes or UTF-8 strings.
pub(crate) trait Text: Sync {
    #[cfg_attr(not(feature = "accelerator"), allow(dead_code))]
    fn byte_len(&self) -> usize;

    /// Copies a batch into a device tape in unified memory.
    #[cfg(feature = "accelerator")]
    fn copy_into_tape<S: AsRef<Self>>(
        batch: &[S],
        wide_offsets: bool,
    ) -> Result<crate::accelerator::DeviceTape>;

    /// Reinterprets one row of a device tape.
    #[cfg(feature = "accelerator")]
    fn from_device(row: &[u8]) -> Option<&Self>;
}

impl Text for [u8] {
    #[inline]
    fn byte_len(&self) -> usize {
        self.len()
    }

    #[cfg(feature = "accelerator")]
    fn copy_into_tape<S: AsRef<Self>>(
        batch: &[S],
        wide_offsets: bool,
    ) -> Result<crate::accelerator::DeviceTape> {
        crate::accelerator::copy_bytes_into_tape(batch, wide_offsets)
    }

    #[cfg(feature = "accelerator")]
    #[inline]
    fn from_device(row: &[u8]) -> Option<&Self> {
        Some(row)
    }
}

impl Text for str {
    #[inline]
    fn byte_len(&self) -> usize {
        self.len()
    }

    #[cfg(feature = "accelerator")]
    fn copy_into_tape<S: AsRef<Self>>(
        batch: &[S],
        wide_offsets: bool,
    ) -> Result<crate::accelerator::DeviceTape> {
        crate::accelerator::copy_chars_into_tape(batch, wide_offsets)
    }

    #[cfg(feature = "accelerator")]
    #[inline]
    fn from_device(row: &[u8]) -> Option<&Self> {
        core::str::from_utf8(row).ok()
    }
}

/// Fails with [`Error::LengthMismatch`] unless both sides of a pairwise batch align.
pub(crate) fn check_pairs<A, B>(left: &[A], right: &[B]) -> Result<usize> {
    if left.len() != right.len() {
        return Err(Error::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(left.len())
}

/// Total number of bytes referenced by a batch.
#[cfg_attr(not(feature = "accelerator"), allow(dead_code))]
pub(crate) fn total_bytes<T, S>(batch: &[S]) -> usize
where
    T: Text + ?Sized,
    S: AsRef<T>,
{
    batch.iter().map(|text| text.as_ref().byte_len()).sum()
}

/// Whether a batch needs 64-bit offsets once laid out contiguously.
#[cfg_attr(not(feature = "accelerator"), allow(dead_code))]
pub(crate) fn needs_wide_offsets<T, S>(batch: &[S]) -> bool
where
    T: Text + ?Sized,
    S: AsRef<T>,
{
    total_bytes::<T, S>(batch) > u32::MAX as usize || batch.len() > u32::MAX as usize
}

/// Decodes a string into Unicode scalar values, the units codepoint engines index by.
#[inline]
pub(crate) fn codepoints(text: &str) -> Vec<char> {
    text.chars().collect()
}
