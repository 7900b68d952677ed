//! Host-emulated accelerator backend.
//!
//! Every call follows the offload-and-wait protocol of a discrete device: both batches are
//! copied into contiguous tapes in unified memory, a kernel runs over every row on the
//! device's own lanes, and the results are copied back into host memory. Failures at any
//! stage surface as a single [`Error::DeviceExecutionFailure`] for the whole batch.

use std::panic::{self, AssertUnwindSafe};

use allocator_api2::alloc::{AllocError, Allocator, Global, Layout};
use rayon::prelude::*;
use stringtape::{BytesTape, CharsTape as StringTape};
use tracing::{debug, warn};

use crate::batch::{needs_wide_offsets, total_bytes, Text};
use crate::error::{Error, Result};
use crate::workers::WorkerPool;

/// Number of accelerator devices exposed by this build.
pub const ACCELERATOR_DEVICES: usize = 1;

/// Unified memory a single call may stage on a device unless configured otherwise.
pub const DEFAULT_DEVICE_MEMORY: usize = 1 << 30;

/// Unified memory allocator shared by the host and the emulated device.
/// Works with allocator-api2.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedAlloc;

unsafe impl Allocator for UnifiedAlloc {
    fn allocate(&self, layout: Layout) -> core::result::Result<core::ptr::NonNull<[u8]>, AllocError> {
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: core::ptr::NonNull<u8>, layout: Layout) {
        Global.deallocate(ptr, layout)
    }
}

/// Type alias for Vec with unified allocator
pub type UnifiedVec<T> = allocator_api2::vec::Vec<T, UnifiedAlloc>;

/// A batch staged in unified memory, with 32-bit offsets when the data fits.
pub enum DeviceTape {
    Bytes32(BytesTape<u32, UnifiedAlloc>),
    Bytes64(BytesTape<u64, UnifiedAlloc>),
    Chars32(StringTape<u32, UnifiedAlloc>),
    Chars64(StringTape<u64, UnifiedAlloc>),
}

/// Row accessor over the raw parts of a [`DeviceTape`].
#[derive(Clone, Copy)]
enum TapeRows<'t> {
    Narrow { data: &'t [u8], offsets: &'t [u32] },
    Wide { data: &'t [u8], offsets: &'t [u64] },
}

impl<'t> TapeRows<'t> {
    fn row(&self, index: usize) -> Option<&'t [u8]> {
        let (data, start, end) = match *self {
            TapeRows::Narrow { data, offsets } => (
                data,
                usize::try_from(*offsets.get(index)?).ok()?,
                usize::try_from(*offsets.get(index + 1)?).ok()?,
            ),
            TapeRows::Wide { data, offsets } => (
                data,
                usize::try_from(*offsets.get(index)?).ok()?,
                usize::try_from(*offsets.get(index + 1)?).ok()?,
            ),
        };
        data.get(start..end)
    }
}

/// Reconstructs the data and offsets slices of a tape holding `count` rows.
///
/// # Safety
///
/// `data` and `offsets` must come from the same live tape, with `count + 1` offsets.
unsafe fn raw_rows<'t, O>(data: *const u8, offsets: *const O, count: usize) -> Option<(&'t [u8], &'t [O])>
where
    O: Copy + Into<u64>,
{
    if count == 0 {
        return Some((&[], &[]));
    }
    if offsets.is_null() {
        return None;
    }
    let offsets = core::slice::from_raw_parts(offsets, count + 1);
    let data_length = usize::try_from(offsets[count].into()).ok()?;
    if data_length == 0 {
        return Some((&[], offsets));
    }
    if data.is_null() {
        return None;
    }
    Some((core::slice::from_raw_parts(data, data_length), offsets))
}

impl DeviceTape {
    fn rows(&self) -> Result<TapeRows<'_>> {
        let corrupted = || Error::DeviceExecutionFailure("staged tape has inconsistent offsets".into());
        // SAFETY: raw parts are read from a tape that outlives the returned rows.
        let rows = unsafe {
            match self {
                DeviceTape::Bytes32(tape) => {
                    let parts = tape.as_raw_parts();
                    raw_rows(parts.data_ptr, parts.offsets_ptr, parts.items_count)
                        .map(|(data, offsets)| TapeRows::Narrow { data, offsets })
                }
                DeviceTape::Bytes64(tape) => {
                    let parts = tape.as_raw_parts();
                    raw_rows(parts.data_ptr, parts.offsets_ptr, parts.items_count)
                        .map(|(data, offsets)| TapeRows::Wide { data, offsets })
                }
                DeviceTape::Chars32(tape) => {
                    let parts = tape.as_raw_parts();
                    raw_rows(parts.data_ptr, parts.offsets_ptr, parts.items_count)
                        .map(|(data, offsets)| TapeRows::Narrow { data, offsets })
                }
                DeviceTape::Chars64(tape) => {
                    let parts = tape.as_raw_parts();
                    raw_rows(parts.data_ptr, parts.offsets_ptr, parts.items_count)
                        .map(|(data, offsets)| TapeRows::Wide { data, offsets })
                }
            }
        };
        rows.ok_or_else(corrupted)
    }
}

fn staging_failure() -> Error {
    Error::DeviceExecutionFailure("failed to stage batch in unified memory".into())
}

/// Convert byte sequences to BytesTape
pub(crate) fn copy_bytes_into_tape<T>(sequences: &[T], force_64bit: bool) -> Result<DeviceTape>
where
    T: AsRef<[u8]>,
{
    if force_64bit {
        let mut tape = BytesTape::<u64, UnifiedAlloc>::new_in(UnifiedAlloc);
        tape.extend(sequences).map_err(|_| staging_failure())?;
        Ok(DeviceTape::Bytes64(tape))
    } else {
        let mut tape = BytesTape::<u32, UnifiedAlloc>::new_in(UnifiedAlloc);
        tape.extend(sequences).map_err(|_| staging_failure())?;
        Ok(DeviceTape::Bytes32(tape))
    }
}

/// Convert string sequences to StringTape
pub(crate) fn copy_chars_into_tape<T: AsRef<str>>(sequences: &[T], force_64bit: bool) -> Result<DeviceTape> {
    if force_64bit {
        let mut tape = StringTape::<u64, UnifiedAlloc>::new_in(UnifiedAlloc);
        tape.extend(sequences).map_err(|_| staging_failure())?;
        Ok(DeviceTape::Chars64(tape))
    } else {
        let mut tape = StringTape::<u32, UnifiedAlloc>::new_in(UnifiedAlloc);
        tape.extend(sequences).map_err(|_| staging_failure())?;
        Ok(DeviceTape::Chars32(tape))
    }
}

/// Bytes a batch occupies once staged, including its offsets.
fn staged_size<T, S>(batch: &[S], wide_offsets: bool) -> usize
where
    T: Text + ?Sized,
    S: AsRef<T>,
{
    let offset_size = if wide_offsets { 8 } else { 4 };
    total_bytes::<T, S>(batch) + (batch.len() + 1) * offset_size
}

/// An opened accelerator device. Owns its execution lanes until dropped.
pub struct Device {
    index: usize,
    memory_limit: usize,
    lanes: WorkerPool,
}

impl Device {
    pub(crate) fn open(index: usize, memory_limit: usize) -> Result<Self> {
        if index >= ACCELERATOR_DEVICES {
            return Err(Error::BackendUnavailable(format!(
                "accelerator device {index} is not present, {ACCELERATOR_DEVICES} available"
            )));
        }
        let builder = rayon::ThreadPoolBuilder::new().thread_name(move |lane| format!("szs-device{index}-lane{lane}"));
        let lanes = WorkerPool::build(builder)
            .map_err(|e| Error::DeviceExecutionFailure(format!("failed to initialize device {index}: {e}")))?;
        Ok(Self {
            index,
            memory_limit,
            lanes,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn lanes(&self) -> usize {
        self.lanes.current_num_threads()
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        if bytes > self.memory_limit {
            return Err(Error::DeviceExecutionFailure(format!(
                "batch needs {bytes} bytes of unified memory, device {} allows {}",
                self.index, self.memory_limit
            )));
        }
        Ok(())
    }

    /// Runs `kernel` on the device lanes, turning panics into a device failure.
    fn launch<OP>(&self, kernel: OP) -> Result<()>
    where
        OP: FnOnce() -> Result<()> + Send,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| self.lanes.install(kernel))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                warn!(device = self.index, %error, "kernel failed");
                Err(error)
            }
            Err(_) => {
                warn!(device = self.index, "kernel panicked");
                Err(Error::DeviceExecutionFailure(format!(
                    "kernel panicked on device {}",
                    self.index
                )))
            }
        }
    }

    /// Offloads a pairwise batch, returning one result per pair in input order.
    pub(crate) fn pairwise<T, S, R, F>(&self, a: &[S], b: &[S], kernel: F) -> Result<Vec<R>>
    where
        T: Text + ?Sized,
        S: AsRef<T>,
        R: Clone + Default + Send,
        F: Fn(&T, &T) -> R + Sync,
    {
        let count = a.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        let wide = needs_wide_offsets::<T, S>(a) || needs_wide_offsets::<T, S>(b);
        let staged = staged_size::<T, S>(a, wide) + staged_size::<T, S>(b, wide) + count * core::mem::size_of::<R>();
        self.reserve(staged)?;
        debug!(device = self.index, rows = count, bytes = staged, wide, "staging pairwise batch");

        let tape_a = T::copy_into_tape(a, wide)?;
        let tape_b = T::copy_into_tape(b, wide)?;
        let (rows_a, rows_b) = (tape_a.rows()?, tape_b.rows()?);

        let mut results: UnifiedVec<R> = UnifiedVec::with_capacity_in(count, UnifiedAlloc);
        results.resize(count, R::default());
        let slots = results.as_mut_slice();
        self.launch(|| {
            slots.par_iter_mut().enumerate().try_for_each(|(i, slot)| {
                let first = rows_a.row(i).and_then(T::from_device);
                let second = rows_b.row(i).and_then(T::from_device);
                match (first, second) {
                    (Some(first), Some(second)) => {
                        *slot = kernel(first, second);
                        Ok(())
                    }
                    _ => Err(Error::DeviceExecutionFailure(format!("row {i} could not be decoded on device"))),
                }
            })
        })?;

        Ok(results.into_iter().collect())
    }

    /// Offloads a batch of single strings, returning one result per string in input order.
    pub(crate) fn each<T, S, R, F>(&self, batch: &[S], kernel: F) -> Result<Vec<R>>
    where
        T: Text + ?Sized,
        S: AsRef<T>,
        R: Clone + Default + Send,
        F: Fn(&T) -> R + Sync,
    {
        let count = batch.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        let wide = needs_wide_offsets::<T, S>(batch);
        let staged = staged_size::<T, S>(batch, wide) + count * core::mem::size_of::<R>();
        self.reserve(staged)?;
        debug!(device = self.index, rows = count, bytes = staged, wide, "staging batch");

        let tape = T::copy_into_tape(batch, wide)?;
        let rows = tape.rows()?;

        let mut results: UnifiedVec<R> = UnifiedVec::with_capacity_in(count, UnifiedAlloc);
        results.resize(count, R::default());
        let slots = results.as_mut_slice();
        self.launch(|| {
            slots.par_iter_mut().enumerate().try_for_each(|(i, slot)| {
                let text = rows
                    .row(i)
                    .and_then(T::from_device)
                    .ok_or_else(|| Error::DeviceExecutionFailure(format!("row {i} could not be decoded on device")))?;
                *slot = kernel(text);
                Ok(())
            })
        })?;

        Ok(results.into_iter().collect())
    }
}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("index", &self.index)
            .field("memory_limit", &self.memory_limit)
            .field("lanes", &self.lanes())
            .finish()
    }
}
