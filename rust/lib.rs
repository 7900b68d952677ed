//! Batched string similarity engines with pluggable execution backends.
//!
//! Every engine takes a [`DeviceScope`] selecting where a batch runs: on the calling thread,
//! on a bounded pool of CPU cores, or on an accelerator device. Results always come back
//! positionally aligned with the inputs, and a failing call never returns partial results.
//!
//! - [`LevenshteinDistances`] and [`LevenshteinDistancesUtf8`] compute affine-gap edit
//!   distances over bytes and codepoints.
//! - [`NeedlemanWunschScores`] and [`SmithWatermanScores`] compute global and local
//!   alignment scores under a [`SubstitutionMatrix`].
//! - [`Fingerprints`] and [`FingerprintsUtf8`] produce Min-Hash sketches.
//!
//! ```rust
//! use stringzillas::{CapabilitySet, DeviceScope, LevenshteinDistancesUtf8};
//!
//! let device = DeviceScope::default();
//! let engine = LevenshteinDistancesUtf8::new(CapabilitySet::compiled(), 0, 1, 1, 1).unwrap();
//! let distances = engine.compute(&device, &["München", "αβγδ"], &["Muenchen", "αγδ"]).unwrap();
//! assert_eq!(distances, vec![2, 1]);
//! ```

mod affine;
mod batch;
mod dispatch;
#[cfg(feature = "cpus")]
mod workers;

#[cfg(feature = "accelerator")]
pub mod accelerator;
pub mod capabilities;
pub mod device;
pub mod error;
pub mod fingerprints;
pub mod levenshtein;
pub mod needleman_wunsch;
pub mod substitution;

#[cfg(feature = "accelerator")]
pub use accelerator::{UnifiedAlloc, UnifiedVec, ACCELERATOR_DEVICES};
pub use capabilities::{Backend, CapabilitySet};
pub use device::{ContextOptions, DeviceScope};
pub use error::{Error, Result};
pub use fingerprints::{Fingerprint, Fingerprints, FingerprintsBuilder, FingerprintsUtf8};
pub use levenshtein::{LevenshteinDistances, LevenshteinDistancesUtf8};
pub use needleman_wunsch::{NeedlemanWunschScores, SmithWatermanScores};
pub use substitution::{error_costs_256x256_diagonal, error_costs_256x256_unary, SubstitutionMatrix, UniformCosts};

/// Backends compiled into this build. Always contains [`Backend::Serial`].
pub fn capabilities() -> CapabilitySet {
    CapabilitySet::compiled()
}

/// Get information about the compiled backend
///
/// # Examples
///
/// ```
/// # use stringzillas::backend_info;
/// let info = backend_info();
/// println!("Using backend: {}", info);
/// ```
pub fn backend_info() -> &'static str {
    if cfg!(feature = "accelerator") {
        "Host-emulated accelerator with unified memory enabled"
    } else if cfg!(feature = "cpus") {
        "Multi-threaded CPU backend enabled"
    } else {
        "Serial CPU backend only - enable cpus or accelerator feature"
    }
}
