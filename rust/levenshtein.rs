//! Batched Levenshtein distances over bytes and over Unicode codepoints.

use crate::affine::edit_distance;
use crate::batch::{check_pairs, codepoints};
use crate::capabilities::{Backend, CapabilitySet};
use crate::device::DeviceScope;
use crate::dispatch::{self, resolve};
use crate::error::{Error, Result};
use crate::substitution::UniformCosts;

/// Computes edit distances between byte sequence pairs using configurable gap costs.
///
/// # Examples
///
/// ```rust
/// # use stringzillas::{CapabilitySet, DeviceScope, LevenshteinDistances};
/// let device = DeviceScope::default();
/// let engine = LevenshteinDistances::new(CapabilitySet::compiled(), 0, 1, 1, 1).unwrap();
///
/// let strings_a = vec!["kitten", "saturday"];
/// let strings_b = vec!["sitting", "sunday"];
/// let distances = engine.compute(&device, &strings_a, &strings_b).unwrap();
/// assert_eq!(&distances[..], &[3, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct LevenshteinDistances {
    capabilities: CapabilitySet,
    costs: UniformCosts,
}

impl LevenshteinDistances {
    /// Create a new Levenshtein distances engine with specified costs.
    ///
    /// # Parameters
    /// - `capabilities`: Backends this engine may run on
    /// - `match_cost`: Cost when characters match (typically 0)
    /// - `mismatch_cost`: Cost when characters differ
    /// - `open_cost`: Cost of a gap's first character
    /// - `extend_cost`: Cost of every following gap character (usually <= open_cost)
    pub fn new(
        capabilities: CapabilitySet,
        match_cost: u8,
        mismatch_cost: u8,
        open_cost: u8,
        extend_cost: u8,
    ) -> Result<Self> {
        Self::with_costs(capabilities, UniformCosts::new(match_cost, mismatch_cost, open_cost, extend_cost))
    }

    pub fn with_costs(capabilities: CapabilitySet, costs: UniformCosts) -> Result<Self> {
        Ok(Self {
            capabilities: capabilities.validate_for_engine()?,
            costs,
        })
    }

    pub fn costs(&self) -> UniformCosts {
        self.costs
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn supports(&self, backend: Backend) -> bool {
        self.capabilities.contains(backend)
    }

    /// Compute Levenshtein distances between sequence pairs.
    ///
    /// Pairs sequences by index: `(a[0], b[0])`, `(a[1], b[1])`, and so on.
    /// Pass `&DeviceScope::default()` to run serially on the calling thread.
    ///
    /// # Errors
    ///
    /// - [`Error::LengthMismatch`] when the batches differ in length
    /// - [`Error::BackendUnavailable`] when `device` requests a backend this engine lacks
    /// - [`Error::DeviceExecutionFailure`] when the accelerator fails
    pub fn compute<T, S>(&self, device: &DeviceScope, sequences_a: T, sequences_b: T) -> Result<Vec<usize>>
    where
        T: AsRef<[S]>,
        S: AsRef<[u8]> + Sync,
    {
        let (a, b) = (sequences_a.as_ref(), sequences_b.as_ref());
        check_pairs(a, b)?;
        let strategy = resolve(self.capabilities, device)?;
        let costs = self.costs;
        dispatch::pairwise::<[u8], S, _, _>(&strategy, a, b, move |x: &[u8], y: &[u8]| {
            edit_distance(x, y, costs)
        })
    }
}

impl Default for LevenshteinDistances {
    /// Unit costs on every compiled backend.
    fn default() -> Self {
        Self {
            capabilities: CapabilitySet::compiled(),
            costs: UniformCosts::UNIT,
        }
    }
}

/// Computes edit distances between UTF-8 string pairs, counting each codepoint as one unit.
///
/// With non-unit costs the accelerator backend is not supported: such an engine still
/// constructs, but calls on an accelerator scope fail with [`Error::BackendUnavailable`].
/// Use [`LevenshteinDistancesUtf8::supports`] to check beforehand.
///
/// ```rust
/// # use stringzillas::{CapabilitySet, DeviceScope, LevenshteinDistancesUtf8};
/// let device = DeviceScope::default();
/// let engine = LevenshteinDistancesUtf8::new(CapabilitySet::compiled(), 0, 1, 1, 1).unwrap();
/// let distances = engine.compute(&device, &["💖", "façade"], &["💗", "facade"]).unwrap();
/// assert_eq!(distances, vec![1, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct LevenshteinDistancesUtf8 {
    capabilities: CapabilitySet,
    costs: UniformCosts,
}

impl LevenshteinDistancesUtf8 {
    pub fn new(
        capabilities: CapabilitySet,
        match_cost: u8,
        mismatch_cost: u8,
        open_cost: u8,
        extend_cost: u8,
    ) -> Result<Self> {
        Self::with_costs(capabilities, UniformCosts::new(match_cost, mismatch_cost, open_cost, extend_cost))
    }

    pub fn with_costs(capabilities: CapabilitySet, costs: UniformCosts) -> Result<Self> {
        Ok(Self {
            capabilities: capabilities.validate_for_engine()?,
            costs,
        })
    }

    pub fn costs(&self) -> UniformCosts {
        self.costs
    }

    /// Backends declared at construction.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Whether calls on `backend` can succeed, given the declared backends and costs.
    pub fn supports(&self, backend: Backend) -> bool {
        self.usable().contains(backend)
    }

    fn usable(&self) -> CapabilitySet {
        if self.costs.is_unit() {
            self.capabilities
        } else {
            self.capabilities.without(Backend::Accelerator)
        }
    }

    /// Compute codepoint-level distances between string pairs.
    /// Pass `&DeviceScope::default()` to run serially on the calling thread.
    pub fn compute<T, S>(&self, device: &DeviceScope, sequences_a: T, sequences_b: T) -> Result<Vec<usize>>
    where
        T: AsRef<[S]>,
        S: AsRef<str> + Sync,
    {
        let (a, b) = (sequences_a.as_ref(), sequences_b.as_ref());
        check_pairs(a, b)?;
        if device.is_gpu() && self.capabilities.contains(Backend::Accelerator) && !self.costs.is_unit() {
            return Err(Error::BackendUnavailable(
                "codepoint distances with custom costs are not supported on the accelerator".into(),
            ));
        }
        let strategy = resolve(self.usable(), device)?;
        let costs = self.costs;
        dispatch::pairwise::<str, S, _, _>(&strategy, a, b, move |x: &str, y: &str| {
            if x.is_ascii() && y.is_ascii() {
                edit_distance(x.as_bytes(), y.as_bytes(), costs)
            } else {
                edit_distance(&codepoints(x), &codepoints(y), costs)
            }
        })
    }
}

impl Default for LevenshteinDistancesUtf8 {
    fn default() -> Self {
        Self {
            capabilities: CapabilitySet::compiled(),
            costs: UniformCosts::UNIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_batch(rng: &mut StdRng, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                let length = rng.gen_range(0..24);
                (0..length).map(|_| rng.gen_range(b'a'..=b'e') as char).collect()
            })
            .collect()
    }

    #[test]
    fn unit_costs() {
        let device = DeviceScope::default();
        let engine = LevenshteinDistances::default();
        let a = vec!["hello", "", "abc", "abcdefgABCDEFG", "kitten"];
        let b = vec!["hell", "abc", "", "ABCDEFGabcdefg", "sitting"];
        assert_eq!(engine.compute(&device, &a, &b).unwrap(), vec![1, 3, 3, 14, 3]);
    }

    #[test]
    fn custom_gap_costs() {
        let device = DeviceScope::default();
        let (mismatch, open, extend) = (4, 3, 2);
        let engine = LevenshteinDistances::new(CapabilitySet::SERIAL, 0, mismatch, open, extend).unwrap();
        let a = vec!["hello", "", "abc"];
        let b = vec!["hell", "abc", "adc"];
        let (mismatch, open, extend) = (mismatch as usize, open as usize, extend as usize);
        assert_eq!(
            engine.compute(&device, &a, &b).unwrap(),
            vec![open, open + 2 * extend, mismatch]
        );
    }

    #[test]
    fn unequal_batches_are_rejected() {
        let device = DeviceScope::default();
        let engine = LevenshteinDistances::default();
        let a = vec!["a", "b", "c"];
        let b = vec!["a"];
        assert_eq!(
            engine.compute(&device, &a, &b),
            Err(Error::LengthMismatch { left: 3, right: 1 })
        );
        let empty: Vec<&str> = Vec::new();
        assert_eq!(engine.compute(&device, &empty, &empty), Ok(vec![]));
    }

    #[test]
    fn empty_capabilities_are_rejected() {
        assert!(matches!(
            LevenshteinDistances::new(CapabilitySet::EMPTY, 0, 1, 1, 1),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[cfg(feature = "cpus")]
    #[test]
    fn parallel_matches_serial() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = random_batch(&mut rng, 1000);
        let b = random_batch(&mut rng, 1000);
        let engine = LevenshteinDistances::default();

        let serial = engine.compute(&DeviceScope::default(), &a, &b).unwrap();
        let parallel = engine.compute(&DeviceScope::cpu_cores(4).unwrap(), &a, &b).unwrap();
        assert_eq!(serial.len(), 1000);
        assert_eq!(serial, parallel);
    }

    #[cfg(feature = "cpus")]
    #[test]
    fn serial_only_engine_rejects_parallel_scope() {
        let engine = LevenshteinDistances::new(CapabilitySet::SERIAL, 0, 1, 1, 1).unwrap();
        let device = DeviceScope::cpu_cores(2).unwrap();
        let a = vec!["abc"];
        assert!(matches!(engine.compute(&device, &a, &a), Err(Error::BackendUnavailable(_))));
        // A single core is still serial execution.
        let single = DeviceScope::cpu_cores(1).unwrap();
        assert_eq!(engine.compute(&single, &a, &a), Ok(vec![0]));
    }

    #[cfg(feature = "accelerator")]
    #[test]
    fn accelerator_matches_serial() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_batch(&mut rng, 200);
        let b = random_batch(&mut rng, 200);
        let engine = LevenshteinDistances::new(CapabilitySet::compiled(), 0, 4, 3, 2).unwrap();

        let serial = engine.compute(&DeviceScope::default(), &a, &b).unwrap();
        let offloaded = engine.compute(&DeviceScope::gpu_device(0).unwrap(), &a, &b).unwrap();
        assert_eq!(serial, offloaded);

        let cpu_only = LevenshteinDistances::new(CapabilitySet::SERIAL.with(Backend::Parallel), 0, 1, 1, 1).unwrap();
        assert!(matches!(
            cpu_only.compute(&DeviceScope::gpu_device(0).unwrap(), &a, &b),
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[test]
    fn codepoints_count_as_single_edits() {
        let device = DeviceScope::default();
        let engine = LevenshteinDistancesUtf8::default();
        let a = vec!["𠜎 𠜱 𠝹 𠱓", "💖", "αβγδ", "façade", "München", "こんにちは世界", ""];
        let b = vec!["𠜎𠜱𠝹𠱓", "💗", "αγδ", "facade", "Muenchen", "こんばんは世界", "🌟"];
        assert_eq!(engine.compute(&device, &a, &b).unwrap(), vec![3, 1, 1, 1, 2, 2, 1]);

        // The byte engine sees every UTF-8 octet.
        let bytes = LevenshteinDistances::default();
        let distance = bytes.compute(&device, &["💖"], &["💗"]).unwrap();
        assert_eq!(distance, vec![1]);
        let distance = bytes.compute(&device, &["façade"], &["facade"]).unwrap();
        assert_eq!(distance, vec![2]);
    }

    #[test]
    fn codepoint_custom_costs() {
        let device = DeviceScope::default();
        let engine = LevenshteinDistancesUtf8::new(CapabilitySet::SERIAL, 0, 4, 3, 2).unwrap();
        let distances = engine.compute(&device, &["αβγ", "", "日本語"], &["αβ", "日本語", "日木語"]).unwrap();
        assert_eq!(distances, vec![3, 3 + 2 * 2, 4]);
    }

    #[cfg(feature = "accelerator")]
    #[test]
    fn codepoint_custom_costs_are_not_offloaded() {
        let device = DeviceScope::gpu_device(0).unwrap();
        let unit = LevenshteinDistancesUtf8::default();
        assert!(unit.supports(Backend::Accelerator));
        assert_eq!(unit.compute(&device, &["αβγ"], &["αγ"]), Ok(vec![1]));

        let custom = LevenshteinDistancesUtf8::new(CapabilitySet::compiled(), 0, 4, 3, 2).unwrap();
        assert!(!custom.supports(Backend::Accelerator));
        assert!(custom.supports(Backend::Serial));
        assert!(custom.capabilities().contains(Backend::Accelerator));
        assert!(matches!(
            custom.compute(&device, &["αβγ"], &["αγ"]),
            Err(Error::BackendUnavailable(_))
        ));
    }
}
