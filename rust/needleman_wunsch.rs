//! Batched alignment scores under a substitution matrix and affine gaps.

use crate::affine::{align, Locality, MatrixScores};
use crate::batch::check_pairs;
use crate::capabilities::{Backend, CapabilitySet};
use crate::device::DeviceScope;
use crate::dispatch::{self, resolve};
use crate::error::Result;
use crate::substitution::SubstitutionMatrix;

/// Scoring shared by both alignment engines.
#[derive(Debug, Clone)]
struct AlignmentModel {
    capabilities: CapabilitySet,
    matrix: SubstitutionMatrix,
    open: i8,
    extend: i8,
}

impl AlignmentModel {
    fn new(capabilities: CapabilitySet, matrix: &SubstitutionMatrix, open: i8, extend: i8) -> Result<Self> {
        Ok(Self {
            capabilities: capabilities.validate_for_engine()?,
            matrix: matrix.clone(),
            open,
            extend,
        })
    }

    fn compute<S>(&self, device: &DeviceScope, a: &[S], b: &[S], locality: Locality) -> Result<Vec<isize>>
    where
        S: AsRef<[u8]> + Sync,
    {
        check_pairs(a, b)?;
        let strategy = resolve(self.capabilities, device)?;
        let scores = MatrixScores {
            matrix: &self.matrix,
            open: self.open,
            extend: self.extend,
        };
        dispatch::pairwise::<[u8], S, _, _>(&strategy, a, b, move |x: &[u8], y: &[u8]| {
            align(x, y, &scores, locality) as isize
        })
    }
}

/// Computes global alignment scores between byte sequence pairs.
///
/// Gap scores are usually negative: a gap of `L` characters scores `open + (L - 1) * extend`.
///
/// # Examples
///
/// ```rust
/// # use stringzillas::{CapabilitySet, DeviceScope, NeedlemanWunschScores, SubstitutionMatrix};
/// let device = DeviceScope::default();
/// let matrix = SubstitutionMatrix::unary();
/// let engine = NeedlemanWunschScores::new(CapabilitySet::compiled(), &matrix, -1, -1).unwrap();
///
/// let scores = engine.compute(&device, &["kitten"], &["sitting"]).unwrap();
/// assert_eq!(scores, vec![-3]);
/// ```
#[derive(Debug, Clone)]
pub struct NeedlemanWunschScores {
    model: AlignmentModel,
}

impl NeedlemanWunschScores {
    /// Create a global alignment engine.
    ///
    /// # Parameters
    /// - `capabilities`: Backends this engine may run on
    /// - `substitution_matrix`: Score of aligning every pair of byte values
    /// - `open_cost`: Score of a gap's first character
    /// - `extend_cost`: Score of every following gap character
    pub fn new(
        capabilities: CapabilitySet,
        substitution_matrix: &SubstitutionMatrix,
        open_cost: i8,
        extend_cost: i8,
    ) -> Result<Self> {
        Ok(Self {
            model: AlignmentModel::new(capabilities, substitution_matrix, open_cost, extend_cost)?,
        })
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.model.capabilities
    }

    pub fn supports(&self, backend: Backend) -> bool {
        self.model.capabilities.contains(backend)
    }

    pub fn substitution_matrix(&self) -> &SubstitutionMatrix {
        &self.model.matrix
    }

    /// Best end-to-end alignment score of every pair `(a[i], b[i])`.
    /// Pass `&DeviceScope::default()` to run serially on the calling thread.
    pub fn compute<T, S>(&self, device: &DeviceScope, sequences_a: T, sequences_b: T) -> Result<Vec<isize>>
    where
        T: AsRef<[S]>,
        S: AsRef<[u8]> + Sync,
    {
        self.model
            .compute(device, sequences_a.as_ref(), sequences_b.as_ref(), Locality::Global)
    }
}

/// Computes local alignment scores between byte sequence pairs.
///
/// Scores are never negative: unrelated or empty sequences score zero.
///
/// ```rust
/// # use stringzillas::{CapabilitySet, DeviceScope, SmithWatermanScores, SubstitutionMatrix};
/// let device = DeviceScope::default();
/// let matrix = SubstitutionMatrix::diagonal(2, -1);
/// let engine = SmithWatermanScores::new(CapabilitySet::compiled(), &matrix, -3, -1).unwrap();
/// let scores = engine.compute(&device, &["xxGATTACAyy", "AAAA"], &["GATTACA", "CCCC"]).unwrap();
/// assert_eq!(scores, vec![14, 0]);
/// ```
#[derive(Debug, Clone)]
pub struct SmithWatermanScores {
    model: AlignmentModel,
}

impl SmithWatermanScores {
    pub fn new(
        capabilities: CapabilitySet,
        substitution_matrix: &SubstitutionMatrix,
        open_cost: i8,
        extend_cost: i8,
    ) -> Result<Self> {
        Ok(Self {
            model: AlignmentModel::new(capabilities, substitution_matrix, open_cost, extend_cost)?,
        })
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.model.capabilities
    }

    pub fn supports(&self, backend: Backend) -> bool {
        self.model.capabilities.contains(backend)
    }

    pub fn substitution_matrix(&self) -> &SubstitutionMatrix {
        &self.model.matrix
    }

    /// Best alignment score between any substrings of every pair `(a[i], b[i])`.
    /// Pass `&DeviceScope::default()` to run serially on the calling thread.
    pub fn compute<T, S>(&self, device: &DeviceScope, sequences_a: T, sequences_b: T) -> Result<Vec<isize>>
    where
        T: AsRef<[S]>,
        S: AsRef<[u8]> + Sync,
    {
        self.model
            .compute(device, sequences_a.as_ref(), sequences_b.as_ref(), Locality::Local)
    }
}
