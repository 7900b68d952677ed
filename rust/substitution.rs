//! Gap and substitution parameters shared by the distance and alignment engines.

use core::fmt;

/// Uniform edit costs for the Levenshtein family of engines.
///
/// A maximal gap of `L` inserted or deleted characters costs `open + (L - 1) * extend`,
/// a substitution of two differing characters costs `mismatch`, and keeping an identical
/// character costs `match`. Costs are unsigned, so distances are never negative.
/// Keeping `open >= extend` is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformCosts {
    pub match_cost: u8,
    pub mismatch_cost: u8,
    pub open_cost: u8,
    pub extend_cost: u8,
}

impl UniformCosts {
    pub const UNIT: UniformCosts = UniformCosts {
        match_cost: 0,
        mismatch_cost: 1,
        open_cost: 1,
        extend_cost: 1,
    };

    pub const fn new(match_cost: u8, mismatch_cost: u8, open_cost: u8, extend_cost: u8) -> Self {
        Self {
            match_cost,
            mismatch_cost,
            open_cost,
            extend_cost,
        }
    }

    /// Linear gaps: every inserted or deleted character costs `gap`.
    pub const fn linear(mismatch_cost: u8, gap_cost: u8) -> Self {
        Self::new(0, mismatch_cost, gap_cost, gap_cost)
    }

    /// True for the classic unweighted Levenshtein costs.
    pub fn is_unit(&self) -> bool {
        *self == Self::UNIT
    }
}

impl Default for UniformCosts {
    fn default() -> Self {
        Self::UNIT
    }
}

/// A dense 256×256 table of substitution scores, indexed by the two byte values.
///
/// Scores are signed: positive values reward an aligned pair, negative values penalize it.
#[derive(Clone, PartialEq, Eq)]
pub struct SubstitutionMatrix {
    scores: Box<[[i8; 256]; 256]>,
}

impl SubstitutionMatrix {
    pub fn from_array(scores: &[[i8; 256]; 256]) -> Self {
        Self {
            scores: Box::new(*scores),
        }
    }

    /// Identical bytes score `match_score`, all other pairs `mismatch_score`.
    pub fn diagonal(match_score: i8, mismatch_score: i8) -> Self {
        Self::from_array(&error_costs_256x256_diagonal(match_score, mismatch_score))
    }

    /// Equivalent to `SubstitutionMatrix::diagonal(0, -1)`.
    pub fn unary() -> Self {
        Self::diagonal(0, -1)
    }

    #[inline]
    pub fn get(&self, a: u8, b: u8) -> i8 {
        self.scores[a as usize][b as usize]
    }

    pub fn set(&mut self, a: u8, b: u8, score: i8) {
        self.scores[a as usize][b as usize] = score;
    }

    pub fn as_array(&self) -> &[[i8; 256]; 256] {
        &self.scores
    }
}

impl fmt::Debug for SubstitutionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagonal_min = (0..=255u8).map(|i| self.get(i, i)).min().unwrap_or(0);
        let diagonal_max = (0..=255u8).map(|i| self.get(i, i)).max().unwrap_or(0);
        f.debug_struct("SubstitutionMatrix")
            .field("diagonal", &(diagonal_min..=diagonal_max))
            .finish_non_exhaustive()
    }
}

/// Creates a diagonal substitution matrix for sequence alignment.
/// Diagonal entries (matches) get `match_score`, off-diagonal (mismatches) get `mismatch_score`.
pub fn error_costs_256x256_diagonal(match_score: i8, mismatch_score: i8) -> [[i8; 256]; 256] {
    let mut result = [[mismatch_score; 256]; 256];
    for (i, row) in result.iter_mut().enumerate() {
        row[i] = match_score;
    }
    result
}

/// Equivalent to `error_costs_256x256_diagonal(0, -1)`.
pub fn error_costs_256x256_unary() -> [[i8; 256]; 256] {
    error_costs_256x256_diagonal(0, -1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_matrix() {
        let matrix = SubstitutionMatrix::diagonal(2, -1);
        assert_eq!(matrix.get(b'A', b'A'), 2);
        assert_eq!(matrix.get(b'A', b'C'), -1);
        assert_eq!(matrix.get(255, 255), 2);
        assert_eq!(SubstitutionMatrix::unary().as_array(), &error_costs_256x256_unary());
    }

    #[test]
    fn matrix_is_mutable() {
        let mut matrix = SubstitutionMatrix::unary();
        matrix.set(b'I', b'L', 3);
        assert_eq!(matrix.get(b'I', b'L'), 3);
        assert_eq!(matrix.get(b'L', b'I'), -1);
    }

    #[test]
    fn uniform_costs() {
        assert!(UniformCosts::default().is_unit());
        assert!(!UniformCosts::linear(4, 3).is_unit());
        assert_eq!(UniformCosts::linear(4, 3).extend_cost, 3);
    }
}
