//! Affine-gap dynamic programming shared by every pairwise engine.
//!
//! A single Gotoh-style recurrence maximizes the alignment score over three states:
//! diagonal moves, gaps consuming the second sequence, and gaps consuming the first one.
//!
//! ```text
//! E(i,j) = max(H(i,j-1) + open, E(i,j-1) + extend)
//! F(i,j) = max(H(i-1,j) + open, F(i-1,j) + extend)
//! H(i,j) = max(H(i-1,j-1) + s(a[i], b[j]), E(i,j), F(i,j))
//! ```
//!
//! Distances are computed as negated scores under negated costs, so edit distances,
//! global alignment scores, and local alignment scores all share this kernel.
//! Only two rows of each state are kept in memory.

use crate::substitution::{SubstitutionMatrix, UniformCosts};

/// Sentinel for unreachable states. Far enough from `i64::MIN` to absorb one extension.
const UNREACHABLE: i64 = i64::MIN / 4;

/// Scores consumed by the recurrence. Gap scores are usually negative.
pub(crate) trait Scoring<S> {
    fn substitute(&self, a: S, b: S) -> i64;
    fn open(&self) -> i64;
    fn extend(&self) -> i64;

    /// Score of a single maximal gap of `length` characters.
    #[inline]
    fn gap(&self, length: usize) -> i64 {
        match length {
            0 => 0,
            n => self.open() + (n as i64 - 1) * self.extend(),
        }
    }
}

/// Whether the alignment spans both sequences end-to-end or any pair of substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Locality {
    Global,
    Local,
}

/// Negated uniform costs: maximizing this score minimizes the edit distance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NegatedCosts(pub UniformCosts);

impl<S: Eq> Scoring<S> for NegatedCosts {
    #[inline]
    fn substitute(&self, a: S, b: S) -> i64 {
        if a == b {
            -i64::from(self.0.match_cost)
        } else {
            -i64::from(self.0.mismatch_cost)
        }
    }

    #[inline]
    fn open(&self) -> i64 {
        -i64::from(self.0.open_cost)
    }

    #[inline]
    fn extend(&self) -> i64 {
        -i64::from(self.0.extend_cost)
    }
}

/// Byte-indexed scores looked up in a substitution matrix.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MatrixScores<'m> {
    pub matrix: &'m SubstitutionMatrix,
    pub open: i8,
    pub extend: i8,
}

impl Scoring<u8> for MatrixScores<'_> {
    #[inline]
    fn substitute(&self, a: u8, b: u8) -> i64 {
        i64::from(self.matrix.get(a, b))
    }

    #[inline]
    fn open(&self) -> i64 {
        i64::from(self.open)
    }

    #[inline]
    fn extend(&self) -> i64 {
        i64::from(self.extend)
    }
}

/// Best alignment score of `a` against `b`.
pub(crate) fn align<S, C>(a: &[S], b: &[S], scoring: &C, locality: Locality) -> i64
where
    S: Copy,
    C: Scoring<S>,
{
    let boundary = |length: usize| match locality {
        Locality::Global => scoring.gap(length),
        Locality::Local => 0,
    };

    if a.is_empty() || b.is_empty() {
        return boundary(a.len().max(b.len()));
    }

    let (open, extend) = (scoring.open(), scoring.extend());
    let columns = b.len() + 1;

    let mut scores_previous: Vec<i64> = (0..columns).map(&boundary).collect();
    let mut scores_current = vec![0i64; columns];
    let mut deletes_previous = vec![UNREACHABLE; columns];
    let mut deletes_current = vec![UNREACHABLE; columns];
    let mut best = 0i64;

    for (i, &a_char) in a.iter().enumerate() {
        scores_current[0] = boundary(i + 1);
        deletes_current[0] = scores_current[0];
        let mut insert = UNREACHABLE;

        for (j, &b_char) in b.iter().enumerate() {
            let column = j + 1;
            insert = (scores_current[column - 1] + open).max(insert + extend);
            let delete = (scores_previous[column] + open).max(deletes_previous[column] + extend);
            let diagonal = scores_previous[column - 1] + scoring.substitute(a_char, b_char);

            let mut cell = diagonal.max(insert).max(delete);
            if locality == Locality::Local {
                cell = cell.max(0);
                best = best.max(cell);
            }
            scores_current[column] = cell;
            deletes_current[column] = delete;
        }

        core::mem::swap(&mut scores_previous, &mut scores_current);
        core::mem::swap(&mut deletes_previous, &mut deletes_current);
    }

    match locality {
        Locality::Global => scores_previous[b.len()],
        Locality::Local => best,
    }
}

/// Minimum edit cost of transforming `a` into `b` under uniform affine costs.
pub(crate) fn edit_distance<S: Copy + Eq>(a: &[S], b: &[S], costs: UniformCosts) -> usize {
    let score = align(a, b, &NegatedCosts(costs), Locality::Global);
    // All negated costs are non-positive, so is the best score.
    score.unsigned_abs() as usize
}
