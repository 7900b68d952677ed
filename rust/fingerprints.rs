//! Min-Hash fingerprints over sliding windows of bytes or codepoints.
//!
//! Every dimension owns an independent polynomial rolling hash modulo the Mersenne prime
//! `2^61 - 1`, with a base and a salt derived from the dimension index alone. A fingerprint
//! stores, per dimension, the smallest window hash and how many windows produced it.
//! Identical inputs therefore always produce identical fingerprints, across calls and
//! across processes, while distinct inputs collide only with negligible probability.
//!
//! Non-empty inputs are framed by begin and end markers before hashing, so the windows
//! touching either edge tell apart strings with the same interior windows, such as
//! `"abababab"` and `"babababa"`.

use crate::batch::codepoints;
use crate::capabilities::{Backend, CapabilitySet};
use crate::device::DeviceScope;
use crate::dispatch::{self, resolve};
use crate::error::{Error, Result};

pub const DEFAULT_DIMENSIONS: usize = 256;
pub const DEFAULT_WINDOW_WIDTHS: [usize; 4] = [3, 5, 7, 9];

const MERSENNE_61: u64 = (1 << 61) - 1;
/// Frame markers, above every shifted codepoint.
const BEGIN: u64 = 0x11_0001;
const END: u64 = 0x11_0002;
/// Smallest rolling base, above every symbol including the markers.
const MIN_BASE: u64 = 0x11_0004;
const SEED: u64 = 0x243F_6A88_85A3_08D3;

#[inline]
fn reduce(x: u64) -> u64 {
    let folded = (x & MERSENNE_61) + (x >> 61);
    if folded >= MERSENNE_61 {
        folded - MERSENNE_61
    } else {
        folded
    }
}

#[inline]
fn mul_mod(a: u64, b: u64) -> u64 {
    let product = u128::from(a) * u128::from(b);
    reduce((product as u64 & MERSENNE_61) + (product >> 61) as u64)
}

#[inline]
fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// One fingerprint dimension.
#[derive(Debug, Clone, Copy)]
struct RollingHash {
    width: usize,
    base: u64,
    salt: u64,
}

impl RollingHash {
    fn for_dimension(dimension: usize, width: usize) -> Self {
        let seed = SEED ^ (dimension as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93);
        let base = MIN_BASE + splitmix64(seed) % (MERSENNE_61 - MIN_BASE);
        let salt = splitmix64(seed.rotate_left(32)) % MERSENNE_61;
        Self { width, base, salt }
    }

    #[inline]
    fn finish(&self, state: u64) -> u32 {
        let salted = reduce(state + self.salt);
        (salted ^ (salted >> 32)) as u32
    }

    /// Minimum window hash and its multiplicity over nonzero `symbols`.
    /// Inputs shorter than the window form one window.
    fn min_window(&self, symbols: &[u64]) -> (u32, u32) {
        if symbols.is_empty() {
            return (u32::MAX, 0);
        }
        let width = self.width.min(symbols.len());

        let mut state = 0u64;
        let mut leading_power = 1u64;
        for (i, &symbol) in symbols[..width].iter().enumerate() {
            state = reduce(mul_mod(state, self.base) + symbol);
            if i > 0 {
                leading_power = mul_mod(leading_power, self.base);
            }
        }

        let mut min_hash = self.finish(state);
        let mut min_count = 1u32;
        for (&outgoing, &incoming) in symbols.iter().zip(&symbols[width..]) {
            let removed = mul_mod(outgoing, leading_power);
            state = reduce(state + MERSENNE_61 - removed);
            state = reduce(mul_mod(state, self.base) + incoming);
            let hash = self.finish(state);
            if hash < min_hash {
                min_hash = hash;
                min_count = 1;
            } else if hash == min_hash {
                min_count += 1;
            }
        }
        (min_hash, min_count)
    }
}

/// A fixed-width content sketch of one string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    min_hashes: Vec<u32>,
    min_counts: Vec<u32>,
}

impl Fingerprint {
    /// Smallest window hash per dimension. `u32::MAX` for empty inputs.
    pub fn min_hashes(&self) -> &[u32] {
        &self.min_hashes
    }

    /// How many windows hit the minimum, per dimension.
    pub fn min_counts(&self) -> &[u32] {
        &self.min_counts
    }

    pub fn dimensions(&self) -> usize {
        self.min_hashes.len()
    }

    /// Fraction of dimensions with equal minimum hashes, an estimate of window-set similarity.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        if self.dimensions() == 0 || self.dimensions() != other.dimensions() {
            return 0.0;
        }
        let matching = self
            .min_hashes
            .iter()
            .zip(&other.min_hashes)
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / self.dimensions() as f64
    }
}

#[derive(Debug, Clone)]
struct Sketcher {
    hashers: Vec<RollingHash>,
    window_widths: Vec<usize>,
}

/// Shifts symbols off zero and wraps a non-empty input in the frame markers.
fn frame<S: Copy + Into<u64>>(symbols: &[S]) -> Vec<u64> {
    if symbols.is_empty() {
        return Vec::new();
    }
    let mut framed = Vec::with_capacity(symbols.len() + 2);
    framed.push(BEGIN);
    framed.extend(symbols.iter().map(|&s| Into::<u64>::into(s) + 1));
    framed.push(END);
    framed
}

impl Sketcher {
    fn sketch<S: Copy + Into<u64>>(&self, symbols: &[S]) -> Fingerprint {
        let framed = frame(symbols);
        let (min_hashes, min_counts) = self.hashers.iter().map(|hasher| hasher.min_window(&framed)).unzip();
        Fingerprint { min_hashes, min_counts }
    }
}

/// Configures a fingerprinting engine.
///
/// ```rust
/// # use stringzillas::{DeviceScope, FingerprintsBuilder};
/// let device = DeviceScope::default();
/// let engine = FingerprintsBuilder::new().dimensions(64).window_widths(&[4, 8]).build().unwrap();
/// let fingerprints = engine.compute(&device, &["hello", "world", "hello"]).unwrap();
/// assert_eq!(fingerprints[0], fingerprints[2]);
/// assert_ne!(fingerprints[0], fingerprints[1]);
/// ```
#[derive(Debug, Clone)]
pub struct FingerprintsBuilder {
    dimensions: usize,
    window_widths: Vec<usize>,
    capabilities: CapabilitySet,
}

impl FingerprintsBuilder {
    /// Defaults: 256 dimensions over windows of 3, 5, 7 and 9 symbols, on every compiled backend.
    pub fn new() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            window_widths: DEFAULT_WINDOW_WIDTHS.to_vec(),
            capabilities: CapabilitySet::compiled(),
        }
    }

    /// Total number of hash functions. Must be divisible by the number of window widths.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Window widths, in symbols. Dimensions are split evenly between them.
    pub fn window_widths(mut self, widths: &[usize]) -> Self {
        self.window_widths = widths.to_vec();
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn sketcher(&self) -> Result<(CapabilitySet, Sketcher)> {
        let capabilities = self.capabilities.validate_for_engine()?;
        if self.window_widths.is_empty() {
            return Err(Error::InvalidParameter("at least one window width is required".into()));
        }
        if self.window_widths.contains(&0) {
            return Err(Error::InvalidParameter("window widths must be positive".into()));
        }
        let widths = self.window_widths.len();
        if self.dimensions == 0 || self.dimensions % widths != 0 {
            return Err(Error::InvalidParameter(format!(
                "{} dimensions cannot be split evenly across {widths} window widths",
                self.dimensions
            )));
        }
        let per_width = self.dimensions / widths;
        let hashers = (0..self.dimensions)
            .map(|dimension| RollingHash::for_dimension(dimension, self.window_widths[dimension / per_width]))
            .collect();
        Ok((
            capabilities,
            Sketcher {
                hashers,
                window_widths: self.window_widths.clone(),
            },
        ))
    }

    /// Builds a byte-indexed engine.
    pub fn build(self) -> Result<Fingerprints> {
        let (capabilities, sketcher) = self.sketcher()?;
        Ok(Fingerprints { capabilities, sketcher })
    }

    /// Builds a codepoint-indexed engine.
    pub fn build_utf8(self) -> Result<FingerprintsUtf8> {
        let (capabilities, sketcher) = self.sketcher()?;
        Ok(FingerprintsUtf8 { capabilities, sketcher })
    }
}

impl Default for FingerprintsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprints byte strings, hashing windows of raw octets.
#[derive(Debug, Clone)]
pub struct Fingerprints {
    capabilities: CapabilitySet,
    sketcher: Sketcher,
}

impl Fingerprints {
    pub fn builder() -> FingerprintsBuilder {
        FingerprintsBuilder::new()
    }

    pub fn dimensions(&self) -> usize {
        self.sketcher.hashers.len()
    }

    pub fn window_widths(&self) -> &[usize] {
        &self.sketcher.window_widths
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn supports(&self, backend: Backend) -> bool {
        self.capabilities.contains(backend)
    }

    /// One fingerprint per input string, in input order.
    /// Pass `&DeviceScope::default()` to run serially on the calling thread.
    pub fn compute<T, S>(&self, device: &DeviceScope, strings: T) -> Result<Vec<Fingerprint>>
    where
        T: AsRef<[S]>,
        S: AsRef<[u8]> + Sync,
    {
        let strategy = resolve(self.capabilities, device)?;
        let sketcher = &self.sketcher;
        dispatch::each::<[u8], S, _, _>(&strategy, strings.as_ref(), |text: &[u8]| sketcher.sketch(text))
    }
}

/// Fingerprints UTF-8 strings, hashing windows of codepoints.
#[derive(Debug, Clone)]
pub struct FingerprintsUtf8 {
    capabilities: CapabilitySet,
    sketcher: Sketcher,
}

impl FingerprintsUtf8 {
    pub fn dimensions(&self) -> usize {
        self.sketcher.hashers.len()
    }

    pub fn window_widths(&self) -> &[usize] {
        &self.sketcher.window_widths
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn supports(&self, backend: Backend) -> bool {
        self.capabilities.contains(backend)
    }

    /// One codepoint-level fingerprint per input string, in input order.
    /// Serial execution needs no configuration:
    ///
    /// ```rust
    /// # use stringzillas::{DeviceScope, FingerprintsBuilder};
    /// let engine = FingerprintsBuilder::new().build_utf8().unwrap();
    /// let fingerprints = engine.compute(&DeviceScope::default(), &["naïve", "naive"]).unwrap();
    /// assert_ne!(fingerprints[0], fingerprints[1]);
    /// ```
    pub fn compute<T, S>(&self, device: &DeviceScope, strings: T) -> Result<Vec<Fingerprint>>
    where
        T: AsRef<[S]>,
        S: AsRef<str> + Sync,
    {
        let strategy = resolve(self.capabilities, device)?;
        let sketcher = &self.sketcher;
        dispatch::each::<str, S, _, _>(&strategy, strings.as_ref(), |text: &str| {
            // ASCII bytes and their codepoints hash identically.
            if text.is_ascii() {
                sketcher.sketch(text.as_bytes())
            } else {
                sketcher.sketch(&codepoints(text))
            }
        })
    }
}
