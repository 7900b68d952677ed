//! Backend kinds and the ordered capability sets engines declare.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A closed set of execution backends.
///
/// The declaration order doubles as the iteration order of a [`CapabilitySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Sequential execution on the calling thread.
    Serial,
    /// Independent pairs spread across a bounded worker pool.
    Parallel,
    /// Offload to an accelerator device with unified-memory staging.
    Accelerator,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Serial, Backend::Parallel, Backend::Accelerator];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Serial => "serial",
            Backend::Parallel => "parallel",
            Backend::Accelerator => "accelerator",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Backend::Serial => 1,
            Backend::Parallel => 2,
            Backend::Accelerator => 4,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "serial" => Ok(Backend::Serial),
            "parallel" => Ok(Backend::Parallel),
            "accelerator" => Ok(Backend::Accelerator),
            other => Err(Error::TypeMismatch(format!(
                "unknown backend `{other}`, expected one of: serial, parallel, accelerator"
            ))),
        }
    }
}

/// An ordered set of backends, drawn from {serial, parallel, accelerator}.
///
/// ```rust
/// use stringzillas::{Backend, CapabilitySet};
/// let caps: CapabilitySet = [Backend::Parallel, Backend::Serial].into_iter().collect();
/// assert_eq!(caps.to_string(), "serial, parallel");
/// assert!(!caps.contains(Backend::Accelerator));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<Backend>", from = "Vec<Backend>")]
pub struct CapabilitySet {
    bits: u8,
}

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet { bits: 0 };
    pub const SERIAL: CapabilitySet = CapabilitySet { bits: 1 };

    /// Backends compiled into this build. Always includes [`Backend::Serial`].
    pub fn compiled() -> Self {
        let mut caps = Self::SERIAL;
        if cfg!(feature = "cpus") {
            caps = caps.with(Backend::Parallel);
        }
        if cfg!(feature = "accelerator") {
            caps = caps.with(Backend::Accelerator);
        }
        caps
    }

    pub const fn with(self, backend: Backend) -> Self {
        Self {
            bits: self.bits | backend.bit(),
        }
    }

    pub const fn without(self, backend: Backend) -> Self {
        Self {
            bits: self.bits & !backend.bit(),
        }
    }

    pub const fn contains(self, backend: Backend) -> bool {
        self.bits & backend.bit() != 0
    }

    pub const fn intersection(self, other: CapabilitySet) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub const fn is_subset(self, other: CapabilitySet) -> bool {
        self.bits & !other.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Backend> {
        Backend::ALL.into_iter().filter(move |backend| self.contains(*backend))
    }

    /// Parses a list of backend names, as host bindings pass them.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<Backend>())
            .collect()
    }

    /// Checks that an engine may be built with these capabilities in the current build.
    pub(crate) fn validate_for_engine(self) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::InvalidParameter(
                "an engine must declare at least one backend".into(),
            ));
        }
        let compiled = Self::compiled();
        if !self.is_subset(compiled) {
            let missing: Vec<_> = self.iter().filter(|b| !compiled.contains(*b)).collect();
            return Err(Error::BackendUnavailable(format!(
                "{} not compiled into this build (available: {compiled})",
                missing.iter().map(|b| b.name()).collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(self)
    }
}

impl FromIterator<Backend> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Backend>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, CapabilitySet::with)
    }
}

impl<'a> FromIterator<&'a Backend> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = &'a Backend>>(iter: I) -> Self {
        iter.into_iter().copied().collect()
    }
}

impl From<Vec<Backend>> for CapabilitySet {
    fn from(backends: Vec<Backend>) -> Self {
        backends.into_iter().collect()
    }
}

impl From<CapabilitySet> for Vec<Backend> {
    fn from(caps: CapabilitySet) -> Self {
        caps.iter().collect()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, backend) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(backend.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_always_has_serial() {
        let caps = CapabilitySet::compiled();
        assert!(caps.contains(Backend::Serial));
        assert_eq!(caps.contains(Backend::Parallel), cfg!(feature = "cpus"));
        assert_eq!(caps.contains(Backend::Accelerator), cfg!(feature = "accelerator"));
    }

    #[test]
    fn iteration_is_ordered() {
        let caps: CapabilitySet = [Backend::Accelerator, Backend::Serial].into_iter().collect();
        let order: Vec<_> = caps.iter().collect();
        assert_eq!(order, vec![Backend::Serial, Backend::Accelerator]);
        assert_eq!(caps.without(Backend::Accelerator), CapabilitySet::SERIAL);
    }

    #[test]
    fn names_round_trip_through_serde() {
        let caps = CapabilitySet::SERIAL.with(Backend::Parallel);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["serial","parallel"]"#);
        let parsed: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, caps);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(CapabilitySet::from_names(["serial"]).unwrap(), CapabilitySet::SERIAL);
        assert!(matches!(
            CapabilitySet::from_names(["serial", "quantum"]),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn engine_validation() {
        assert!(matches!(
            CapabilitySet::EMPTY.validate_for_engine(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(CapabilitySet::compiled().validate_for_engine().is_ok());
        if !cfg!(feature = "accelerator") {
            let caps = CapabilitySet::SERIAL.with(Backend::Accelerator);
            assert!(matches!(caps.validate_for_engine(), Err(Error::BackendUnavailable(_))));
        }
    }
}
