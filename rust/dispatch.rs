//! Routes a batch to exactly one backend and assembles results in input order.

#[cfg(feature = "cpus")]
use rayon::prelude::*;
use tracing::debug;

use crate::batch::Text;
use crate::capabilities::{Backend, CapabilitySet};
use crate::device::{DeviceScope, ScopeKind};
use crate::error::{Error, Result};

/// The backend chosen for one call. Fixed for the whole batch.
pub(crate) enum Strategy<'d> {
    Serial,
    #[cfg(feature = "cpus")]
    Parallel(&'d rayon::ThreadPool),
    #[cfg(feature = "accelerator")]
    Accelerator(&'d crate::accelerator::Device),
    #[cfg(not(feature = "cpus"))]
    #[doc(hidden)]
    #[allow(dead_code)]
    Borrowed(core::marker::PhantomData<&'d ()>),
}

impl Strategy<'_> {
    pub(crate) fn backend(&self) -> Backend {
        match self {
            #[cfg(feature = "cpus")]
            Strategy::Parallel(_) => Backend::Parallel,
            #[cfg(feature = "accelerator")]
            Strategy::Accelerator(_) => Backend::Accelerator,
            _ => Backend::Serial,
        }
    }
}

fn unavailable(requested: Backend, engine: CapabilitySet) -> Error {
    Error::BackendUnavailable(format!(
        "scope requests the {requested} backend, but the engine supports only: {engine}"
    ))
}

/// Picks the backend satisfying both the engine's capabilities and the scope's request.
pub(crate) fn resolve(engine: CapabilitySet, device: &DeviceScope) -> Result<Strategy<'_>> {
    let strategy = match device.kind() {
        ScopeKind::Serial if engine.contains(Backend::Serial) => Strategy::Serial,
        ScopeKind::SingleCore if engine.contains(Backend::Serial) || engine.contains(Backend::Parallel) => {
            Strategy::Serial
        }
        #[cfg(feature = "cpus")]
        ScopeKind::Pool { pool, .. } if engine.contains(Backend::Parallel) => Strategy::Parallel(&**pool),
        #[cfg(feature = "accelerator")]
        ScopeKind::Gpu(accelerator) if engine.contains(Backend::Accelerator) => Strategy::Accelerator(accelerator),
        _ => {
            let requested = match device.kind() {
                ScopeKind::SingleCore => Backend::Parallel,
                _ => device.backend(),
            };
            return Err(unavailable(requested, engine));
        }
    };
    debug!(requested = %device.backend(), resolved = %strategy.backend(), "execution strategy resolved");
    Ok(strategy)
}

/// Applies `kernel` to every pair `(a[i], b[i])`.
pub(crate) fn pairwise<T, S, R, F>(strategy: &Strategy<'_>, a: &[S], b: &[S], kernel: F) -> Result<Vec<R>>
where
    T: Text + ?Sized,
    S: AsRef<T> + Sync,
    R: Clone + Default + Send,
    F: Fn(&T, &T) -> R + Sync + Send,
{
    match strategy {
        #[cfg(feature = "cpus")]
        Strategy::Parallel(pool) => Ok(pool.install(|| {
            a.par_iter()
                .zip(b.par_iter())
                .map(|(x, y)| kernel(x.as_ref(), y.as_ref()))
                .collect()
        })),
        #[cfg(feature = "accelerator")]
        Strategy::Accelerator(device) => device.pairwise::<T, S, R, F>(a, b, kernel),
        _ => Ok(a
            .iter()
            .zip(b)
            .map(|(x, y)| kernel(x.as_ref(), y.as_ref()))
            .collect()),
    }
}

/// Applies `kernel` to every string of the batch.
pub(crate) fn each<T, S, R, F>(strategy: &Strategy<'_>, batch: &[S], kernel: F) -> Result<Vec<R>>
where
    T: Text + ?Sized,
    S: AsRef<T> + Sync,
    R: Clone + Default + Send,
    F: Fn(&T) -> R + Sync + Send,
{
    match strategy {
        #[cfg(feature = "cpus")]
        Strategy::Parallel(pool) => Ok(pool.install(|| batch.par_iter().map(|s| kernel(s.as_ref())).collect())),
        #[cfg(feature = "accelerator")]
        Strategy::Accelerator(device) => device.each::<T, S, R, F>(batch, kernel),
        _ => Ok(batch.iter().map(|s| kernel(s.as_ref())).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(strategy: &Strategy<'_>) -> Vec<usize> {
        let a = ["a", "bb", "", "dddd"];
        let b = ["", "x", "yyy", "z"];
        pairwise::<[u8], _, _, _>(strategy, &a, &b, |x: &[u8], y: &[u8]| x.len() + 10 * y.len()).unwrap()
    }

    #[test]
    fn serial_scope_needs_serial_engines() {
        let device = DeviceScope::default();
        assert!(matches!(resolve(CapabilitySet::SERIAL, &device), Ok(Strategy::Serial)));
        let parallel_only = CapabilitySet::EMPTY.with(Backend::Parallel);
        assert!(matches!(resolve(parallel_only, &device), Err(Error::BackendUnavailable(_))));
    }

    #[test]
    fn single_core_satisfies_parallel_engines() {
        let device = DeviceScope::cpu_cores(1).unwrap();
        let parallel_only = CapabilitySet::EMPTY.with(Backend::Parallel);
        assert!(matches!(resolve(parallel_only, &device), Ok(Strategy::Serial)));
        let accelerator_only = CapabilitySet::EMPTY.with(Backend::Accelerator);
        assert!(matches!(resolve(accelerator_only, &device), Err(Error::BackendUnavailable(_))));
    }

    #[test]
    fn serial_fan_out_keeps_order() {
        assert_eq!(lengths(&Strategy::Serial), vec![1, 12, 30, 14]);
        let counts = each::<str, _, _, _>(&Strategy::Serial, &["αβγ", "", "ab"], |s: &str| s.chars().count()).unwrap();
        assert_eq!(counts, vec![3, 0, 2]);
    }

    #[cfg(feature = "cpus")]
    #[test]
    fn parallel_fan_out_keeps_order() {
        let device = DeviceScope::cpu_cores(4).unwrap();
        let strategy = resolve(CapabilitySet::compiled(), &device).unwrap();
        assert_eq!(strategy.backend(), Backend::Parallel);
        assert_eq!(lengths(&strategy), vec![1, 12, 30, 14]);
        assert!(matches!(resolve(CapabilitySet::SERIAL, &device), Err(Error::BackendUnavailable(_))));
    }

    #[cfg(feature = "accelerator")]
    #[test]
    fn accelerator_fan_out_keeps_order() {
        let device = DeviceScope::gpu_device(0).unwrap();
        let strategy = resolve(CapabilitySet::compiled(), &device).unwrap();
        assert_eq!(strategy.backend(), Backend::Accelerator);
        assert_eq!(lengths(&strategy), vec![1, 12, 30, 14]);
        let serial_and_parallel = CapabilitySet::SERIAL.with(Backend::Parallel);
        assert!(matches!(resolve(serial_and_parallel, &device), Err(Error::BackendUnavailable(_))));
    }
}
