//! Execution contexts: which backend a call runs on, and the resources it owns.

use core::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::capabilities::Backend;
use crate::error::{Error, Result};

/// Options a [`DeviceScope`] is configured from, as host bindings pass them.
///
/// At most one of `cpu_cores` and `gpu_device` may be set. `device_memory` caps the unified
/// memory a single accelerator call may stage and is only meaningful with `gpu_device`.
///
/// ```rust
/// use stringzillas::{ContextOptions, DeviceScope, Error};
/// let options = ContextOptions::from_json(r#"{"cpu_cores": 4}"#).unwrap();
/// assert_eq!(options.cpu_cores, Some(4));
///
/// let conflicting = ContextOptions::from_json(r#"{"cpu_cores": 4, "gpu_device": 0}"#).unwrap();
/// assert!(matches!(DeviceScope::new(conflicting), Err(Error::ConfigurationConflict(_))));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_device: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_memory: Option<usize>,
}

impl ContextOptions {
    pub fn with_cpu_cores(mut self, cpu_cores: usize) -> Self {
        self.cpu_cores = Some(cpu_cores);
        self
    }

    pub fn with_gpu_device(mut self, gpu_device: usize) -> Self {
        self.gpu_device = Some(gpu_device);
        self
    }

    pub fn with_device_memory(mut self, bytes: usize) -> Self {
        self.device_memory = Some(bytes);
        self
    }

    /// Reads options from a dynamically typed value.
    /// Values of the wrong kind and unknown keys fail with [`Error::TypeMismatch`].
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Parses options from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn validate(&self) -> Result<()> {
        if let (Some(cores), Some(device)) = (self.cpu_cores, self.gpu_device) {
            return Err(Error::ConfigurationConflict(format!(
                "`cpu_cores` ({cores}) and `gpu_device` ({device}) are mutually exclusive"
            )));
        }
        if self.device_memory.is_some() && self.gpu_device.is_none() {
            return Err(Error::ConfigurationConflict(
                "`device_memory` requires `gpu_device`".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) enum ScopeKind {
    Serial,
    /// An explicit single-core request. Runs serially but satisfies multi-core engines.
    SingleCore,
    #[cfg(feature = "cpus")]
    Pool {
        cores: usize,
        pool: crate::workers::WorkerPool,
    },
    #[cfg(feature = "accelerator")]
    Gpu(crate::accelerator::Device),
}

/// Manages the execution context and the backend resources it owns.
///
/// A scope is immutable once created. Worker threads and device handles are acquired
/// eagerly and released when the scope is dropped.
///
/// ```rust
/// use stringzillas::DeviceScope;
/// let device = DeviceScope::default();
/// assert_eq!(device.get_cpu_cores(), 1);
/// let cpu_device = DeviceScope::cpu_cores(4).unwrap();
/// assert!(!cpu_device.is_gpu());
/// ```
pub struct DeviceScope {
    kind: ScopeKind,
}

impl DeviceScope {
    /// Validates `options` and acquires the backend they select.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationConflict`] when exclusive options are combined
    /// - [`Error::BackendUnavailable`] when the selected backend is not compiled in or absent
    pub fn new(options: ContextOptions) -> Result<Self> {
        options.validate()?;
        match (options.cpu_cores, options.gpu_device) {
            (Some(cores), None) => Self::cpu_cores(cores),
            (None, Some(device)) => Self::open_device(device, options.device_memory),
            _ => Ok(Self::serial()),
        }
    }

    /// Restricts execution to the calling thread.
    pub fn serial() -> Self {
        Self::from_kind(ScopeKind::Serial)
    }

    /// Create a device scope for explicit CPU core count.
    ///
    /// # Parameters
    ///
    /// - `cpu_cores`: Number of CPU cores to use, or zero for all cores
    ///
    /// One core runs serially. More cores start a dedicated worker pool, which requires
    /// the `cpus` feature.
    pub fn cpu_cores(cpu_cores: usize) -> Result<Self> {
        let cores = match cpu_cores {
            0 => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        if cores == 1 {
            return Ok(Self::from_kind(ScopeKind::SingleCore));
        }
        Self::thread_pool(cores)
    }

    #[cfg(feature = "cpus")]
    fn thread_pool(cores: usize) -> Result<Self> {
        let builder = rayon::ThreadPoolBuilder::new()
            .num_threads(cores)
            .thread_name(|worker| format!("szs-cpu{worker}"));
        let pool = crate::workers::WorkerPool::build(builder)
            .map_err(|e| Error::BackendUnavailable(format!("failed to start {cores} worker threads: {e}")))?;
        Ok(Self::from_kind(ScopeKind::Pool { cores, pool }))
    }

    #[cfg(not(feature = "cpus"))]
    fn thread_pool(cores: usize) -> Result<Self> {
        Err(Error::BackendUnavailable(format!(
            "{cores} CPU cores requested, but the parallel backend is not compiled in"
        )))
    }

    /// Create a device scope for a specific accelerator device with the default memory budget.
    ///
    /// # Parameters
    ///
    /// - `gpu_device`: Device index (0-based)
    pub fn gpu_device(gpu_device: usize) -> Result<Self> {
        Self::open_device(gpu_device, None)
    }

    #[cfg(feature = "accelerator")]
    fn open_device(index: usize, memory: Option<usize>) -> Result<Self> {
        let memory = memory.unwrap_or(crate::accelerator::DEFAULT_DEVICE_MEMORY);
        let device = crate::accelerator::Device::open(index, memory)?;
        Ok(Self::from_kind(ScopeKind::Gpu(device)))
    }

    #[cfg(not(feature = "accelerator"))]
    fn open_device(index: usize, _memory: Option<usize>) -> Result<Self> {
        Err(Error::BackendUnavailable(format!(
            "accelerator device {index} requested, but no accelerator backend is compiled in"
        )))
    }

    fn from_kind(kind: ScopeKind) -> Self {
        let scope = Self { kind };
        debug!(
            backend = %scope.backend(),
            cores = scope.get_cpu_cores(),
            device = scope.get_gpu_device().ok(),
            "device scope created"
        );
        scope
    }

    pub(crate) fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    /// The backend this scope asks engines to run on.
    pub fn backend(&self) -> Backend {
        match self.kind {
            ScopeKind::Serial | ScopeKind::SingleCore => Backend::Serial,
            #[cfg(feature = "cpus")]
            ScopeKind::Pool { .. } => Backend::Parallel,
            #[cfg(feature = "accelerator")]
            ScopeKind::Gpu(_) => Backend::Accelerator,
        }
    }

    /// Number of CPU threads used for execution. Zero for accelerator scopes.
    pub fn get_cpu_cores(&self) -> usize {
        match &self.kind {
            ScopeKind::Serial | ScopeKind::SingleCore => 1,
            #[cfg(feature = "cpus")]
            ScopeKind::Pool { cores, .. } => *cores,
            #[cfg(feature = "accelerator")]
            ScopeKind::Gpu(_) => 0,
        }
    }

    /// Accelerator device index, if this scope targets one.
    pub fn get_gpu_device(&self) -> Result<usize> {
        match &self.kind {
            #[cfg(feature = "accelerator")]
            ScopeKind::Gpu(device) => Ok(device.index()),
            _ => Err(Error::BackendUnavailable("scope does not target an accelerator".into())),
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.get_gpu_device().is_ok()
    }
}

impl Default for DeviceScope {
    fn default() -> Self {
        Self::serial()
    }
}

impl Drop for DeviceScope {
    fn drop(&mut self) {
        trace!(backend = %self.backend(), "releasing device scope");
    }
}

impl fmt::Debug for DeviceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DeviceScope");
        debug.field("backend", &self.backend()).field("cpu_cores", &self.get_cpu_cores());
        #[cfg(feature = "accelerator")]
        if let ScopeKind::Gpu(device) = &self.kind {
            debug.field("device", device);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_scope_is_serial() {
        let device = DeviceScope::default();
        assert_eq!(device.backend(), Backend::Serial);
        assert_eq!(device.get_cpu_cores(), 1);
        assert!(!device.is_gpu());
        assert!(DeviceScope::new(ContextOptions::default()).is_ok());
    }

    #[test]
    fn single_core_resolves_to_serial() {
        let device = DeviceScope::cpu_cores(1).unwrap();
        assert_eq!(device.backend(), Backend::Serial);
        assert!(matches!(device.kind(), ScopeKind::SingleCore));
    }

    #[cfg(feature = "cpus")]
    #[test]
    fn thread_pool_scope() {
        let device = DeviceScope::cpu_cores(3).unwrap();
        assert_eq!(device.backend(), Backend::Parallel);
        assert_eq!(device.get_cpu_cores(), 3);
        let all = DeviceScope::cpu_cores(0).unwrap();
        assert!(all.get_cpu_cores() >= 1);
    }

    #[test]
    fn exclusive_options_conflict() {
        let options = ContextOptions::default().with_cpu_cores(2).with_gpu_device(0);
        assert!(matches!(DeviceScope::new(options), Err(Error::ConfigurationConflict(_))));
        let options = ContextOptions::default().with_cpu_cores(2).with_device_memory(1024);
        assert!(matches!(DeviceScope::new(options), Err(Error::ConfigurationConflict(_))));
    }

    #[test]
    fn options_of_the_wrong_kind() {
        for value in [
            json!({"cpu_cores": "4"}),
            json!({"cpu_cores": 2.5}),
            json!({"cpu_cores": -1}),
            json!({"gpu_device": "0"}),
            json!({"gpu_device": [0]}),
            json!({"threads": 4}),
            json!("cpu_cores"),
        ] {
            assert!(
                matches!(ContextOptions::from_value(&value), Err(Error::TypeMismatch(_))),
                "{value} should be rejected"
            );
        }
        assert!(matches!(ContextOptions::from_json("{cpu_cores: 4"), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn options_parse_from_json() {
        let options = ContextOptions::from_value(&json!({"gpu_device": 0, "device_memory": 4096})).unwrap();
        assert_eq!(options, ContextOptions::default().with_gpu_device(0).with_device_memory(4096));
        assert_eq!(serde_json::to_string(&ContextOptions::default().with_cpu_cores(8)).unwrap(), r#"{"cpu_cores":8}"#);
        assert_eq!(ContextOptions::from_json(r#"{"cpu_cores": null}"#).unwrap(), ContextOptions::default());
    }

    #[cfg(feature = "accelerator")]
    #[test]
    fn accelerator_scope() {
        let device = DeviceScope::gpu_device(0).unwrap();
        assert!(device.is_gpu());
        assert_eq!(device.get_gpu_device(), Ok(0));
        assert_eq!(device.backend(), Backend::Accelerator);
        assert!(matches!(
            DeviceScope::gpu_device(crate::accelerator::ACCELERATOR_DEVICES),
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[cfg(not(feature = "accelerator"))]
    #[test]
    fn accelerator_is_unavailable() {
        assert!(matches!(DeviceScope::gpu_device(0), Err(Error::BackendUnavailable(_))));
    }

    #[cfg(feature = "cpus")]
    #[test]
    fn dropping_a_scope_stops_its_workers() {
        use std::cell::RefCell;
        use std::sync::Arc;

        thread_local! {
            static HELD: RefCell<Option<Arc<()>>> = const { RefCell::new(None) };
        }

        for _ in 0..10 {
            let token = Arc::new(());
            let device = DeviceScope::cpu_cores(4).unwrap();
            let ScopeKind::Pool { pool, .. } = device.kind() else {
                panic!("expected a worker pool");
            };
            pool.broadcast(|_| HELD.with(|held| *held.borrow_mut() = Some(Arc::clone(&token))));
            assert_eq!(Arc::strong_count(&token), 5);
            drop(device);
            assert_eq!(Arc::strong_count(&token), 1);
        }
    }

    #[test]
    fn scopes_can_be_recreated_in_a_loop() {
        for cores in [1, 2, 1, 2] {
            let options = ContextOptions::default().with_cpu_cores(cores);
            match DeviceScope::new(options) {
                Ok(device) => assert_eq!(device.get_cpu_cores(), cores),
                Err(error) => assert!(matches!(error, Error::BackendUnavailable(_))),
            }
        }
    }
}
