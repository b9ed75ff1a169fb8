//! Optional extensions attached to an engine
//!
//! A capability is identified by its [`CapabilityKind`]. The registry is
//! filled at construction time and only read afterwards.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sample::Sample;

/// Kind tag used to look capabilities up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Transforms samples before admission
    Preprocess,

    /// Assigns samples to processing pools
    Allocation,

    /// Network-facing control over the operational mode
    OperationalMode,

    /// Filters or post-processes results
    PostFilter,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Allocation => "allocation",
            Self::OperationalMode => "operational_mode",
            Self::PostFilter => "post_filter",
        };
        f.write_str(name)
    }
}

/// Operational mode toggled from outside the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalMode {
    /// Normal operation
    #[default]
    Active,

    /// Incoming samples are dropped before admission
    Paused,

    /// Running with reduced functionality, with a reason
    Degraded(String),
}

/// A pluggable extension
pub trait Capability<T>: Send + Sync {
    /// Kind tag of this capability
    fn kind(&self) -> CapabilityKind;

    /// Human-readable name
    fn name(&self) -> &str {
        "capability"
    }

    /// Ingestion hook: transform a sample, or return `None` to drop it
    fn preprocess(&self, sample: Sample<T>) -> Option<Sample<T>> {
        Some(sample)
    }

    /// Control hook: react to an operational mode change
    fn update_operational_mode(&self, _mode: &OperationalMode) {}
}

/// Fixed set of capabilities attached to an engine
pub struct CapabilityRegistry<T> {
    capabilities: Vec<Box<dyn Capability<T>>>,
}

impl<T> CapabilityRegistry<T> {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            capabilities: Vec::new(),
        }
    }

    /// Add a capability
    pub fn register(&mut self, capability: impl Capability<T> + 'static) {
        self.capabilities.push(Box::new(capability));
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, capability: impl Capability<T> + 'static) -> Self {
        self.register(capability);
        self
    }

    /// First capability of the given kind; absence is a normal outcome
    pub fn lookup(&self, kind: CapabilityKind) -> Option<&dyn Capability<T>> {
        self.capabilities
            .iter()
            .find(|c| c.kind() == kind)
            .map(|c| &**c)
    }

    /// Kinds of all registered capabilities, in registration order
    pub fn kinds(&self) -> Vec<CapabilityKind> {
        self.capabilities.iter().map(|c| c.kind()).collect()
    }

    /// Iterate over the capabilities in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Capability<T>> {
        self.capabilities.iter().map(|c| &**c)
    }

    /// Number of registered capabilities
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether no capability is registered
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Run every preprocessing hook in registration order.
    ///
    /// Stops at the first capability that drops the sample.
    pub fn preprocess(&self, sample: Sample<T>) -> Option<Sample<T>> {
        self.capabilities
            .iter()
            .try_fold(sample, |sample, capability| capability.preprocess(sample))
    }

    /// Forward an operational mode change to every capability
    pub fn update_operational_mode(&self, mode: &OperationalMode) {
        for capability in &self.capabilities {
            capability.update_operational_mode(mode);
        }
    }
}

impl<T> Default for CapabilityRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Control capability holding the current operational mode.
///
/// While paused, samples are dropped at ingestion.
pub struct ModeSwitch {
    mode: RwLock<OperationalMode>,
}

impl ModeSwitch {
    /// A switch starting in `mode`
    pub fn new(mode: OperationalMode) -> Self {
        Self {
            mode: RwLock::new(mode),
        }
    }

    /// Current operational mode
    pub fn mode(&self) -> OperationalMode {
        self.mode
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Default for ModeSwitch {
    fn default() -> Self {
        Self::new(OperationalMode::Active)
    }
}

impl<T> Capability<T> for ModeSwitch {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::OperationalMode
    }

    fn name(&self) -> &str {
        "mode-switch"
    }

    fn preprocess(&self, sample: Sample<T>) -> Option<Sample<T>> {
        match self.mode() {
            OperationalMode::Paused => None,
            _ => Some(sample),
        }
    }

    fn update_operational_mode(&self, mode: &OperationalMode) {
        info!(?mode, "Operational mode updated");
        *self
            .mode
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = mode.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl Capability<u32> for Doubler {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::Preprocess
        }

        fn name(&self) -> &str {
            "doubler"
        }

        fn preprocess(&self, mut sample: Sample<u32>) -> Option<Sample<u32>> {
            sample.for_each_record_mut(|r| r.payload *= 2);
            Some(sample)
        }
    }

    struct DropOdd;

    impl Capability<u32> for DropOdd {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::PostFilter
        }

        fn preprocess(&self, sample: Sample<u32>) -> Option<Sample<u32>> {
            let odd = matches!(&sample, Sample::Record(r) if r.payload % 2 == 1);
            (!odd).then_some(sample)
        }
    }

    #[test]
    fn test_lookup_returns_first_match() {
        let registry = CapabilityRegistry::new()
            .with(Doubler)
            .with(DropOdd)
            .with(ModeSwitch::default());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup(CapabilityKind::Preprocess).unwrap().name(), "doubler");
        assert_eq!(
            registry.kinds(),
            vec![
                CapabilityKind::Preprocess,
                CapabilityKind::PostFilter,
                CapabilityKind::OperationalMode
            ]
        );
    }

    #[test]
    fn test_lookup_absent_kind() {
        let registry = CapabilityRegistry::<u32>::new().with(Doubler);
        assert!(registry.lookup(CapabilityKind::Allocation).is_none());
        assert!(CapabilityRegistry::<u32>::new().lookup(CapabilityKind::Preprocess).is_none());
    }

    #[test]
    fn test_preprocess_chain_in_order() {
        // Doubling first means nothing is odd by the time DropOdd runs.
        let registry = CapabilityRegistry::new().with(Doubler).with(DropOdd);
        assert_eq!(registry.preprocess(Sample::record(3)), Some(Sample::record(6)));

        let registry = CapabilityRegistry::new().with(DropOdd).with(Doubler);
        assert_eq!(registry.preprocess(Sample::record(3)), None);
    }

    #[test]
    fn test_mode_switch_pauses_ingestion() {
        let registry = CapabilityRegistry::<u32>::new().with(ModeSwitch::default());
        assert!(registry.preprocess(Sample::record(1)).is_some());

        registry.update_operational_mode(&OperationalMode::Paused);
        assert!(registry.preprocess(Sample::record(1)).is_none());

        registry.update_operational_mode(&OperationalMode::Degraded("gpu lost".into()));
        assert!(registry.preprocess(Sample::record(1)).is_some());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(CapabilityKind::OperationalMode.to_string(), "operational_mode");
    }
}
