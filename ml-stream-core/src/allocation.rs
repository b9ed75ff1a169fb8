//! Origin-based pool allocation
//!
//! Each record is labelled `"real"` when its context names one of the known
//! real-world locations and `"sim"` otherwise, and the label is mapped to a
//! processing pool through a lookup table.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::{Capability, CapabilityKind};
use crate::sample::{Record, Sample};

/// Label for records captured in one of the known locations
pub const REAL_ORIGIN: &str = "real";

/// Label for every other record
pub const SIM_ORIGIN: &str = "sim";

/// Locations whose recordings count as real-world data
pub const DEFAULT_REAL_LOCATIONS: [&str; 19] = [
    "aachen",
    "berlin",
    "bochum",
    "bremen",
    "cologne",
    "darmstadt",
    "dusseldorf",
    "erfurt",
    "hamburg",
    "hanover",
    "jena",
    "krefeld",
    "monchengladbach",
    "strasbourg",
    "stuttgart",
    "tubingen",
    "ulm",
    "weimar",
    "zurich",
];

/// Capability assigning every record to a processing pool by origin
#[derive(Debug, Clone)]
pub struct OriginAllocator {
    task_table: HashMap<String, usize>,
    default_origin: Option<String>,
    real_locations: Vec<String>,
}

impl OriginAllocator {
    /// Allocator mapping origin labels to pool indices
    pub fn new<I, S>(task_table: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            task_table: task_table.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            default_origin: None,
            real_locations: DEFAULT_REAL_LOCATIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Label every record with `origin` regardless of its context
    #[must_use]
    pub fn with_default_origin(mut self, origin: impl Into<String>) -> Self {
        self.default_origin = Some(origin.into());
        self
    }

    /// Replace the list of real-world locations
    #[must_use]
    pub fn with_real_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.real_locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Origin label of a record
    pub fn origin_of<T>(&self, record: &Record<T>) -> &str {
        if let Some(origin) = &self.default_origin {
            return origin;
        }

        let is_real = record.metadata.context.as_deref().is_some_and(|context| {
            self.real_locations
                .iter()
                .any(|location| context.contains(location.as_str()))
        });

        if is_real {
            REAL_ORIGIN
        } else {
            SIM_ORIGIN
        }
    }

    /// Pool index for a record, if its origin is in the table
    pub fn allocate<T>(&self, record: &Record<T>) -> Option<usize> {
        let origin = self.origin_of(record);
        let pool = self.task_table.get(origin).copied();
        if pool.is_none() {
            debug!(origin, "No pool registered for origin");
        }
        pool
    }
}

impl<T> Capability<T> for OriginAllocator {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Allocation
    }

    fn name(&self) -> &str {
        "origin-allocator"
    }

    fn preprocess(&self, mut sample: Sample<T>) -> Option<Sample<T>> {
        sample.for_each_record_mut(|record| {
            record.metadata.pool = self.allocate(record);
        });
        Some(sample)
    }
}
