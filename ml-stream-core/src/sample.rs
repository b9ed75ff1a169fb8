//! Samples, records and batches flowing through the engine
//!
//! A [`Sample`] is whatever the transport delivered: either a single
//! [`Record`] or an arbitrarily nested group of samples. The engine flattens
//! buffered samples into a [`Batch`] of leaf records before dispatch.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to a single record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Originating context (camera id, file name, topic, ...)
    pub context: Option<String>,

    /// Processing pool assigned by an allocation capability
    pub pool: Option<usize>,

    /// Free-form attributes
    pub attributes: BTreeMap<String, String>,
}

impl Metadata {
    /// Metadata carrying only an originating context
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            ..Self::default()
        }
    }
}

/// A leaf sample: opaque payload plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// The payload handed to workers
    pub payload: T,

    /// Metadata describing the payload
    pub metadata: Metadata,
}

impl<T> Record<T> {
    /// Create a record with empty metadata
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            metadata: Metadata::default(),
        }
    }

    /// Create a record with the given metadata
    pub fn with_metadata(payload: T, metadata: Metadata) -> Self {
        Self { payload, metadata }
    }
}

/// One unit of input, possibly nested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sample<T> {
    /// A single leaf record
    Record(Record<T>),

    /// A group of sub-samples, kept in order
    Nested(Children<T>),
}

/// Ordered sub-samples of a [`Sample::Nested`].
///
/// Dropping releases nested levels from a heap stack, so arbitrarily deep
/// samples can be discarded without flattening them first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Children<T>(Vec<Sample<T>>);

impl<T> Children<T> {
    /// Take the sub-samples out, leaving nothing to drop here
    pub fn into_vec(mut self) -> Vec<Sample<T>> {
        std::mem::take(&mut self.0)
    }
}

impl<T> Deref for Children<T> {
    type Target = Vec<Sample<T>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Children<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<Vec<Sample<T>>> for Children<T> {
    fn from(children: Vec<Sample<T>>) -> Self {
        Self(children)
    }
}

impl<T> Drop for Children<T> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.0);
        while let Some(sample) = pending.pop() {
            if let Sample::Nested(mut children) = sample {
                pending.append(&mut children.0);
            }
        }
    }
}

impl<T> Sample<T> {
    /// A leaf sample with empty metadata
    pub fn record(payload: T) -> Self {
        Self::Record(Record::new(payload))
    }

    /// A leaf sample tagged with its originating context
    pub fn with_context(payload: T, context: impl Into<String>) -> Self {
        Self::Record(Record::with_metadata(payload, Metadata::with_context(context)))
    }

    /// A nested group of samples
    pub fn nested(children: Vec<Sample<T>>) -> Self {
        Self::Nested(Children(children))
    }

    /// Number of leaf records contained in this sample
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];

        while let Some(sample) = stack.pop() {
            match sample {
                Sample::Record(_) => count += 1,
                Sample::Nested(children) => stack.extend(children.iter()),
            }
        }

        count
    }

    /// Whether this sample holds no leaf record at all
    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// Visit every leaf record, left to right
    pub fn for_each_record_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Record<T>),
    {
        let mut stack: Vec<std::slice::IterMut<'_, Sample<T>>> = Vec::new();

        match self {
            Sample::Record(record) => {
                f(record);
                return;
            }
            Sample::Nested(children) => stack.push(children.iter_mut()),
        }

        while let Some(top) = stack.last_mut() {
            match top.next() {
                Some(Sample::Record(record)) => f(record),
                Some(Sample::Nested(children)) => stack.push(children.iter_mut()),
                None => {
                    stack.pop();
                }
            }
        }
    }
}

impl<T> From<Record<T>> for Sample<T> {
    fn from(record: Record<T>) -> Self {
        Self::Record(record)
    }
}

impl<T> From<Vec<Sample<T>>> for Sample<T> {
    fn from(children: Vec<Sample<T>>) -> Self {
        Self::Nested(Children(children))
    }
}

/// A flattened, ordered group of records handed to workers together
#[derive(Debug, Clone)]
pub struct Batch<T> {
    id: Uuid,
    sequence: u64,
    oldest_admission: Instant,
    records: Vec<Record<T>>,
}

impl<T> Batch<T> {
    /// Create a batch from already-flattened records
    pub fn new(sequence: u64, oldest_admission: Instant, records: Vec<Record<T>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            oldest_admission,
            records,
        }
    }

    /// Unique batch identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Position of this batch in the engine's dispatch order
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the oldest sample of this batch was admitted
    pub fn oldest_admission(&self) -> Instant {
        self.oldest_admission
    }

    /// The records, in admission order
    pub fn records(&self) -> &[Record<T>] {
        &self.records
    }

    /// Iterate over the payloads, in admission order
    pub fn payloads(&self) -> impl Iterator<Item = &T> {
        self.records.iter().map(|r| &r.payload)
    }

    /// Number of records in the batch
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no record
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take ownership of the records
    pub fn into_records(self) -> Vec<Record<T>> {
        self.records
    }
}
