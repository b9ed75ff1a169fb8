//! Flattening of nested samples into leaf records

use crate::sample::{Record, Sample};

/// Flatten arbitrarily nested samples into one ordered sequence of records.
///
/// Leaves keep their left-to-right order and their total count. The descent
/// uses an explicit stack of iterators, so nesting depth is bounded by heap
/// memory rather than by the thread stack.
pub fn flatten<T>(samples: Vec<Sample<T>>) -> Vec<Record<T>> {
    let mut records = Vec::with_capacity(samples.len());
    let mut stack = vec![samples.into_iter()];

    while let Some(top) = stack.last_mut() {
        match top.next() {
            Some(Sample::Record(record)) => records.push(record),
            Some(Sample::Nested(children)) => stack.push(children.into_vec().into_iter()),
            None => {
                stack.pop();
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn payloads(records: Vec<Record<u32>>) -> Vec<u32> {
        records.into_iter().map(|r| r.payload).collect()
    }

    fn arb_sample() -> impl Strategy<Value = Sample<u32>> {
        let leaf = any::<u32>().prop_map(Sample::record);
        leaf.prop_recursive(6, 64, 5, |inner| {
            prop::collection::vec(inner, 0..5).prop_map(Sample::nested)
        })
    }

    #[test]
    fn test_flatten_empty() {
        assert!(flatten::<u32>(Vec::new()).is_empty());
        assert!(flatten::<u32>(vec![Sample::nested(vec![]), Sample::nested(vec![])]).is_empty());
    }

    #[test]
    fn test_flatten_nested_preserves_order() {
        let samples = vec![
            Sample::nested(vec![Sample::record(1), Sample::nested(vec![Sample::record(2)])]),
            Sample::record(3),
            Sample::nested(vec![Sample::nested(vec![Sample::nested(vec![Sample::record(4)])])]),
            Sample::record(5),
        ];

        assert_eq!(payloads(flatten(samples)), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_flatten_deep_nesting() {
        let mut sample = Sample::record(42u32);
        for _ in 0..100_000 {
            sample = Sample::nested(vec![sample]);
        }

        let records = flatten(vec![sample]);
        assert_eq!(payloads(records), vec![42]);
    }

    proptest! {
        #[test]
        fn prop_flat_input_is_unchanged(values in prop::collection::vec(any::<u32>(), 0..64)) {
            let samples = values.iter().copied().map(Sample::record).collect();
            prop_assert_eq!(payloads(flatten(samples)), values);
        }

        #[test]
        fn prop_flatten_preserves_leaf_count(samples in prop::collection::vec(arb_sample(), 0..8)) {
            let expected: usize = samples.iter().map(Sample::leaf_count).sum();
            prop_assert_eq!(flatten(samples).len(), expected);
        }

        #[test]
        fn prop_flatten_is_associative_over_grouping(
            left in prop::collection::vec(arb_sample(), 0..6),
            right in prop::collection::vec(arb_sample(), 0..6),
        ) {
            let mut concatenated = left.clone();
            concatenated.extend(right.clone());

            let grouped = vec![Sample::nested(left.clone()), Sample::nested(right.clone())];

            let mut separately = payloads(flatten(left));
            separately.extend(payloads(flatten(right)));

            prop_assert_eq!(payloads(flatten(concatenated)), separately.clone());
            prop_assert_eq!(payloads(flatten(grouped)), separately);
        }
    }
}
