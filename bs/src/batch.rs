//! Ordered batch partitioning and in-batch deduplication

use std::collections::HashSet;
use std::num::NonZeroUsize;

use crate::record::{MappedRecord, RecordKey};

/// A mapped record paired with its conflict-key value
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub key: RecordKey,
    pub record: MappedRecord,
}

/// Split `items` into consecutive batches of at most `batch_size`.
///
/// Yields `ceil(N / batch_size)` batches; concatenating them in order gives
/// back the input.
pub fn partition<T>(items: Vec<T>, batch_size: NonZeroUsize) -> Vec<Vec<T>> {
    let size = batch_size.get();
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}

/// Drop earlier records that share a key with a later one in the same batch.
///
/// The survivors keep the relative order of their last occurrence. Returns
/// the surviving records and how many were dropped.
pub fn dedupe_last_wins(batch: Vec<KeyedRecord>) -> (Vec<MappedRecord>, usize) {
    let total = batch.len();
    let mut seen = HashSet::with_capacity(total);
    let mut kept: Vec<MappedRecord> = batch
        .into_iter()
        .rev()
        .filter_map(|keyed| seen.insert(keyed.key).then_some(keyed.record))
        .collect();
    kept.reverse();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ConflictKey;
    use crate::value::Value;
    use proptest::prelude::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn keyed(id: &str, price: i64) -> KeyedRecord {
        let record: MappedRecord = [("card_id", Value::from(id)), ("price", Value::from(price))]
            .into_iter()
            .collect();
        let key = ConflictKey::new(["card_id"]).unwrap().key_of(&record).unwrap();
        KeyedRecord { key, record }
    }

    #[test]
    fn test_partition_250_by_100() {
        let batches = partition((0..250).collect::<Vec<_>>(), size(100));
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn test_partition_empty() {
        assert!(partition(Vec::<u32>::new(), size(10)).is_empty());
    }

    #[test]
    fn test_partition_exact_multiple() {
        let batches = partition((0..20).collect::<Vec<_>>(), size(10));
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 10));
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence() {
        let batch = vec![keyed("a", 1), keyed("b", 2), keyed("a", 3), keyed("c", 4)];
        let (kept, dropped) = dedupe_last_wins(batch);

        assert_eq!(dropped, 1);
        let ids: Vec<String> = kept.iter().map(|r| r.get("card_id").unwrap().to_string()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(kept[1].get("price"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_dedupe_treats_integral_real_as_integer_key() {
        let key = ConflictKey::new(["id"]).unwrap();
        let batch: Vec<KeyedRecord> = [Value::Integer(5), Value::Real(5.0)]
            .into_iter()
            .map(|id| {
                let record: MappedRecord = [("id", id)].into_iter().collect();
                KeyedRecord {
                    key: key.key_of(&record).unwrap(),
                    record,
                }
            })
            .collect();

        let (kept, dropped) = dedupe_last_wins(batch);
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].get("id"), Some(&Value::Real(5.0)));
    }

    #[test]
    fn test_dedupe_without_duplicates_is_identity() {
        let batch = vec![keyed("a", 1), keyed("b", 2)];
        let expected: Vec<MappedRecord> = batch.iter().map(|k| k.record.clone()).collect();
        let (kept, dropped) = dedupe_last_wins(batch);
        assert_eq!(dropped, 0);
        assert_eq!(kept, expected);
    }

    proptest! {
        #[test]
        fn prop_partition_preserves_sequence(items in proptest::collection::vec(any::<u16>(), 0..600), b in 1usize..150) {
            let n = items.len();
            let batches = partition(items.clone(), size(b));

            prop_assert_eq!(batches.len(), n.div_ceil(b));
            prop_assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= b));

            let joined: Vec<u16> = batches.into_iter().flatten().collect();
            prop_assert_eq!(joined, items);
        }
    }
}
