//! Aggregation of records over a window of training steps.
use super::{Record, RecordValue};
use std::collections::BTreeSet;

fn min(vs: &[f32]) -> f32 {
    vs.iter().copied().fold(f32::INFINITY, f32::min)
}

fn max(vs: &[f32]) -> f32 {
    vs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len() as f32
}

/// Stores records and reduces them into a single summary record.
///
/// Scalars seen once are kept as they are. Scalars seen more than once are
/// summarized into `{key}_min`, `{key}_max` and `{key}_mean`. For any other
/// value type the most recent value is kept.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no record has been stored since the last aggregation.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn scalar(&self, key: &str) -> Option<Record> {
        let vs: Vec<f32> = self
            .data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect();

        match vs.len() {
            0 => None,
            1 => Some(Record::from_scalar(key, vs[0])),
            _ => Some(Record::from_slice(&[
                (format!("{}_min", key), RecordValue::Scalar(min(&vs))),
                (format!("{}_max", key), RecordValue::Scalar(max(&vs))),
                (format!("{}_mean", key), RecordValue::Scalar(mean(&vs))),
            ])),
        }
    }

    fn latest(&self, key: &str) -> Option<Record> {
        self.data
            .iter()
            .rev()
            .find_map(|record| record.get(key))
            .map(|value| Record::from_slice(&[(key, value.clone())]))
    }

    /// Reduces the stored records into one and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let keys: BTreeSet<String> = self
            .data
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect();

        let mut record = Record::empty();
        for key in keys.iter() {
            let is_scalar = self
                .data
                .iter()
                .rev()
                .find_map(|r| r.get(key))
                .map_or(false, |v| matches!(v, RecordValue::Scalar(_)));
            let summary = if is_scalar {
                self.scalar(key)
            } else {
                self.latest(key)
            };
            if let Some(summary) = summary {
                record.merge_inplace(summary);
            }
        }
        self.data.clear();
        record
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_scalar("loss_q", 1.0));
        storage.store(Record::from_scalar("loss_q", 3.0));
        storage.store(Record::from_scalar("epsilon", 0.5));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("loss_q_mean").unwrap(), 2.0);
        assert_eq!(record.get_scalar("loss_q_min").unwrap(), 1.0);
        assert_eq!(record.get_scalar("loss_q_max").unwrap(), 3.0);
        assert_eq!(record.get_scalar("epsilon").unwrap(), 0.5);
        assert!(storage.is_empty());
    }
}
