//! Instrument partitioning.
//!
//! Splits the current instrument universe into groups of at most
//! `max_per_part` so each WebSocket connection stays under Deribit's
//! 500-channel cap (two channels per instrument => 250 instruments/conn).

pub const DEFAULT_MAX_PER_PARTITION: usize = 250;

/// Stable-order partition: preserves the caller's ordering (the catalog
/// ranks by open interest, so partition 0 gets the highest-OI instruments).
pub fn partition<T: Clone>(instruments: &[T], max_per_part: usize) -> Vec<Vec<T>> {
    if max_per_part == 0 {
        return if instruments.is_empty() { Vec::new() } else { vec![instruments.to_vec()] };
    }
    instruments.chunks(max_per_part).map(|c| c.to_vec()).collect()
}

/// Returns the partition owned by `connection_id`, or an out-of-range error
/// if `connection_id` is >= the number of partitions — a collector started
/// with such an id should exit with a configuration error rather than
/// silently collecting nothing.
pub fn partition_for_connection<T: Clone>(
    instruments: &[T],
    max_per_part: usize,
    connection_id: usize,
) -> Result<Vec<T>, PartitionError> {
    let parts = partition(instruments, max_per_part);
    parts.get(connection_id).cloned().ok_or(PartitionError::OutOfRange {
        connection_id,
        partitions: parts.len(),
    })
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PartitionError {
    #[error("connection_id {connection_id} out of range: only {partitions} partition(s) exist")]
    OutOfRange { connection_id: usize, partitions: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_yields_no_partitions() {
        let xs: Vec<i32> = vec![];
        assert!(partition(&xs, 250).is_empty());
    }

    #[test]
    fn single_partition_when_under_cap() {
        let xs: Vec<i32> = (0..10).collect();
        let parts = partition(&xs, 250);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], xs);
    }

    #[test]
    fn splits_exactly_at_cap() {
        let xs: Vec<i32> = (0..500).collect();
        let parts = partition(&xs, 250);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 250);
        assert_eq!(parts[1].len(), 250);
    }

    #[test]
    fn connection_id_out_of_range_errors() {
        let xs: Vec<i32> = (0..10).collect();
        let err = partition_for_connection(&xs, 250, 5).unwrap_err();
        assert!(matches!(err, PartitionError::OutOfRange { connection_id: 5, partitions: 1 }));
    }

    proptest! {
        #[test]
        fn cap_and_disjoint_union_holds(xs in proptest::collection::vec(any::<i32>(), 0..2000), max in 1usize..500) {
            let parts = partition(&xs, max);
            for p in &parts {
                prop_assert!(p.len() <= max);
            }
            let rejoined: Vec<i32> = parts.into_iter().flatten().collect();
            prop_assert_eq!(rejoined, xs);
        }
    }
}
