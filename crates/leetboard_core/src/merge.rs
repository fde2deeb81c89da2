use std::cmp::Reverse;

use crate::record::StudentRecord;

/// Order records for publication: pinned rows first, each group by total
/// solved descending. Both steps are stable, so ties keep roster order.
pub fn order_records(mut records: Vec<StudentRecord>) -> Vec<StudentRecord> {
    records.sort_by_key(|record| Reverse(record.total_solved()));
    let (mut pinned, unpinned): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|record| record.pinned);
    pinned.extend(unpinned);
    pinned
}
