//! Status aggregation
//!
//! [`aggregate`] folds entity snapshots and pipeline statistics into a
//! [`SyncStatus`]. It is called from the owner loop with the owner's own
//! view of the records; other tasks reach it through
//! [`crate::engine::SyncHandle::status_and_entities`].

use crate::pipeline::{QueueStats, RetryQueueStats};
use crate::record::DnsRecordData;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time summary of the synchronizer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub current_queue_size: usize,
    pub peak_queue_size: usize,
    pub peak_queue_size_time: Option<DateTime<Utc>>,

    pub current_retry_queue_size: usize,
    pub peak_retry_queue_size: usize,
    pub peak_retry_queue_size_time: Option<DateTime<Utc>>,
    pub peak_failed_attempts: usize,
    pub peak_failed_attempts_time: Option<DateTime<Utc>>,

    /// Successful gets and updates across all records
    pub total_success_count: u64,
    /// Failed gets and updates across all records
    pub total_error_count: u64,
    /// Most recent error across all records
    pub last_error_message: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Status plus every record snapshot, for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusAndEntities {
    pub status: SyncStatus,
    /// Sorted by name, then record type
    pub records: Vec<DnsRecordData>,
}

/// Fold record snapshots and pipeline statistics into a [`SyncStatus`]
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a DnsRecordData>,
    queue: &QueueStats,
    retry: &RetryQueueStats,
) -> SyncStatus {
    let mut status = SyncStatus {
        current_queue_size: queue.current,
        peak_queue_size: queue.peak,
        peak_queue_size_time: queue.peak_time,
        current_retry_queue_size: retry.current,
        peak_retry_queue_size: retry.peak,
        peak_retry_queue_size_time: retry.peak_time,
        peak_failed_attempts: retry.peak_failed_attempts,
        peak_failed_attempts_time: retry.peak_failed_attempts_time,
        ..Default::default()
    };

    for record in records {
        status.total_success_count += record.get_success_count + record.update_success_count;
        status.total_error_count += record.get_error_count + record.update_error_count;

        if let Some(time) = record.last_error_time {
            let newer = status.last_error_time.is_none_or(|latest| time > latest);
            if newer {
                status.last_error_time = Some(time);
                status.last_error_message = record.last_error.clone();
            }
        }
    }

    status
}

/// Sort snapshots the way listings show them
pub fn sort_for_display(records: &mut [DnsRecordData]) {
    records.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.record_type.cmp(&b.record_type))
    });
}
