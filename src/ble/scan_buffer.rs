//! De-duplicating store for advertisers seen during one scan.

use super::{AdvReport, ScanRecord};
use crate::config::BT_SCAN_MAX_RESULTS;
use heapless::Vec;

/// What [`ScanBuffer::record`] did with a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordOutcome {
    /// First sighting; a new record was appended at this index.
    Added(usize),
    /// Repeat sighting; only the RSSI of the record at this index changed.
    Updated(usize),
    /// Buffer full; the report was discarded.
    Dropped,
}

/// Insertion-ordered list of unique advertisers, at most
/// [`BT_SCAN_MAX_RESULTS`] long.
#[derive(Default)]
pub struct ScanBuffer {
    records: Vec<ScanRecord, BT_SCAN_MAX_RESULTS>,
}

impl ScanBuffer {
    pub const fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn record(&mut self, report: &AdvReport<'_>) -> RecordOutcome {
        if let Some(idx) = self
            .records
            .iter()
            .position(|r| r.address == report.address)
        {
            self.records[idx].rssi = report.rssi;
            return RecordOutcome::Updated(idx);
        }

        match self.records.push(ScanRecord::from_report(report)) {
            Ok(()) => RecordOutcome::Added(self.records.len() - 1),
            Err(_) => RecordOutcome::Dropped,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ScanRecord> {
        self.records.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScanRecord> {
        self.records.iter()
    }
}
