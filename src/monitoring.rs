//! In this module, we keep the runtime stats of a sweep: how many passes ran and
//! how often the radio let us down along the way.

use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub passes: u64,
    pub retunes: u64,
    pub failed_retunes: u64,
    pub failed_reads: u64,
    pub short_reads: u64,
    pub skipped_hops: u64,
    pub rows: u64,
}

impl ScanStats {
    pub fn log(&self) {
        info!(
            passes = self.passes,
            retunes = self.retunes,
            failed_retunes = self.failed_retunes,
            failed_reads = self.failed_reads,
            short_reads = self.short_reads,
            skipped_hops = self.skipped_hops,
            rows = self.rows,
            "Sweep statistics"
        );
    }
}
