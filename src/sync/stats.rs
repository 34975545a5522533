use std::time::Instant;

use tracing::info;

const REPORT_EVERY: usize = 1000;

pub struct ExportStats {
    exported: usize,
    last_checkpoint: Instant,
}

impl Default for ExportStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportStats {
    pub fn new() -> Self {
        Self {
            exported: 0,
            last_checkpoint: Instant::now(),
        }
    }

    pub fn exported(&self) -> usize {
        self.exported
    }

    pub fn block_exported(&mut self, height: u64) {
        self.exported += 1;

        if self.exported % REPORT_EVERY == 0 {
            let time_taken = self.last_checkpoint.elapsed();

            info!(
                "exported blocks up to #{height}, last {REPORT_EVERY} in {time_taken:?} ({:.1} blocks/s)",
                REPORT_EVERY as f64 / time_taken.as_secs_f64()
            );

            self.last_checkpoint = Instant::now();
        }
    }
}
