//! Byte-driven percentages and a bridge for progress produced off the async path.

use std::sync::Arc;

use ferry_core::{ProgressRecord, ProgressReporter, TransferContext};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Integer percentage of `done` over `total`, clamped to 100.
#[must_use]
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = done.saturating_mul(100) / total;
    u8::try_from(scaled.min(100)).unwrap_or(100)
}

/// Tracks bytes moved and yields a percentage only when it advances.
#[derive(Debug, Clone)]
pub struct ByteProgress {
    total: Option<u64>,
    done: u64,
    last: Option<u8>,
}

impl ByteProgress {
    /// Track a transfer of `total` bytes; `None` when the size is unknown.
    #[must_use]
    pub const fn new(total: Option<u64>) -> Self {
        Self {
            total,
            done: 0,
            last: None,
        }
    }

    /// Bytes counted so far.
    #[must_use]
    pub const fn done(&self) -> u64 {
        self.done
    }

    /// Count `bytes` and return the new percentage if it changed.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.done = self.done.saturating_add(bytes);
        let total = self.total.filter(|total| *total > 0)?;
        let percentage = percent_of(self.done, total);
        if self.last.is_some_and(|last| last >= percentage) {
            return None;
        }
        self.last = Some(percentage);
        Some(percentage)
    }
}

/// Forwards percentages from synchronous callbacks to the job's reporter.
///
/// Intermediate values may be coalesced; the latest value is always delivered.
pub struct ProgressPump {
    sender: watch::Sender<u8>,
    task: Option<JoinHandle<()>>,
}

impl ProgressPump {
    /// Start forwarding records named `name` with the stage `message`.
    #[must_use]
    pub fn start(ctx: &TransferContext, name: &str, message: &str) -> Self {
        Self::with_reporter(ctx.progress(), name, message)
    }

    /// Start forwarding to an explicit reporter.
    #[must_use]
    pub fn with_reporter(reporter: Arc<dyn ProgressReporter>, name: &str, message: &str) -> Self {
        let (sender, mut receiver) = watch::channel(0_u8);
        let name = name.to_string();
        let message = message.to_string();
        let task = tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let percentage = *receiver.borrow_and_update();
                reporter
                    .report(ProgressRecord::new(name.clone(), message.clone(), percentage))
                    .await;
            }
        });
        Self {
            sender,
            task: Some(task),
        }
    }

    /// Publish a new percentage.
    pub fn update(&self, percentage: u8) {
        self.sender.send_replace(percentage);
    }

    /// Sender for callbacks that outlive a borrow of the pump.
    #[must_use]
    pub fn sender(&self) -> watch::Sender<u8> {
        self.sender.clone()
    }

    /// Stop forwarding once the latest value has been reported.
    ///
    /// Every sender handed out by [`ProgressPump::sender`] must be dropped first.
    pub async fn finish(mut self) {
        let (replacement, _) = watch::channel(0_u8);
        drop(std::mem::replace(&mut self.sender, replacement));
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ProgressPump {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use ferry_test_support::fixtures::RecordingProgress;

    use super::*;

    #[test]
    fn percentages_clamp_and_handle_empty_totals() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(50, 200), 25);
        assert_eq!(percent_of(300, 200), 100);
    }

    #[test]
    fn byte_progress_reports_only_advances() {
        let mut progress = ByteProgress::new(Some(1000));
        assert_eq!(progress.advance(0), Some(0));
        assert_eq!(progress.advance(1), None);
        assert_eq!(progress.advance(499), Some(50));
        assert_eq!(progress.advance(500), Some(100));
        assert_eq!(progress.done(), 1000);

        let mut unknown = ByteProgress::new(None);
        assert_eq!(unknown.advance(10), None);
        assert_eq!(unknown.done(), 10);
    }

    #[tokio::test]
    async fn pump_delivers_latest_value_before_finishing() {
        let recorder = Arc::new(RecordingProgress::default());
        let pump = ProgressPump::with_reporter(recorder.clone(), "a.zip", "Zipping files");
        let sender = pump.sender();
        let producer = std::thread::spawn(move || {
            for percentage in [10_u8, 40, 90] {
                sender.send_replace(percentage);
            }
        });
        let _ = producer.join();
        pump.update(100);
        pump.finish().await;

        let records = recorder.records().await;
        let last = records.last().map(|record| record.percentage);
        assert_eq!(last, Some(100));
        assert!(records.iter().all(|record| record.message == "Zipping files"));
    }
}
