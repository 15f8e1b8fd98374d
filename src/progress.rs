use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// One in-place progress line for a tick. `total == 0` means no denominator.
pub fn render_tick(frame: usize, processed: u64, total: u64) -> String {
    let glyph = SPINNER[frame % SPINNER.len()];
    if total == 0 {
        format!("{glyph} {processed} rows")
    } else {
        let percent = processed as f64 * 100.0 / total as f64;
        format!("{glyph} {processed}/{total} ({percent:.2}%)")
    }
}

/// Closing line, carrying the count the database reported.
pub fn render_final(copied: u64, total: u64, elapsed: Duration) -> String {
    let denominator = if total == 0 { copied } else { total };
    format!(
        "✓ {copied}/{denominator} (100.00%) in {:.2}s",
        elapsed.as_secs_f64()
    )
}

enum Completion {
    Finished { copied: u64, elapsed: Duration },
    Abandoned,
}

/// Samples the producer counter on a fixed cadence and redraws one line.
pub struct ProgressReporter {
    counter: Arc<AtomicU64>,
    total: u64,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(counter: Arc<AtomicU64>, total: u64) -> Self {
        Self {
            counter,
            total,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Draw on standard output.
    pub fn spawn(self) -> ProgressHandle {
        self.spawn_to(std::io::stdout())
    }

    /// Draw on `out`. Write errors are ignored.
    pub fn spawn_to<W>(self, mut out: W) -> ProgressHandle
    where
        W: Write + Send + 'static,
    {
        let (done_tx, mut done_rx) = oneshot::channel::<Completion>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut frame = 0usize;
            let mut widest = 0usize;

            loop {
                tokio::select! {
                    done = &mut done_rx => {
                        let last = match done {
                            Ok(Completion::Finished { copied, elapsed }) => {
                                render_final(copied, self.total, elapsed)
                            }
                            Ok(Completion::Abandoned) | Err(_) => String::new(),
                        };
                        let _ = writeln!(out, "\r{last:<widest$}");
                        let _ = out.flush();
                        break;
                    }
                    _ = ticker.tick() => {
                        let processed = self.counter.load(Ordering::Acquire);
                        let line = render_tick(frame, processed, self.total);
                        widest = widest.max(line.chars().count());
                        let _ = write!(out, "\r{line}");
                        let _ = out.flush();
                        frame = frame.wrapping_add(1);
                    }
                }
            }
        });

        ProgressHandle {
            done: done_tx,
            task,
        }
    }
}

/// Stops the reporter task.
pub struct ProgressHandle {
    done: oneshot::Sender<Completion>,
    task: JoinHandle<()>,
}

impl ProgressHandle {
    /// Print the final 100% line and wait for the task to exit.
    pub async fn finish(self, copied: u64, elapsed: Duration) {
        let _ = self.done.send(Completion::Finished { copied, elapsed });
        let _ = self.task.await;
    }

    /// Terminate the line without a summary, used when the ingest failed.
    pub async fn abandon(self) {
        let _ = self.done.send(Completion::Abandoned);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn tick_shows_ratio_and_percent() {
        assert_eq!(render_tick(0, 250, 1000), "| 250/1000 (25.00%)");
        assert_eq!(render_tick(5, 1, 3), "/ 1/3 (33.33%)");
    }

    #[test]
    fn zero_total_shows_raw_count() {
        assert_eq!(render_tick(2, 42, 0), "- 42 rows");
    }

    #[test]
    fn final_line_uses_copied_count() {
        let line = render_final(3, 4, Duration::from_millis(1500));
        assert_eq!(line, "✓ 3/4 (100.00%) in 1.50s");
        assert_eq!(render_final(7, 0, Duration::ZERO), "✓ 7/7 (100.00%) in 0.00s");
    }

    #[tokio::test]
    async fn reporter_draws_in_place_and_finishes() {
        let counter = Arc::new(AtomicU64::new(0));
        let buf = SharedBuf::default();
        let handle = ProgressReporter::new(counter.clone(), 3)
            .with_interval(Duration::from_millis(5))
            .spawn_to(buf.clone());

        counter.store(2, Ordering::Release);
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.finish(3, Duration::from_millis(10)).await;

        let out = buf.contents();
        assert!(out.contains("\r"), "{out:?}");
        assert!(out.contains("2/3 (66.67%)"), "{out:?}");
        assert!(out.ends_with("✓ 3/3 (100.00%) in 0.01s\n"), "{out:?}");
    }

    #[tokio::test]
    async fn abandon_terminates_line() {
        let counter = Arc::new(AtomicU64::new(0));
        let buf = SharedBuf::default();
        let handle = ProgressReporter::new(counter, 10)
            .with_interval(Duration::from_millis(5))
            .spawn_to(buf.clone());
        tokio::time::sleep(Duration::from_millis(15)).await;
        handle.abandon().await;
        let out = buf.contents();
        assert!(out.ends_with('\n'));
        assert!(!out.contains("100.00%"));
    }
}
