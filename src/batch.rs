use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::model::{CollectionResult, FailedIdentifier, RunSummary};
use crate::output::{RecordWriter, SummarySink};

/// Drives the collector over every identifier, persists what comes back and
/// folds the outcome into one `RunSummary`. No identifier can end the run.
pub struct BatchRunner {
    collector: Arc<Collector>,
    writer: Box<dyn RecordWriter>,
    sink: Box<dyn SummarySink>,
    run_date: String,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(
        collector: Collector,
        writer: Box<dyn RecordWriter>,
        sink: Box<dyn SummarySink>,
        run_date: &str,
    ) -> Self {
        BatchRunner {
            collector: Arc::new(collector),
            writer,
            sink,
            run_date: run_date.to_string(),
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run_all(&mut self, identifiers: &[String]) -> RunSummary {
        let started = Instant::now();
        let mut tally = Tally::new(&self.run_date, identifiers.len());
        let pb = progress_bar(identifiers.len());

        if self.concurrency == 1 {
            for (index, identifier) in identifiers.iter().enumerate() {
                let result = self.collector.run(identifier).await;
                tally.absorb(self.writer.as_mut(), index, result);
                pb.inc(1);
            }
        } else {
            self.run_pool(identifiers, &mut tally, &pb).await;
        }

        pb.finish_and_clear();
        let summary = tally.into_summary(started.elapsed());
        info!(
            "Run {}: {} comments, {} replies, {} of {} videos failed",
            summary.run_date,
            summary.total_top_level,
            summary.total_child,
            summary.failed.len(),
            summary.identifiers
        );

        if let Err(e) = self.writer.finish(&summary) {
            error!("Failed to finalize output: {:#}", e);
        }
        if let Err(e) = self.sink.write_summary(&summary) {
            error!("Failed to write run summary: {:#}", e);
        }
        summary
    }

    /// Collect concurrently; only this loop touches the writer and the tally.
    async fn run_pool(&mut self, identifiers: &[String], tally: &mut Tally, pb: &ProgressBar) {
        let workers = self
            .concurrency
            .min(identifiers.len())
            .clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel::<(usize, CollectionResult)>(workers.saturating_mul(2));

        for (index, identifier) in identifiers.iter().cloned().enumerate() {
            let collector = Arc::clone(&self.collector);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let result = collector.run(&identifier).await;
                let _ = tx.send((index, result)).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut received = vec![false; identifiers.len()];
        while let Some((index, result)) = rx.recv().await {
            received[index] = true;
            tally.absorb(self.writer.as_mut(), index, result);
            pb.inc(1);
        }

        for (index, done) in received.into_iter().enumerate() {
            if !done {
                tally.fail(index, &identifiers[index], "collection task aborted".to_string());
            }
        }
    }
}

/// Running totals for one batch; failures carry their input position so the
/// summary lists them in input order whatever order tasks finish in.
struct Tally {
    summary: RunSummary,
    failures: Vec<(usize, FailedIdentifier)>,
}

impl Tally {
    fn new(run_date: &str, identifiers: usize) -> Self {
        Tally {
            summary: RunSummary::new(run_date, identifiers),
            failures: Vec::new(),
        }
    }

    fn absorb(&mut self, writer: &mut dyn RecordWriter, index: usize, result: CollectionResult) {
        let mut error = result.error.as_ref().map(|e| e.to_string());

        if result.has_records() {
            match writer.write_records(&result.identifier, &result.top_level, &result.children) {
                Ok(()) => {
                    self.summary.written += 1;
                    self.summary.total_top_level += result.top_level.len();
                    self.summary.total_child += result.children.len();
                }
                Err(e) => {
                    let write_err = format!("write failed: {:#}", e);
                    error = Some(match error {
                        Some(prev) => format!("{}; {}", prev, write_err),
                        None => write_err,
                    });
                }
            }
        }

        match error {
            Some(message) => self.fail(index, &result.identifier, message),
            None => info!(
                "collected {} ({} comments, {} replies)",
                result.identifier,
                result.top_level.len(),
                result.children.len()
            ),
        }
    }

    fn fail(&mut self, index: usize, identifier: &str, error: String) {
        warn!("failed: {} - {}", identifier, error);
        self.failures.push((
            index,
            FailedIdentifier {
                identifier: identifier.to_string(),
                error,
            },
        ));
    }

    fn into_summary(mut self, elapsed: Duration) -> RunSummary {
        self.failures.sort_by_key(|(index, _)| *index);
        self.summary.failed = self.failures.into_iter().map(|(_, f)| f).collect();
        self.summary.elapsed = elapsed;
        self.summary
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} videos ({per_sec}, eta {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb
}
