use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::archive::Archive;
use crate::extractors::{JobMetadata, MediaDownloader};
use crate::input::WorkItem;
use crate::postprocess::{run_stages, PostProcessor};
use crate::Result;

/// Items left to download after the archive pre-filter
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub pending: Vec<WorkItem>,

    /// Items skipped because the archive already has them
    pub skipped: usize,
}

impl BatchPlan {
    /// Drop items whose derived id is already archived.
    ///
    /// Items without a derivable id are always kept.
    pub fn new(items: Vec<WorkItem>, archive: Option<&Archive>) -> Self {
        let Some(archive) = archive else {
            return Self {
                pending: items,
                skipped: 0,
            };
        };

        let total = items.len();
        let pending: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| !item.archive_entry().is_some_and(|entry| archive.contains(&entry)))
            .collect();

        Self {
            skipped: total - pending.len(),
            pending,
        }
    }
}

/// Counts for one finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Worker threads started
    pub workers: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    failed: usize,
}

/// Serializes status lines from all workers and keeps the tally
struct Reporter {
    total: usize,
    tally: Mutex<Tally>,
    bar: ProgressBar,
}

impl Reporter {
    fn new(total: usize, show_progress: bool) -> Self {
        let bar = if show_progress {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} ({elapsed})")
                .map(|s| s.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            total,
            tally: Mutex::new(Tally::default()),
            bar,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn println(&self, line: String) {
        self.bar.suspend(|| println!("{}", line));
    }

    fn started(&self, seq: usize, url: &str) {
        let _guard = self.lock();
        self.println(format!("[{}/{}] Downloading: {}", seq, self.total, url));
    }

    fn completed(&self, seq: usize, jobs: &[JobMetadata]) {
        let mut tally = self.lock();
        tally.completed += 1;

        let titles: Vec<&str> = jobs.iter().filter_map(|job| job.title.as_deref()).collect();
        let what = match titles.as_slice() {
            [] => format!("{} file(s)", jobs.len()),
            [title] => title.to_string(),
            [first, ..] => format!("{} (+{} more)", first, jobs.len() - 1),
        };
        self.println(format!("[{}/{}] {} {}", seq, self.total, style("Done:").green(), what));
        self.bar.inc(1);
    }

    fn failed(&self, seq: usize, error: &anyhow::Error) {
        let mut tally = self.lock();
        tally.failed += 1;

        self.println(format!("[{}/{}] {} {:#}", seq, self.total, style("Error:").red(), error));
        self.bar.inc(1);
    }

    fn finish(&self) -> (usize, usize) {
        self.bar.finish_and_clear();
        let tally = self.lock();
        (tally.completed, tally.failed)
    }
}

/// Runs a batch of downloads on a fixed pool of worker threads
pub struct Coordinator {
    threads: usize,
    archive: Option<Archive>,
    stages: Vec<Box<dyn PostProcessor>>,
    show_progress: bool,
}

impl Coordinator {
    /// `stages` run in order on every produced file; `archive` is `None` when disabled
    pub fn new(threads: usize, archive: Option<Archive>, stages: Vec<Box<dyn PostProcessor>>) -> Self {
        Self {
            threads: threads.max(1),
            archive,
            stages,
            show_progress: false,
        }
    }

    /// Draw a progress bar under the status lines
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn archive(&self) -> Option<&Archive> {
        self.archive.as_ref()
    }

    /// Filter `items` against the archive as it is now
    pub fn plan(&self, items: Vec<WorkItem>) -> BatchPlan {
        BatchPlan::new(items, self.archive.as_ref())
    }

    /// Download every pending item.
    ///
    /// `make_downloader` is called once per worker thread; each worker keeps its
    /// downloader for all the items it takes from the queue. Failed items are
    /// reported and counted, they never stop a worker.
    pub fn run<F, D>(&self, plan: BatchPlan, make_downloader: F) -> BatchSummary
    where
        F: Fn(usize) -> D + Sync,
        D: MediaDownloader,
    {
        let total = plan.pending.len();
        let workers = self.threads.min(total);
        if workers == 0 {
            return BatchSummary {
                skipped: plan.skipped,
                ..Default::default()
            };
        }

        let (sender, receiver) = crossbeam_channel::bounded::<(usize, WorkItem)>(total);
        // Capacity covers every item and `receiver` is still held here, so sends never block
        for (i, item) in plan.pending.into_iter().enumerate() {
            if let Err(crossbeam_channel::SendError((seq, item))) = sender.send((i + 1, item)) {
                tracing::error!("Failed to queue item {} ({})", seq, item.url);
            }
        }
        drop(sender);

        tracing::info!("Starting {} worker(s) for {} item(s)", workers, total);
        let started_at = Instant::now();
        let reporter = Reporter::new(total, self.show_progress);
        let reporter_ref = &reporter;
        let make_ref = &make_downloader;

        std::thread::scope(|scope| {
            for worker_id in 0..workers {
                let recv = receiver.clone();

                scope.spawn(move || {
                    let _span = tracing::info_span!("worker", id = worker_id).entered();
                    let mut downloader = make_ref(worker_id);

                    while let Ok((seq, item)) = recv.try_recv() {
                        reporter_ref.started(seq, &item.url);
                        match self.process_item(&mut downloader, &item) {
                            Ok(jobs) => reporter_ref.completed(seq, &jobs),
                            Err(e) => {
                                tracing::error!("Item {} ({}) failed: {:#}", seq, item.url, e);
                                reporter_ref.failed(seq, &e);
                            }
                        }
                    }

                    tracing::debug!("Queue drained, worker exiting");
                });
            }
        });

        let (completed, failed) = reporter.finish();
        tracing::info!(
            "Batch finished in {}: {} completed, {} failed",
            crate::utils::format_duration(started_at.elapsed().as_secs_f64()),
            completed,
            failed
        );

        BatchSummary {
            workers,
            completed,
            failed,
            skipped: plan.skipped,
        }
    }

    /// Download one item, post-process every file it produced and archive it
    fn process_item<D: MediaDownloader>(&self, downloader: &mut D, item: &WorkItem) -> Result<Vec<JobMetadata>> {
        let jobs = downloader.download(&item.url)?;
        if jobs.is_empty() {
            anyhow::bail!("no audio file was produced");
        }

        for job in &jobs {
            match &job.filepath {
                Some(path) => {
                    run_stages(&self.stages, path, job);
                }
                None => tracing::warn!("yt-dlp reported no file path for {}", job.page_url(&item.url)),
            }

            if let Some(archive) = &self.archive {
                match job.archive_entry().or_else(|| item.archive_entry()) {
                    Some(entry) => {
                        if let Err(e) = archive.record(&entry) {
                            tracing::warn!("Failed to record {} in archive: {:#}", entry, e);
                        }
                    }
                    None => tracing::warn!("No id to archive for {}", job.page_url(&item.url)),
                }
            }
        }

        Ok(jobs)
    }
}
