//! Progress tracking for migration runs
//!
//! One bar step per collection. Progress lines are routed through the bar
//! when it is visible so they do not tear it; otherwise they go straight to
//! stdout. A quiet tracker shows neither.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress tracker across the collections of one run
pub struct ProgressTracker {
    /// Collections finished so far
    done: AtomicU64,
    /// Documents inserted so far
    inserted: AtomicU64,
    /// Start time of the run
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
    /// Drop progress lines
    quiet: bool,
    /// Progress lines shown so far
    lines: AtomicU64,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Number of collections in the run
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(total: u64, enable_bar: bool) -> Self {
        let bar = if enable_bar && total > 0 {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} collections {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            Some(bar)
        } else {
            None
        };

        Self {
            done: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
            quiet: false,
            lines: AtomicU64::new(0),
        }
    }

    /// Drop progress lines and the bar
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        if quiet {
            self.bar = None;
        }
        self.quiet = quiet;
        self
    }

    /// Print a line above the bar, or to stdout when there is no bar
    pub fn println(&self, line: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        self.lines.fetch_add(1, Ordering::Relaxed);
        match &self.bar {
            Some(bar) => bar.println(line.as_ref()),
            None => println!("{}", line.as_ref()),
        }
    }

    /// Mark one collection as done
    ///
    /// # Arguments
    /// * `inserted` - Documents inserted for that collection
    pub fn collection_done(&self, inserted: u64) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total_inserted = self.inserted.fetch_add(inserted, Ordering::Relaxed) + inserted;

        if let Some(ref bar) = self.bar {
            bar.set_position(done);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = total_inserted as f64 / elapsed;
                bar.set_message(format!("({:.0} docs/sec)", speed));
            }
        }
    }

    /// Collections finished so far
    pub fn completed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Progress lines shown so far
    pub fn lines_shown(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
