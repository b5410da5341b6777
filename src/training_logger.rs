//! Training Logger
//!
//! Tracks training metrics over time, writing each step to a CSV file and
//! echoing a one-line summary to the console. The CSV can be analyzed later
//! for visualization and run comparison.
//!
//! ## Example
//!
//! ```rust,no_run
//! use malvolio::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")
//!     .expect("Failed to create logger");
//!
//! logger.log(100, 0.001, 2.5).expect("Failed to log");
//! ```
//!
//! ## CSV Format
//!
//! - `step`: Training step number
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for this step
//! - `loss`: Training loss
//!
//! A run configuration can be recorded as a `#`-prefixed JSON comment on the
//! first line via [`TrainingLogger::with_config`], keeping the run and its
//! hyperparameters in one file.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

/// Logs per-step training metrics to CSV and console.
pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create a logger writing to `log_path`, with the CSV header in place.
    pub fn new<P: AsRef<Path>>(log_path: P) -> std::io::Result<Self> {
        let mut log_file = File::create(log_path)?;
        writeln!(log_file, "step,elapsed_seconds,learning_rate,loss")?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Create a logger whose first line is the run configuration serialized
    /// as a JSON comment, followed by the CSV header.
    pub fn with_config<P: AsRef<Path>, C: Serialize>(
        log_path: P,
        config: &C,
    ) -> std::io::Result<Self> {
        let mut log_file = File::create(log_path)?;
        let json = serde_json::to_string(config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(log_file, "# {}", json)?;
        writeln!(log_file, "step,elapsed_seconds,learning_rate,loss")?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Log one training step to the CSV file and the console.
    ///
    /// Flushes after every write so a crashed run keeps its history.
    pub fn log(&mut self, step: usize, learning_rate: f64, loss: f64) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f64();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.6}",
            step, elapsed, learning_rate, loss
        )?;
        self.log_file.flush()?;

        let step_time = self.last_log_time.elapsed().as_secs_f64();
        println!(
            "Step {:5} | Time: {:7.1}s (+{:.1}s) | LR: {:.6} | Loss: {:.6}",
            step, elapsed, step_time, learning_rate, loss
        );

        self.last_log_time = Instant::now();
        Ok(())
    }
}
