use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Progress message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressType {
    Start,
    Progress,
    Complete,
}

/// Unified progress struct for tracking a conversion run
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Progress type (start, progress, complete)
    pub progress_type: ProgressType,
    /// Number of converted files
    pub completed_tasks: usize,
    /// Total number of files in the batch
    pub total_tasks: usize,
    /// Progress percentage (0-100)
    pub progress_percentage: usize,
    /// Base name of the file just converted, if any
    pub file_name: Option<String>,
}

impl Progress {
    /// Create a new Progress instance with basic information
    pub fn new(progress_type: ProgressType, completed_tasks: usize, total_tasks: usize) -> Self {
        let progress_percentage = if total_tasks > 0 {
            (completed_tasks * 100) / total_tasks
        } else {
            0
        };

        Self {
            progress_type,
            completed_tasks,
            total_tasks,
            progress_percentage,
            file_name: None,
        }
    }

    pub fn with_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Receives progress notifications for one run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// Logs every converted file at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: &Progress) {
        match progress.progress_type {
            ProgressType::Start => info!("Converting {} files", progress.total_tasks),
            ProgressType::Progress => info!(
                "Converted file {} ({}/{})",
                progress.file_name.as_deref().unwrap_or_default(),
                progress.completed_tasks,
                progress.total_tasks
            ),
            ProgressType::Complete => info!("Converted {} files", progress.completed_tasks),
        }
    }
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn report(&self, _progress: &Progress) {}
}

/// Shared handle to a progress sink, cheap to clone into a run.
#[derive(Clone)]
pub struct Reporter(Arc<dyn ProgressSink>);

impl Reporter {
    pub fn new(sink: impl ProgressSink + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// `LogProgress`, or `SilentProgress` when `silent`
    pub fn for_silent(silent: bool) -> Self {
        if silent {
            Self::new(SilentProgress)
        } else {
            Self::new(LogProgress)
        }
    }

    pub fn report(&self, progress: Progress) {
        self.0.report(&progress);
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(LogProgress)
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reporter")
    }
}
