//! Background jobs.
//!
//! Every operation runs on its own thread and streams [`JobEvent`]s back over a
//! channel, so a front end stays responsive while a folder is processed.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crate::{
    config::CompressOptions, core::ImgpressCore, progress::percent, progress::ProgressReporter,
    CompressionReport, Operation,
};

#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        total: usize,
    },
    Progress {
        processed: usize,
        failed: usize,
        total: usize,
        percent: u8,
    },
    FileSucceeded {
        path: String,
        original_size: u64,
        compressed_size: u64,
    },
    FileFailed {
        path: String,
        error: String,
    },
    /// Terminal: the operation completed (possibly with per-file failures).
    Finished(CompressionReport),
    /// Terminal: the operation could not run or a single-file operation failed.
    Failed(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Finished(_) | JobEvent::Failed(_))
    }
}

/// Forwards engine progress into a channel
pub struct ChannelProgressReporter {
    sender: Sender<JobEvent>,
    total: AtomicUsize,
}

impl ChannelProgressReporter {
    pub fn new(sender: Sender<JobEvent>) -> Self {
        Self {
            sender,
            total: AtomicUsize::new(0),
        }
    }

    fn send(&self, event: JobEvent) {
        // A dropped receiver only means nobody is listening any more
        if self.sender.send(event).is_err() {
            log::trace!("Job event receiver dropped");
        }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn set_total_files(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.send(JobEvent::Started { total });
    }

    fn update_progress(&self, processed: usize, failed: usize) {
        let total = self.total.load(Ordering::Relaxed);
        self.send(JobEvent::Progress {
            processed,
            failed,
            total,
            percent: percent(processed + failed, total),
        });
    }

    fn report_error(&self, file_path: &str, error: &str) {
        self.send(JobEvent::FileFailed {
            path: file_path.to_string(),
            error: error.to_string(),
        });
    }

    fn report_success(&self, file_path: &str, original_size: u64, compressed_size: u64) {
        self.send(JobEvent::FileSucceeded {
            path: file_path.to_string(),
            original_size,
            compressed_size,
        });
    }
}

/// Handle to a running job
pub struct JobHandle {
    events: Receiver<JobEvent>,
    thread: JoinHandle<()>,
}

impl JobHandle {
    /// Event stream; ends once the job thread has exited.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Block until the job ends, discarding intermediate events.
    pub fn wait(self) -> Result<CompressionReport> {
        self.wait_with(|_| {})
    }

    /// Block until the job ends, passing every event to `on_event`.
    pub fn wait_with<F>(self, mut on_event: F) -> Result<CompressionReport>
    where
        F: FnMut(&JobEvent),
    {
        let mut outcome = None;
        for event in self.events.iter() {
            on_event(&event);
            match event {
                JobEvent::Finished(report) => outcome = Some(Ok(report)),
                JobEvent::Failed(message) => outcome = Some(Err(anyhow!(message))),
                _ => {}
            }
        }

        if self.thread.join().is_err() {
            return Err(anyhow!("Worker thread panicked"));
        }

        outcome.unwrap_or_else(|| Err(anyhow!("Job ended without a result")))
    }
}

/// Run `operation` on a new thread.
pub fn spawn(options: CompressOptions, operation: Operation) -> Result<JobHandle> {
    let (sender, receiver) = unbounded();
    let job_name = operation.name();

    let thread = thread::Builder::new()
        .name(format!("imgpress-{job_name}"))
        .spawn(move || {
            let reporter = ChannelProgressReporter::new(sender.clone());
            let mut core = ImgpressCore::new(options);

            let event = match core.run_with_progress(&operation, Some(Box::new(reporter))) {
                Ok(report) => JobEvent::Finished(report),
                Err(e) => {
                    log::error!("{} failed: {:#}", operation.name(), e);
                    JobEvent::Failed(format!("{e:#}"))
                }
            };
            if sender.send(event).is_err() {
                log::trace!("Job event receiver dropped");
            }
        })
        .context("Failed to spawn worker thread")?;

    Ok(JobHandle {
        events: receiver,
        thread,
    })
}
