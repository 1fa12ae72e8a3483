//! Ordered event hand-off from background jobs to the single consumer
//!
//! Writers hold cloneable [`EventPublisher`]s and never block. The reader is
//! whoever owns the [`EventChannel`]; `drain_all` takes `&mut self`, so only one
//! consumer can drain at a time.

use crate::types::{Event, JobEvent, JobId, JobKind};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Unbounded, order-preserving queue of [`JobEvent`]s
pub struct EventChannel {
    tx: UnboundedSender<JobEvent>,
    rx: UnboundedReceiver<JobEvent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Get a writer handle that can be moved to another thread
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Remove and return every queued event in publish order
    ///
    /// Returns an empty vector when nothing is pending. Never waits.
    pub fn drain_all(&mut self) -> Vec<JobEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// Cloneable writer side of an [`EventChannel`]
#[derive(Clone, Debug)]
pub struct EventPublisher {
    tx: UnboundedSender<JobEvent>,
}

impl EventPublisher {
    /// Enqueue an event without blocking
    ///
    /// A consumer that has gone away is not an error for the producer; the event
    /// is dropped and logged.
    pub fn publish(&self, event: JobEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(
                job_id = %e.0.job_id,
                kind = %e.0.kind,
                "Event channel closed, dropping event"
            );
        }
    }

    /// Bind this publisher to one job so callers only pass the payload
    pub fn for_job(&self, job_id: JobId, kind: JobKind) -> JobPublisher {
        JobPublisher {
            inner: self.clone(),
            job_id,
            kind,
        }
    }
}

/// Publisher bound to a single job's stream
#[derive(Clone, Debug)]
pub struct JobPublisher {
    inner: EventPublisher,
    job_id: JobId,
    kind: JobKind,
}

impl JobPublisher {
    /// Enqueue an event on this job's stream
    pub fn publish(&self, event: Event) {
        self.inner.publish(JobEvent {
            job_id: self.job_id,
            kind: self.kind,
            event,
        });
    }

    /// Enqueue a log line on this job's stream
    pub fn log(&self, message: impl Into<String>) {
        self.publish(Event::LogLine {
            message: message.into(),
        });
    }

    /// Job this publisher writes for
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Kind of the job this publisher writes for
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}
