//! Custom assertions and wait helpers for session tests

use media_dl::{DownloadSession, Event, JobEvent, JobId, JobKind, SessionPhase};
use std::time::Duration;

/// Drive the session until idle, collecting every drained event
///
/// Panics if the session is still busy after `timeout`.
pub async fn run_to_idle(session: &mut DownloadSession, timeout: Duration) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let finished = tokio::time::timeout(
        timeout,
        session.run_until_idle(|event| events.push(event.clone())),
    )
    .await;
    assert!(
        finished.is_ok(),
        "session still {:?} after {:?}",
        session.phase(),
        timeout
    );
    events
}

/// Drain until the session reaches `phase`, collecting every drained event
pub async fn drain_until_phase(
    session: &mut DownloadSession,
    phase: SessionPhase,
    timeout: Duration,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    while session.phase() != phase {
        assert!(
            tokio::time::Instant::now() < deadline,
            "phase {phase:?} not reached, still {:?}",
            session.phase()
        );
        events.extend(session.drain_events());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    events
}

/// Events of one job, in drain order
pub fn events_of(events: &[JobEvent], job_id: JobId) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| e.job_id == job_id)
        .map(|e| &e.event)
        .collect()
}

/// Assert that `job_id` produced exactly one terminal event and that it came last
pub fn assert_single_terminal(events: &[JobEvent], job_id: JobId, kind: JobKind) -> Event {
    let own = events_of(events, job_id);
    let terminals: Vec<&&Event> = own.iter().filter(|e| e.is_terminal_for(kind)).collect();
    assert_eq!(
        terminals.len(),
        1,
        "job {job_id} should end exactly once, got {terminals:?}"
    );
    let last = own.last().expect("job produced no events");
    assert!(
        last.is_terminal_for(kind),
        "terminal event of job {job_id} must be its last, got {last:?}"
    );
    (*last).clone()
}
