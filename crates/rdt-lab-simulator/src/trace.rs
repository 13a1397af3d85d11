use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use rdt_lab_abstract::{Direction, RdtVersion, SimConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEventKind {
    /// Line entered the channel.
    Sent,
    Corrupted,
    Dropped,
    /// Line reached the receiving endpoint.
    Delivered,
    /// Retransmission timer fired on a timed receive.
    TimedOut,
}

/// A compact record of one thing that happened on a link, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEvent {
    pub at_ms: u64,
    pub direction: Direction,
    pub kind: LinkEventKind,
    pub line: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub sent: u64,
    pub corrupted: u64,
    pub dropped: u64,
    pub delivered: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub protocol: RdtVersion,
    pub config: SimConfig,
    pub duration_ms: u64,
    pub delivered_data: Vec<String>,
    pub forward: LinkStats,
    pub backward: LinkStats,
    pub timeouts: u64,
    pub link_events: Vec<LinkEvent>,
    /// Events not kept because the trace was full.
    pub events_truncated: u64,
    /// Deliveries not kept in `delivered_data` because the trace was full.
    pub deliveries_truncated: u64,
}

#[derive(Debug, Default)]
struct TraceLog {
    events: Vec<LinkEvent>,
    truncated: u64,
    delivered: Vec<String>,
    deliveries_truncated: u64,
    forward: LinkStats,
    backward: LinkStats,
    timeouts: u64,
}

/// Shared, append-only record of a run. Cloning yields another handle to the
/// same log.
#[derive(Debug, Clone)]
pub struct Trace {
    started: Instant,
    capacity: usize,
    log: Arc<Mutex<TraceLog>>,
}

impl Trace {
    pub fn new(capacity: usize) -> Self {
        Self {
            started: Instant::now(),
            capacity,
            log: Arc::default(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn record(&self, direction: Direction, kind: LinkEventKind, line: &str) {
        let at_ms = self.elapsed_ms();
        let mut log = self.lock();
        let stats = match direction {
            Direction::Forward => &mut log.forward,
            Direction::Backward => &mut log.backward,
        };
        match kind {
            LinkEventKind::Sent => stats.sent += 1,
            LinkEventKind::Corrupted => stats.corrupted += 1,
            LinkEventKind::Dropped => stats.dropped += 1,
            LinkEventKind::Delivered => stats.delivered += 1,
            LinkEventKind::TimedOut => log.timeouts += 1,
        }
        if log.events.len() < self.capacity {
            log.events.push(LinkEvent {
                at_ms,
                direction,
                kind,
                line: line.to_string(),
            });
        } else {
            log.truncated += 1;
        }
    }

    /// Keeps at most `capacity` deliveries; later ones are only counted.
    pub fn record_delivery(&self, data: &str) {
        let mut log = self.lock();
        if log.delivered.len() < self.capacity {
            log.delivered.push(data.to_string());
        } else {
            log.deliveries_truncated += 1;
        }
    }

    pub fn stats(&self, direction: Direction) -> LinkStats {
        let log = self.lock();
        match direction {
            Direction::Forward => log.forward,
            Direction::Backward => log.backward,
        }
    }

    pub fn timeouts(&self) -> u64 {
        self.lock().timeouts
    }

    pub fn delivered(&self) -> Vec<String> {
        self.lock().delivered.clone()
    }

    /// Lines of the given kind seen on one direction, oldest first.
    pub fn lines(&self, direction: Direction, kind: LinkEventKind) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.direction == direction && e.kind == kind)
            .map(|e| e.line.clone())
            .collect()
    }

    pub fn report(&self, protocol: RdtVersion, config: &SimConfig) -> SimulationReport {
        let duration_ms = self.elapsed_ms();
        let log = self.lock();
        SimulationReport {
            protocol,
            config: config.clone(),
            duration_ms,
            delivered_data: log.delivered.clone(),
            forward: log.forward,
            backward: log.backward,
            timeouts: log.timeouts,
            link_events: log.events.clone(),
            events_truncated: log.truncated,
            deliveries_truncated: log.deliveries_truncated,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TraceLog> {
        // a panicking recorder leaves the log consistent enough to report
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_survive_truncation() {
        let trace = Trace::new(2);
        for _ in 0..3 {
            trace.record(Direction::Forward, LinkEventKind::Sent, "line");
        }
        trace.record(Direction::Backward, LinkEventKind::TimedOut, "");
        trace.record_delivery("line");

        assert_eq!(trace.stats(Direction::Forward).sent, 3);
        assert_eq!(trace.timeouts(), 1);

        let report = trace.report(RdtVersion::Rdt30, &SimConfig::default());
        assert_eq!(report.link_events.len(), 2);
        assert_eq!(report.events_truncated, 2);
        assert_eq!(report.delivered_data, vec!["line"]);
        assert_eq!(report.backward, LinkStats::default());
        assert_eq!(report.deliveries_truncated, 0);
    }

    #[test]
    fn deliveries_are_capped_like_events() {
        let trace = Trace::new(3);
        for i in 0..10 {
            trace.record_delivery(&format!("line {i}"));
        }
        assert_eq!(trace.delivered(), ["line 0", "line 1", "line 2"]);

        let report = trace.report(RdtVersion::Rdt10, &SimConfig::default());
        assert_eq!(report.delivered_data.len(), 3);
        assert_eq!(report.deliveries_truncated, 7);
    }
}
