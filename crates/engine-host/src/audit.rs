//! Audit records for events the host publishes.

use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::info;

/// Tracing target audit records are emitted on.
pub const AUDIT_TARGET: &str = "egeria_engine_host::audit";

/// Classification of a published out-topic event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AuditCode {
    /// An engine configuration change was announced.
    EngineConfigurationChange,

    /// A new engine action was announced.
    NewEngineAction,

    /// A service binding change was announced.
    ServiceBindingChange,

    /// A watchdog event was passed on.
    WatchdogEvent,

    /// Any other event.
    OtherEvent,
}

impl AuditCode {
    /// The stable message identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::EngineConfigurationChange => "ENGINE-HOST-OUT-0001",
            Self::NewEngineAction => "ENGINE-HOST-OUT-0002",
            Self::ServiceBindingChange => "ENGINE-HOST-OUT-0003",
            Self::WatchdogEvent => "ENGINE-HOST-OUT-0004",
            Self::OtherEvent => "ENGINE-HOST-OUT-0005",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::EngineConfigurationChange => "sent engine configuration change event",
            Self::NewEngineAction => "sent new engine action event",
            Self::ServiceBindingChange => "sent governance service binding change event",
            Self::WatchdogEvent => "sent watchdog event",
            Self::OtherEvent => "sent out-topic event",
        }
    }
}

impl Display for AuditCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One audit record.
#[derive(Clone, Debug)]
pub struct AuditRecord {
    /// Classification of the record.
    pub code: AuditCode,
    /// Server that wrote the record.
    pub server_name: String,
    /// Summary of the event the record is about.
    pub summary: String,
    /// When the record was written.
    pub recorded_at: SystemTime,
}

/// A bounded, shared log of audit records. The oldest records are dropped first.
#[derive(Clone, Debug)]
pub struct AuditLog {
    server_name: Arc<str>,
    capacity: usize,
    records: Arc<Mutex<VecDeque<AuditRecord>>>,
}

impl AuditLog {
    /// Creates an empty log keeping at most `capacity` records.
    #[must_use]
    pub fn new(server_name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            server_name: Arc::from(server_name.into()),
            capacity,
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Emits a record on the audit target and retains it.
    pub fn record(&self, code: AuditCode, summary: &str) {
        info!(
            target: AUDIT_TARGET,
            code = code.id(),
            server = %self.server_name,
            "{}: {} {}",
            code.id(),
            code.description(),
            summary
        );

        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(AuditRecord {
            code,
            server_name: self.server_name.to_string(),
            summary: summary.to_string(),
            recorded_at: SystemTime::now(),
        });
    }

    /// Copies of the retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Number of retained records with `code`.
    #[must_use]
    pub fn count(&self, code: AuditCode) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.code == code)
            .count()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            AuditCode::EngineConfigurationChange,
            AuditCode::NewEngineAction,
            AuditCode::ServiceBindingChange,
            AuditCode::WatchdogEvent,
            AuditCode::OtherEvent,
        ];
        let ids: std::collections::HashSet<_> = codes.iter().map(|code| code.id()).collect();
        assert_eq!(ids.len(), codes.len());
        assert_eq!(AuditCode::NewEngineAction.to_string(), "ENGINE-HOST-OUT-0002");
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_record_is_logged_and_retained() {
        let log = AuditLog::new("engine-host-1", 8);
        log.record(AuditCode::NewEngineAction, "EngineActionCreatedEvent a1");

        assert_eq!(log.len(), 1);
        assert_eq!(log.count(AuditCode::NewEngineAction), 1);
        assert_eq!(log.records()[0].server_name, "engine-host-1");
        assert!(logs_contain("ENGINE-HOST-OUT-0002"));
    }

    #[test]
    fn test_oldest_records_dropped() {
        let log = AuditLog::new("engine-host-1", 2);
        log.record(AuditCode::NewEngineAction, "first");
        log.record(AuditCode::WatchdogEvent, "second");
        log.record(AuditCode::OtherEvent, "third");

        let summaries: Vec<String> = log.records().into_iter().map(|r| r.summary).collect();
        assert_eq!(summaries, vec!["second".to_string(), "third".to_string()]);
    }
}
