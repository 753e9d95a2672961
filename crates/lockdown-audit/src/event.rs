use serde::Serialize;

/// One decision made by the DNS proxy, destined for the audit log.
///
/// Serializes as a single JSON object with keys `ts, client_ip, domain,
/// allowed`, matching the on-disk format exactly — this type's field names
/// and order are part of that contract, not an implementation detail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    ts: i64,
    client_ip: String,
    domain: String,
    allowed: bool,
}

impl AuditEvent {
    /// `ts_nanos` is nanoseconds since the Unix epoch. Callers, not this
    /// type, own the clock so that tests can supply deterministic values.
    pub fn new(ts_nanos: i64, client_ip: impl Into<String>, domain: impl Into<String>, allowed: bool) -> Self {
        Self {
            ts: ts_nanos,
            client_ip: client_ip.into(),
            domain: domain.into(),
            allowed,
        }
    }

    /// Renders the event as one line of compact JSON, newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("AuditEvent always serializes");
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_the_documented_keys_and_a_trailing_newline() {
        let event = AuditEvent::new(1_700_000_000_000_000_000, "127.0.0.1", "example.com", true);

        let line = event.to_line();

        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["ts"], 1_700_000_000_000_000_000i64);
        assert_eq!(parsed["client_ip"], "127.0.0.1");
        assert_eq!(parsed["domain"], "example.com");
        assert_eq!(parsed["allowed"], true);
    }
}
