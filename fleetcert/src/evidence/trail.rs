//! Ordered evidence of what was run on a device.

use serde::Serialize;

/// One command and the text recorded for it: output, or the error that
/// prevented it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceEntry {
    pub command: String,
    pub output: String,
}

/// Commands and outputs of one device for one test, in issue order.
///
/// Entries are stored as pairs so the two views can never drift apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvidenceTrail {
    entries: Vec<EvidenceEntry>,
}

impl EvidenceTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, command: impl Into<String>, output: impl Into<String>) {
        self.entries.push(EvidenceEntry {
            command: command.into(),
            output: output.into(),
        });
    }

    /// Commands, in order.
    pub fn commands(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.command.as_str()).collect()
    }

    /// Outputs, aligned with [`commands`](Self::commands).
    pub fn outputs(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.output.as_str()).collect()
    }

    pub fn entries(&self) -> &[EvidenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_stay_aligned() {
        let mut trail = EvidenceTrail::new();
        trail.push("show version", "EOS 4.31");
        trail.push("show bogus-cmd", "invalid command");

        assert_eq!(trail.commands(), vec!["show version", "show bogus-cmd"]);
        assert_eq!(trail.outputs(), vec!["EOS 4.31", "invalid command"]);
        assert_eq!(trail.commands().len(), trail.outputs().len());
    }

    #[test]
    fn test_serializes_as_list() {
        let mut trail = EvidenceTrail::new();
        trail.push("show clock", "10:00");
        let value = serde_json::to_value(&trail).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{ "command": "show clock", "output": "10:00" }])
        );
    }
}
