//! Line-level parsing of simulator event logs.
//!
//! Each line is `<Channel>|<payload>`. Free-text notifications carry a
//! `DEBUG (<node_id>): <detail>` payload.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use color_eyre::eyre::{Context, Result};
use regex::Regex;

use super::Notification;
use crate::topology::NodeId;

/// Compiled regex patterns for event log parsing
pub struct LogPatterns {
    /// Match: "Metric-BCAST|Normal,0,5,success,1"
    pub channel_line: Regex,
    /// Match: "DEBUG (12): The node has become a TFS"
    pub debug_line: Regex,
    /// Match: "The node has become a <Kind>" optionally followed by " was <Kind>"
    pub node_became: Regex,
}

impl LogPatterns {
    pub fn new() -> Self {
        Self {
            channel_line: Regex::new(
                r"^([A-Za-z][A-Za-z0-9_-]*)\|(.*)$"
            ).expect("Invalid channel_line regex"),
            debug_line: Regex::new(
                r"^DEBUG \((\d+)\): (.*)$"
            ).expect("Invalid debug_line regex"),
            node_became: Regex::new(
                r"^The node has become a ([a-zA-Z]+)(?: was ([a-zA-Z]+))?"
            ).expect("Invalid node_became regex"),
        }
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global patterns instance
pub static PATTERNS: LazyLock<LogPatterns> = LazyLock::new(LogPatterns::new);

/// A log line split at its channel tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    pub channel: &'a str,
    pub payload: &'a str,
}

/// Split `<Channel>|<payload>`; `None` for blank lines, comments and noise
pub fn split_channel(line: &str) -> Option<RawLine<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let caps = PATTERNS.channel_line.captures(line)?;
    Some(RawLine {
        channel: caps.get(1)?.as_str(),
        payload: caps.get(2)?.as_str(),
    })
}

/// Parse a `DEBUG (<node_id>): <detail>` payload
pub fn parse_notification(payload: &str) -> Option<Notification> {
    let caps = PATTERNS.debug_line.captures(payload.trim())?;
    let node_id: NodeId = caps.get(1)?.as_str().parse().ok()?;
    let detail = caps.get(2)?.as_str().to_string();

    Some(Notification { node_id, detail })
}

/// Parse "The node has become a <Kind>[ was <PrevKind>]" into the two kinds
pub fn parse_node_became(detail: &str) -> Option<(&str, Option<&str>)> {
    let caps = PATTERNS.node_became.captures(detail)?;
    let new_kind = caps.get(1)?.as_str();
    let old_kind = caps.get(2).map(|m| m.as_str());

    Some((new_kind, old_kind))
}

/// Open an event log for streaming replay
pub fn open_event_log(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open event log: {}", path.display()))?;

    Ok(BufReader::with_capacity(64 * 1024, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_channel() {
        let raw = split_channel("Attacker-RCV|0.0,Normal,0,7,7,1\n").unwrap();
        assert_eq!(raw.channel, "Attacker-RCV");
        assert_eq!(raw.payload, "0.0,Normal,0,7,7,1");

        assert!(split_channel("").is_none());
        assert!(split_channel("# replayed from seed 44").is_none());
        assert!(split_channel("garbage without a tag").is_none());
    }

    #[test]
    fn test_parse_notification() {
        let notification = parse_notification("DEBUG (12): The node has become a TFS").unwrap();
        assert_eq!(notification.node_id, 12);
        assert_eq!(notification.detail, "The node has become a TFS");

        assert!(parse_notification("INFO (12): hello").is_none());
    }

    #[test]
    fn test_node_became_regex() {
        assert_eq!(
            parse_node_became("The node has become a TempFakeNode was NormalNode"),
            Some(("TempFakeNode", Some("NormalNode")))
        );
        assert_eq!(parse_node_became("The node has become a PFS"), Some(("PFS", None)));
        assert_eq!(parse_node_became("Something else"), None);
    }
}
