// src/exec/protocol.rs

//! Line classification for interpreter output.
//!
//! A line whose trimmed text starts with the progress marker is a progress
//! update; every other non-blank stdout line is log output; blank lines are
//! dropped. Lines from the diagnostic stream are errors. The classifier is
//! stateless and preserves order.

use std::sync::OnceLock;

use regex::Regex;

/// Marker reserved for progress updates. Scripts must not print it for
/// anything else.
pub const DEFAULT_PROGRESS_MARKER: &str = "PROGRESS:";

/// One classified line of interpreter output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Text after the progress marker.
    Progress(String),
    Log(String),
    Error(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Progress(s) | OutputLine::Log(s) | OutputLine::Error(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressProtocol {
    marker: String,
}

impl Default for ProgressProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_MARKER)
    }
}

impl ProgressProtocol {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Classify one stdout line. Returns `None` for blank lines.
    pub fn classify(&self, line: &str) -> Option<OutputLine> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.strip_prefix(self.marker.as_str()) {
            Some(rest) => Some(OutputLine::Progress(rest.trim().to_string())),
            None => Some(OutputLine::Log(trimmed.to_string())),
        }
    }

    /// Classify one diagnostic-stream line. Returns `None` for blank lines.
    pub fn classify_error(&self, line: &str) -> Option<OutputLine> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(OutputLine::Error(trimmed.to_string()))
        }
    }

    /// Classify a whole block of captured stdout text.
    pub fn classify_output(&self, text: &str) -> Vec<OutputLine> {
        text.lines().filter_map(|line| self.classify(line)).collect()
    }
}

/// A progress text split into an optional leading percentage and the rest.
///
/// `"40% Exporting roles"` gives `percent = Some(40)`,
/// `message = "Exporting roles"`. Percentages above 100 clamp to 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: Option<u8>,
    pub message: String,
}

impl ProgressUpdate {
    pub fn parse(text: &str) -> Self {
        static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
        let re = PERCENT.get_or_init(|| Regex::new(r"^\s*(\d{1,3})\s*%\s*(.*)$").ok());

        if let Some(caps) = re.as_ref().and_then(|re| re.captures(text)) {
            let percent = caps[1].parse::<u16>().ok().map(|p| p.min(100) as u8);
            let rest = caps[2].trim();
            let message = if rest.is_empty() {
                text.trim().to_string()
            } else {
                rest.to_string()
            };
            return Self { percent, message };
        }

        Self {
            percent: None,
            message: text.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_block_splits_into_progress_and_log() {
        let protocol = ProgressProtocol::default();
        let lines = protocol.classify_output("PROGRESS:Found 3 items\nSaved: file.json\n");

        assert_eq!(
            lines,
            vec![
                OutputLine::Progress("Found 3 items".to_string()),
                OutputLine::Log("Saved: file.json".to_string()),
            ]
        );
    }

    #[test]
    fn blank_lines_are_dropped() {
        let protocol = ProgressProtocol::default();
        assert_eq!(protocol.classify(""), None);
        assert_eq!(protocol.classify("   \t"), None);
        assert_eq!(protocol.classify_error("  "), None);
        assert!(protocol.classify_output("\n\n  \n").is_empty());
    }

    #[test]
    fn marker_must_start_the_trimmed_line() {
        let protocol = ProgressProtocol::default();
        assert_eq!(
            protocol.classify("   PROGRESS:indented"),
            Some(OutputLine::Progress("indented".to_string()))
        );
        assert_eq!(
            protocol.classify("note PROGRESS:not at start"),
            Some(OutputLine::Log("note PROGRESS:not at start".to_string()))
        );
        assert_eq!(
            protocol.classify("progress:lowercase"),
            Some(OutputLine::Log("progress:lowercase".to_string()))
        );
    }

    #[test]
    fn custom_marker_is_honoured() {
        let protocol = ProgressProtocol::new("##pct##");
        assert_eq!(
            protocol.classify("##pct## halfway"),
            Some(OutputLine::Progress("halfway".to_string()))
        );
        assert_eq!(
            protocol.classify("PROGRESS:ignored"),
            Some(OutputLine::Log("PROGRESS:ignored".to_string()))
        );
    }

    #[test]
    fn diagnostic_lines_become_errors() {
        let protocol = ProgressProtocol::default();
        assert_eq!(
            protocol.classify_error("PROGRESS:still an error"),
            Some(OutputLine::Error("PROGRESS:still an error".to_string()))
        );
    }

    #[test]
    fn progress_update_reads_leading_percentage() {
        assert_eq!(
            ProgressUpdate::parse("40% Exporting roles"),
            ProgressUpdate {
                percent: Some(40),
                message: "Exporting roles".to_string()
            }
        );
        assert_eq!(ProgressUpdate::parse("250%").percent, Some(100));
        assert_eq!(
            ProgressUpdate::parse("Found 3 items"),
            ProgressUpdate {
                percent: None,
                message: "Found 3 items".to_string()
            }
        );
        assert_eq!(ProgressUpdate::parse("Step 3 of 10").percent, None);
    }
}
