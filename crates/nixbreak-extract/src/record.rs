//! Structured log records.
//!
//! nix's `--log-format internal-json` emits one record per line, framed
//! with a fixed prefix. The `action` values we recognize form a closed
//! set; everything else lands in the catch-all variant, which the
//! extractor treats as a format violation instead of skipping.

use serde::Deserialize;

/// Framing prefix carried by every structured log line.
pub const LOG_PREFIX: &str = "@nix ";

/// One parsed log record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum LogRecord {
    /// A log message. Only these can carry an error.
    Msg {
        /// Verbosity level as emitted by nix.
        #[serde(default)]
        level: Option<u64>,
        /// The formatted message text.
        msg: String,
        /// The unformatted message text, when present.
        #[serde(default)]
        raw_msg: Option<String>,
    },
    /// An activity started.
    Start {},
    /// An activity stopped.
    Stop {},
    /// An activity progress result.
    Result {},
    /// Any action outside the recognized set.
    #[serde(other)]
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_msg_record() {
        let json = r#"{"action":"msg","level":0,"msg":"boom","raw_msg":"raw boom"}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        match record {
            LogRecord::Msg {
                level,
                msg,
                raw_msg,
            } => {
                assert_eq!(level, Some(0));
                assert_eq!(msg, "boom");
                assert_eq!(raw_msg.as_deref(), Some("raw boom"));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_parse_msg_without_raw_msg() {
        let json = r#"{"action":"msg","msg":"plain"}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(record, LogRecord::Msg { raw_msg: None, .. }));
    }

    #[test]
    fn test_msg_without_msg_field_is_an_error() {
        let json = r#"{"action":"msg","level":0}"#;
        assert!(serde_json::from_str::<LogRecord>(json).is_err());
    }

    #[test]
    fn test_parse_activity_records_ignoring_payload() {
        for json in [
            r#"{"action":"start","id":1,"type":105,"text":"building"}"#,
            r#"{"action":"stop","id":1}"#,
            r#"{"action":"result","id":1,"type":101,"fields":["out"]}"#,
        ] {
            let record: LogRecord = serde_json::from_str(json).unwrap();
            assert!(!matches!(record, LogRecord::Msg { .. }));
            assert!(!matches!(record, LogRecord::Unrecognized));
        }
    }

    #[test]
    fn test_unknown_action_hits_catch_all() {
        let json = r#"{"action":"setPhase","phase":"buildPhase"}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(record, LogRecord::Unrecognized));
    }

    #[test]
    fn test_missing_action_is_an_error() {
        assert!(serde_json::from_str::<LogRecord>(r#"{"msg":"x"}"#).is_err());
    }
}
