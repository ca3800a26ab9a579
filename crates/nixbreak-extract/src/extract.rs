//! The extraction pass over a raw build-log stream.

use std::io;
use std::sync::OnceLock;

use regex_lite::Regex;
use thiserror::Error;

use crate::detail::DetailLogSource;
use crate::record::{LogRecord, LOG_PREFIX};

/// Messages with this prefix are fetch-progress noise, not errors.
const BENIGN_PREFIX: &str = "fetching path input ";

/// Errors from log extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A line the extractor does not recognize as part of the format.
    #[error("malformed build log ({reason}): {line}")]
    MalformedLog { line: String, reason: String },

    /// The stream did not contain exactly one qualifying error message.
    #[error("expected exactly one error message, found {found}")]
    UnexpectedErrorCount { found: usize },

    /// The referenced detail log could not be retrieved.
    #[error("failed to fetch detail log {location}")]
    DetailLog {
        location: String,
        #[source]
        source: io::Error,
    },
}

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Terminal control and formatting sequences.
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap()
    })
}

fn detail_log_pointer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"nix log (/nix/store/.*\.drv)").unwrap())
}

fn strip_ansi(text: &str) -> String {
    ansi_escape().replace_all(text, "").into_owned()
}

fn parse_line(line: &str) -> Result<LogRecord, ExtractError> {
    let payload = line
        .strip_prefix(LOG_PREFIX)
        .ok_or_else(|| ExtractError::MalformedLog {
            line: line.to_string(),
            reason: format!("missing {LOG_PREFIX:?} prefix"),
        })?;
    serde_json::from_str(payload).map_err(|err| ExtractError::MalformedLog {
        line: line.to_string(),
        reason: err.to_string(),
    })
}

/// Extract the single error message from a raw `internal-json` log stream.
///
/// Collects the unformatted text of every qualifying `msg` record, once
/// per stream dereferencing an embedded `nix log /nix/store/….drv`
/// pointer through `detail` (the substituted text is not rescanned), and
/// strips terminal escape sequences. Exactly one collected message is
/// required.
pub fn extract(output: &str, detail: &dyn DetailLogSource) -> Result<String, ExtractError> {
    let mut messages = Vec::new();

    for line in output.split('\n') {
        if line.is_empty() {
            continue;
        }
        let record = parse_line(line)?;
        let (msg, raw_msg) = match record {
            LogRecord::Msg { msg, raw_msg, .. } => (msg, raw_msg),
            LogRecord::Unrecognized => {
                return Err(ExtractError::MalformedLog {
                    line: line.to_string(),
                    reason: "unrecognized action".to_string(),
                })
            }
            _ => continue,
        };
        if msg.starts_with(BENIGN_PREFIX) {
            continue;
        }
        // Only the unformatted variant is collected; formatted-only
        // records carry no error payload worth keeping.
        let Some(mut text) = raw_msg else {
            continue;
        };
        if let Some(captures) = detail_log_pointer().captures(&text) {
            let location = captures[1].to_string();
            text = detail
                .fetch(&location)
                .map_err(|source| ExtractError::DetailLog { location, source })?;
        }
        messages.push(strip_ansi(&text));
    }

    if messages.len() != 1 {
        return Err(ExtractError::UnexpectedErrorCount {
            found: messages.len(),
        });
    }
    Ok(messages.remove(0))
}
