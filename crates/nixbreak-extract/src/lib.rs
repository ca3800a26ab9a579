//! Error extraction from nix's `internal-json` build-log format.
//!
//! The extractor turns the raw log stream of a failed `nix-build` into
//! exactly one clean error message. It understands this one format only:
//! every non-blank line is `@nix ` followed by a JSON record with an
//! `action` field. Anything else is a malformed log, reported rather than
//! coerced, because a log the extractor cannot reconcile with the
//! one-failure-per-invocation assumption would silently change what the
//! resulting dataset means.

mod detail;
mod extract;
mod record;

pub use detail::{DetailLogSource, NixLogCli};
pub use extract::{extract, ExtractError};
pub use record::{LogRecord, LOG_PREFIX};
