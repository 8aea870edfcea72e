use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BeaconError, Result};
use crate::model::exception::ExceptionEvent;

/// Content address of an error: SHA-256 over `type:message:first_frame`.
///
/// Only the first stack frame takes part, so errors that differ deeper in the
/// trace collapse into one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorHash(String);

impl ErrorHash {
    pub fn of(exception: &ExceptionEvent) -> Self {
        let first_frame = exception
            .stacktrace
            .first()
            .map(String::as_str)
            .unwrap_or_default();
        let input = format!(
            "{}:{}:{}",
            exception.error_type, exception.message, first_frame
        );
        Self(hex::encode(Sha256::digest(input.as_bytes())))
    }

    pub fn parse(input: &str) -> Result<Self> {
        if input.len() != 64 || !input.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BeaconError::Parse(format!("invalid error hash: {input}")));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exception(frames: &[&str]) -> ExceptionEvent {
        ExceptionEvent {
            error_type: "TypeError".into(),
            message: "x undefined".into(),
            stacktrace: frames.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn hashes_type_message_and_first_frame() {
        let hash = ErrorHash::of(&exception(&["at foo"]));
        let expected = hex::encode(Sha256::digest(b"TypeError:x undefined:at foo"));
        assert_eq!(hash.as_str(), expected);
    }

    #[test]
    fn ignores_deeper_frames() {
        assert_eq!(
            ErrorHash::of(&exception(&["at foo", "at bar"])),
            ErrorHash::of(&exception(&["at foo", "at baz"]))
        );
        assert_ne!(
            ErrorHash::of(&exception(&["at foo"])),
            ErrorHash::of(&exception(&["at qux"]))
        );
    }

    #[test]
    fn empty_trace_hashes_empty_frame() {
        let hash = ErrorHash::of(&exception(&[]));
        let expected = hex::encode(Sha256::digest(b"TypeError:x undefined:"));
        assert_eq!(hash.as_str(), expected);
    }

    #[test]
    fn parses_hashes() {
        let hash = ErrorHash::of(&exception(&["at foo"]));
        assert_eq!(ErrorHash::parse(hash.as_str()).unwrap(), hash);
        assert!(ErrorHash::parse("abc").is_err());
        assert!(ErrorHash::parse(&"z".repeat(64)).is_err());
    }
}
