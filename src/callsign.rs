//! Local station identifier.
//!
//! The callsign replaces the sender field of every relayed SAME header, so it
//! must satisfy the header's fixed-width field rules. It is validated once at
//! startup, before any monitor or processor thread exists.

use crate::defaults::{CALLSIGN_LEN, CALLSIGN_PUNCTUATION};
use crate::error::{RelayError, Result};
use std::fmt;

/// A validated 8-character station identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callsign(String);

impl Callsign {
    /// Validate and wrap a callsign.
    ///
    /// # Errors
    /// Returns `RelayError::InvalidCallsign` if the value is not exactly
    /// 8 characters or contains a character outside letters, digits and
    /// `-+?()[]._,/ `.
    pub fn parse(value: &str) -> Result<Self> {
        let len = value.chars().count();
        if len != CALLSIGN_LEN {
            return Err(RelayError::InvalidCallsign {
                callsign: value.to_string(),
                reason: format!("must be exactly {CALLSIGN_LEN} characters, got {len}"),
            });
        }

        if let Some(bad) = value.chars().find(|&c| !is_allowed(c)) {
            return Err(RelayError::InvalidCallsign {
                callsign: value.to_string(),
                reason: format!("character {bad:?} is not allowed"),
            });
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || CALLSIGN_PUNCTUATION.contains(c)
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_padded_callsign() {
        let callsign = Callsign::parse("JON435  ").unwrap();
        assert_eq!(callsign.as_str(), "JON435  ");
    }

    #[test]
    fn accepts_all_allowed_punctuation() {
        assert!(Callsign::parse("KX/Z-1.0").is_ok());
        assert!(Callsign::parse("(A)[B]+?").is_ok());
        assert!(Callsign::parse("W_X,Y 12").is_ok());
    }

    #[test]
    fn rejects_short_callsign() {
        match Callsign::parse("KXYZ") {
            Err(RelayError::InvalidCallsign { reason, .. }) => {
                assert!(reason.contains("got 4"), "unexpected reason: {reason}");
            }
            other => panic!("Expected InvalidCallsign, got {:?}", other),
        }
    }

    #[test]
    fn rejects_long_callsign() {
        assert!(Callsign::parse("KXYZ/NWS1").is_err());
    }

    #[test]
    fn rejects_empty_callsign() {
        assert!(Callsign::parse("").is_err());
    }

    #[test]
    fn rejects_out_of_set_character() {
        match Callsign::parse("KXYZ*NWS") {
            Err(RelayError::InvalidCallsign { reason, .. }) => {
                assert!(reason.contains("'*'"), "unexpected reason: {reason}");
            }
            other => panic!("Expected InvalidCallsign, got {:?}", other),
        }
    }

    #[test]
    fn rejects_non_ascii_letter() {
        // 8 characters but 'É' is outside the allowed set
        assert!(Callsign::parse("KÉXYZNWS").is_err());
    }

    #[test]
    fn rejects_tab() {
        assert!(Callsign::parse("KXYZ\tNWS").is_err());
    }

    #[test]
    fn display_round_trips_value() {
        let callsign = Callsign::parse("KXYZ/NWS").unwrap();
        assert_eq!(callsign.to_string(), "KXYZ/NWS");
    }
}
