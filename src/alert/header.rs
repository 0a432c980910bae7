//! SAME header parsing and rewriting.
//!
//! A SAME header has the shape
//! `ZCZC-ORG-EEE-PSSCCC-PSSCCC+TTTT-JJJHHMM-LLLLLLLL-`: originator, event,
//! one or more location codes, purge time, issue time and sender id.

use crate::callsign::Callsign;
use crate::defaults::{EOM_TOKEN, START_TOKEN};
use crate::error::{RelayError, Result};
use sha2::{Digest, Sha256};

/// Extract the header from a decoder output line.
///
/// Returns `None` if the line carries no start token. Any decoration before
/// the start token (such as `EAS: `) is removed.
pub fn extract_header(line: &str) -> Option<&str> {
    let start = line.find(START_TOKEN)?;
    Some(line[start..].trim())
}

/// True if the decoder output line signals end of message.
pub fn is_end_of_message(line: &str) -> bool {
    line.contains(EOM_TOKEN)
}

/// Content hash used as the dedup key for a header.
pub fn header_hash(header: &str) -> String {
    format!("{:x}", Sha256::digest(header.as_bytes()))
}

/// Replace the sender field of a header with the local callsign.
///
/// The sender is the field after the issue time. Terminated headers that do
/// not parse fall back to replacing the last field before the trailing `-`.
///
/// # Errors
/// Returns `RelayError::Encode` if the header is not `-`-terminated or has no
/// field before the terminator.
pub fn substitute_station(header: &str, callsign: &Callsign) -> Result<String> {
    if let Some(parsed) = SameHeader::parse(header) {
        let prefix_len = header.len() - parsed.sender.len() - 1;
        if header.ends_with('-') && header[prefix_len..].starts_with(&parsed.sender) {
            return Ok(format!("{}{}-", &header[..prefix_len], callsign));
        }
    }

    // The sender is only the second-to-last field when the header is terminated
    let mut segments: Vec<&str> = header.split('-').collect();
    if !header.ends_with('-') || segments.len() < 3 {
        return Err(RelayError::Encode {
            message: format!("header has no sender field: {header:?}"),
        });
    }
    let sender_idx = segments.len() - 2;
    segments[sender_idx] = callsign.as_str();
    Ok(segments.join("-"))
}

/// Structured view of a SAME header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SameHeader {
    pub originator: String,
    pub event: String,
    pub locations: Vec<String>,
    /// Purge time (valid duration) in minutes.
    pub purge_minutes: u32,
    /// Ordinal day of the year the alert was issued (UTC).
    pub issue_day: u16,
    pub issue_hour: u8,
    pub issue_minute: u8,
    pub sender: String,
}

impl SameHeader {
    /// Parse a header; returns `None` on any structural mismatch.
    pub fn parse(header: &str) -> Option<Self> {
        let body = header.trim().strip_prefix(START_TOKEN)?;
        let (codes, timing) = body.split_once('+')?;

        let mut fields = codes.split('-');
        let originator = fields.next().filter(|f| f.len() == 3)?.to_string();
        let event = fields.next().filter(|f| f.len() == 3)?.to_string();
        let locations: Vec<String> = fields.map(str::to_string).collect();
        if locations.is_empty()
            || locations
                .iter()
                .any(|l| l.len() != 6 || !l.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }

        // TTTT-JJJHHMM-<sender>-
        let (purge, rest) = timing.split_once('-')?;
        let (issued, sender) = rest.split_once('-')?;
        let sender = sender.strip_suffix('-').unwrap_or(sender);
        let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(purge, 4) || !digits(issued, 7) || sender.is_empty() {
            return None;
        }

        let purge_hours: u32 = purge[..2].parse().ok()?;
        let purge_mins: u32 = purge[2..].parse().ok()?;

        Some(Self {
            originator,
            event,
            locations,
            purge_minutes: purge_hours * 60 + purge_mins,
            issue_day: issued[..3].parse().ok()?,
            issue_hour: issued[3..5].parse().ok()?,
            issue_minute: issued[5..].parse().ok()?,
            sender: sender.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ZCZC-WXR-TOR-024031-024033+0030-1231745-KLWX/NWS-";

    #[test]
    fn extract_header_strips_prefix() {
        let line = format!("EAS: {HEADER}");
        assert_eq!(extract_header(&line), Some(HEADER));
    }

    #[test]
    fn extract_header_without_prefix() {
        assert_eq!(extract_header(HEADER), Some(HEADER));
    }

    #[test]
    fn extract_header_ignores_other_lines() {
        assert_eq!(extract_header("NNNN"), None);
        assert_eq!(extract_header("samedec: carrier detected"), None);
    }

    #[test]
    fn eom_detection() {
        assert!(is_end_of_message("NNNN"));
        assert!(is_end_of_message("EAS: NNNN"));
        assert!(!is_end_of_message(HEADER));
    }

    #[test]
    fn header_hash_is_stable_and_distinct() {
        assert_eq!(header_hash(HEADER), header_hash(HEADER));
        assert_ne!(header_hash(HEADER), header_hash("ZCZC-WXR-RWT-024031+0030-1231745-KLWX/NWS-"));
        assert_eq!(header_hash(HEADER).len(), 64);
    }

    #[test]
    fn parse_full_header() {
        let parsed = SameHeader::parse(HEADER).unwrap();
        assert_eq!(parsed.originator, "WXR");
        assert_eq!(parsed.event, "TOR");
        assert_eq!(parsed.locations, vec!["024031", "024033"]);
        assert_eq!(parsed.purge_minutes, 30);
        assert_eq!(parsed.issue_day, 123);
        assert_eq!(parsed.issue_hour, 17);
        assert_eq!(parsed.issue_minute, 45);
        assert_eq!(parsed.sender, "KLWX/NWS");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SameHeader::parse("ZCZC-garbage").is_none());
        assert!(SameHeader::parse("NNNN").is_none());
        assert!(SameHeader::parse("ZCZC-WXR-TOR-24031+0030-1231745-KLWX/NWS-").is_none());
        assert!(SameHeader::parse("ZCZC-WXR-TOR-024031+0030-1231745--").is_none());
    }

    #[test]
    fn substitute_replaces_sender_only() {
        let callsign = Callsign::parse("JON435  ").unwrap();
        let rewritten = substitute_station(HEADER, &callsign).unwrap();
        assert_eq!(
            rewritten,
            "ZCZC-WXR-TOR-024031-024033+0030-1231745-JON435  -"
        );
    }

    #[test]
    fn substitute_handles_sender_containing_dash() {
        let header = "ZCZC-CIV-CEM-024000+0100-0010000-KX-Z/NWS-";
        let callsign = Callsign::parse("KXYZ/NWS").unwrap();
        let rewritten = substitute_station(header, &callsign).unwrap();
        assert_eq!(rewritten, "ZCZC-CIV-CEM-024000+0100-0010000-KXYZ/NWS-");
    }

    #[test]
    fn substitute_falls_back_to_second_to_last_field() {
        let callsign = Callsign::parse("KXYZ/NWS").unwrap();
        let rewritten = substitute_station("ZCZC-ODD-OLD-", &callsign).unwrap();
        assert_eq!(rewritten, "ZCZC-ODD-KXYZ/NWS-");
    }

    #[test]
    fn substitute_rejects_single_field() {
        let callsign = Callsign::parse("KXYZ/NWS").unwrap();
        assert!(substitute_station("ZCZC", &callsign).is_err());
    }

    #[test]
    fn substitute_rejects_unterminated_header() {
        let callsign = Callsign::parse("KXYZ/NWS").unwrap();
        let result = substitute_station("ZCZC-WXR-TOR-024031+0030-1231745-KLWX/NWS", &callsign);
        assert!(matches!(result, Err(RelayError::Encode { .. })));
        assert!(substitute_station("ZCZC-", &callsign).is_err());
    }
}
