//! Human-readable descriptions of SAME headers.

use crate::alert::header::SameHeader;

/// Trait for turning a raw header into announcement text.
///
/// This trait allows swapping implementations (native tables vs mock).
pub trait HeaderDescriber: Send + Sync {
    /// Describe a header. Must not fail: unknown input yields generic text.
    fn describe(&self, header: &str) -> String;
}

/// Table-driven describer for NWS/FCC SAME codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameDescriber;

const ORIGINATORS: &[(&str, &str)] = &[
    ("EAS", "A broadcast or cable system"),
    ("CIV", "The civil authorities"),
    ("WXR", "The National Weather Service"),
    ("PEP", "The Primary Entry Point System"),
];

const EVENTS: &[(&str, &str)] = &[
    ("ADR", "Administrative Message"),
    ("AVA", "Avalanche Watch"),
    ("AVW", "Avalanche Warning"),
    ("BLU", "Blue Alert"),
    ("BZW", "Blizzard Warning"),
    ("CAE", "Child Abduction Emergency"),
    ("CDW", "Civil Danger Warning"),
    ("CEM", "Civil Emergency Message"),
    ("CFA", "Coastal Flood Watch"),
    ("CFW", "Coastal Flood Warning"),
    ("DMO", "Practice/Demo Warning"),
    ("DSW", "Dust Storm Warning"),
    ("EAN", "Emergency Action Notification"),
    ("EQW", "Earthquake Warning"),
    ("EVI", "Evacuation Immediate"),
    ("EWW", "Extreme Wind Warning"),
    ("FFA", "Flash Flood Watch"),
    ("FFS", "Flash Flood Statement"),
    ("FFW", "Flash Flood Warning"),
    ("FLA", "Flood Watch"),
    ("FLS", "Flood Statement"),
    ("FLW", "Flood Warning"),
    ("FRW", "Fire Warning"),
    ("HLS", "Hurricane Statement"),
    ("HMW", "Hazardous Materials Warning"),
    ("HUA", "Hurricane Watch"),
    ("HUW", "Hurricane Warning"),
    ("HWA", "High Wind Watch"),
    ("HWW", "High Wind Warning"),
    ("LAE", "Local Area Emergency"),
    ("LEW", "Law Enforcement Warning"),
    ("NPT", "National Periodic Test"),
    ("NUW", "Nuclear Power Plant Warning"),
    ("RHW", "Radiological Hazard Warning"),
    ("RMT", "Required Monthly Test"),
    ("RWT", "Required Weekly Test"),
    ("SMW", "Special Marine Warning"),
    ("SPS", "Special Weather Statement"),
    ("SPW", "Shelter in Place Warning"),
    ("SQW", "Snow Squall Warning"),
    ("SVA", "Severe Thunderstorm Watch"),
    ("SVR", "Severe Thunderstorm Warning"),
    ("SVS", "Severe Weather Statement"),
    ("TOA", "Tornado Watch"),
    ("TOE", "911 Telephone Outage Emergency"),
    ("TOR", "Tornado Warning"),
    ("TRA", "Tropical Storm Watch"),
    ("TRW", "Tropical Storm Warning"),
    ("TSA", "Tsunami Watch"),
    ("TSW", "Tsunami Warning"),
    ("VOW", "Volcano Warning"),
    ("WSA", "Winter Storm Watch"),
    ("WSW", "Winter Storm Warning"),
];

/// State FIPS code → postal abbreviation.
#[rustfmt::skip]
const STATES: &[(&str, &str)] = &[
    ("01", "AL"), ("02", "AK"), ("04", "AZ"), ("05", "AR"), ("06", "CA"),
    ("08", "CO"), ("09", "CT"), ("10", "DE"), ("11", "DC"), ("12", "FL"),
    ("13", "GA"), ("15", "HI"), ("16", "ID"), ("17", "IL"), ("18", "IN"),
    ("19", "IA"), ("20", "KS"), ("21", "KY"), ("22", "LA"), ("23", "ME"),
    ("24", "MD"), ("25", "MA"), ("26", "MI"), ("27", "MN"), ("28", "MS"),
    ("29", "MO"), ("30", "MT"), ("31", "NE"), ("32", "NV"), ("33", "NH"),
    ("34", "NJ"), ("35", "NM"), ("36", "NY"), ("37", "NC"), ("38", "ND"),
    ("39", "OH"), ("40", "OK"), ("41", "OR"), ("42", "PA"), ("44", "RI"),
    ("45", "SC"), ("46", "SD"), ("47", "TN"), ("48", "TX"), ("49", "UT"),
    ("50", "VT"), ("51", "VA"), ("53", "WA"), ("54", "WV"), ("55", "WI"),
    ("56", "WY"), ("60", "AS"), ("66", "GU"), ("69", "MP"), ("72", "PR"),
    ("78", "VI"),
];

fn lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn article(noun: &str) -> &'static str {
    match noun.chars().next() {
        Some(c) if "AEIOUaeiou89".contains(c) => "an",
        _ => "a",
    }
}

fn describe_location(code: &str) -> String {
    let state_code = &code[1..3];
    let county = &code[3..];
    let state = lookup(STATES, state_code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("state {state_code}"));
    if county == "000" {
        format!("all of {state}")
    } else {
        format!("{state} county {county}")
    }
}

fn describe_duration(minutes: u32) -> String {
    let (hours, mins) = (minutes / 60, minutes % 60);
    let plural = |n: u32, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    match (hours, mins) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{} {}", plural(h, "hour"), plural(m, "minute")),
    }
}

impl HeaderDescriber for SameDescriber {
    fn describe(&self, header: &str) -> String {
        let Some(parsed) = SameHeader::parse(header) else {
            return "An emergency alert was received, but its header could not be decoded"
                .to_string();
        };

        let originator = lookup(ORIGINATORS, &parsed.originator).unwrap_or("An unknown originator");
        let event = lookup(EVENTS, &parsed.event)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unrecognized Event {}", parsed.event));
        let locations = parsed
            .locations
            .iter()
            .map(|l| describe_location(l))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{} has issued {} {} for {}; beginning at {:02}:{:02} UTC on day {} of the year, \
             valid for {}. Message from {}",
            originator,
            article(&event),
            event,
            locations,
            parsed.issue_hour,
            parsed.issue_minute,
            parsed.issue_day,
            describe_duration(parsed.purge_minutes),
            parsed.sender,
        )
    }
}

/// Describer that returns a fixed string, for tests.
#[derive(Debug, Clone)]
pub struct MockDescriber {
    text: String,
}

impl MockDescriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl HeaderDescriber for MockDescriber {
    fn describe(&self, _header: &str) -> String {
        self.text.clone()
    }
}
