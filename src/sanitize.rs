use crate::framing::RawPacket;
use crate::telemetry::COLUMNS;
use alloc::string::String;

/// Team identifier; every genuine telemetry line starts with it.
pub const START_MARKER: &str = "2078";

/// Garbage burst the XBee link injects in front of the trailer.
pub const NOISE: &str = "~}3AA";

const TRAILER: &str = "GOAT";

/// A validated telemetry line: starts at the team id, noise removed,
/// trailer kept as the last field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanRecord(String);

impl CleanRecord {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.split(',')
    }

    /// Pairs each field with its log column name. Extra fields beyond the
    /// 24-column schema are paired with `None`.
    pub fn labeled(&self) -> impl Iterator<Item = (Option<&'static str>, &str)> {
        let mut columns = COLUMNS.iter().copied();
        self.fields().map(move |field| (columns.next(), field))
    }

    pub fn field_count(&self) -> usize {
        self.fields().count()
    }
}

impl core::fmt::Display for CleanRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn sanitize_packet(packet: &RawPacket) -> Option<CleanRecord> {
    sanitize(&packet.to_text())
}

/// Cut everything before the start marker and strip the noise burst.
///
/// Returns `None` when the marker is missing. When the noise sat where the
/// separator before the trailer belongs, the separator is restored so the
/// trailer stays its own column.
pub fn sanitize(raw: &str) -> Option<CleanRecord> {
    let start = raw.find(START_MARKER)?;
    let valid = &raw[start..];

    if !valid.contains(NOISE) {
        return Some(CleanRecord(valid.into()));
    }

    // Removing one burst can splice a new one together; strip to a fixpoint.
    let mut cleaned = valid.replace(NOISE, "");
    while cleaned.contains(NOISE) {
        cleaned = cleaned.replace(NOISE, "");
    }
    let glued = cleaned
        .strip_suffix(TRAILER)
        .is_some_and(|body| !body.is_empty() && !body.ends_with(','));
    if glued {
        let split = cleaned.len() - TRAILER.len();
        cleaned.insert(split, ',');
    }

    Some(CleanRecord(cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_prefix_and_noise_removed() {
        let record = sanitize("garbage2078,A,B,C~}3AAGOAT").unwrap();
        assert_eq!(record.as_str(), "2078,A,B,C,GOAT");
    }

    #[test]
    fn test_missing_marker_is_invalid() {
        assert!(sanitize("CMD,1234,CX,ON,GOAT").is_none());
        assert!(sanitize("").is_none());
        assert!(sanitize("207,8GOAT").is_none());
    }

    #[test]
    fn test_clean_packet_untouched() {
        let raw = "2078,13:14:02,11,F,ASCENT,120.5,GOAT";
        assert_eq!(sanitize(raw).unwrap().as_str(), raw);
    }

    #[test]
    fn test_noise_removed_everywhere() {
        let record = sanitize("2078,~}3AA1,2~}3AA,3,GOAT").unwrap();
        assert_eq!(record.as_str(), "2078,1,2,3,GOAT");
    }

    #[test]
    fn test_nested_noise_fully_removed() {
        let record = sanitize("2078,~}3~}3AAAA,GOAT").unwrap();
        assert_eq!(record.as_str(), "2078,,GOAT");
    }

    #[test]
    fn test_separator_not_doubled() {
        let record = sanitize("2078,A,~}3AAGOAT").unwrap();
        assert_eq!(record.as_str(), "2078,A,GOAT");
    }

    #[test]
    fn test_first_marker_wins() {
        let record = sanitize("xx2078,2078,GOAT").unwrap();
        assert_eq!(record.as_str(), "2078,2078,GOAT");
    }

    #[test]
    fn test_idempotent_on_output() {
        let inputs = [
            "garbage2078,A,B,C~}3AAGOAT",
            "2078,1,2,3,GOAT",
            "~}3AA~}3AA2078,~}3AA,GOAT",
            "noise2078GOAT",
            "2078,~}3~}3AAAA,GOAT",
        ];

        for input in inputs {
            let once = sanitize(input).unwrap();
            let twice = sanitize(once.as_str()).unwrap();
            assert_eq!(once, twice, "input {input:?}");
        }
    }

    #[test]
    fn test_labeled_fields_follow_schema() {
        let record = sanitize("2078,00:00:01,7,GOAT").unwrap();
        let labeled: alloc::vec::Vec<_> = record.labeled().collect();

        assert_eq!(labeled[0], (Some("<TEAM ID>"), "2078"));
        assert_eq!(labeled[1], (Some("<MISSION_TIME>"), "00:00:01"));
        assert_eq!(labeled[2], (Some("<PACKET_COUNT>"), "7"));
        assert_eq!(record.field_count(), 4);
    }
}
