//! Parsing of IUVS data product filenames.
//!
//! Names look like
//! `mvn_iuv_l1b_apoapse-orbit03400-muv_20160628T104609_v13_r01.fits.gz`:
//! spacecraft, instrument, processing level, an observation description made
//! of the orbit segment, orbit number and channel, the start time, and the
//! product version and revision.

use crate::types::{Channel, IuvsError, IuvsResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::Path;

const FILENAME_PATTERN: &str = r"^(?P<spacecraft>mvn)_(?P<instrument>iuv)_(?P<level>[a-z0-9]+)_(?P<description>[A-Za-z0-9-]+)_(?P<timestamp>\d{8}T\d{6})_(?P<version>v\d+)_(?P<revision>[rs]\d+)\.(?P<extension>fits(?:\.gz)?)$";

/// Components of an IUVS data filename
#[derive(Debug, Clone, PartialEq)]
pub struct DataFilename {
    pub filename: String,
    pub spacecraft: String,
    pub instrument: String,
    pub level: String,
    pub segment: String,
    pub orbit: u32,
    pub channel: Option<Channel>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub revision: String,
    pub extension: String,
}

impl DataFilename {
    /// Parse a bare filename
    pub fn parse(filename: &str) -> IuvsResult<Self> {
        let pattern = Regex::new(FILENAME_PATTERN)
            .map_err(|e| IuvsError::Processing(format!("Regex error: {}", e)))?;
        let captures = pattern
            .captures(filename)
            .ok_or_else(|| IuvsError::InvalidFilename(format!("'{}' is not an IUVS data filename", filename)))?;
        let field = |name: &str| captures.name(name).map(|m| m.as_str().to_string()).unwrap_or_default();

        let description = field("description");
        let (segment, orbit, channel) = parse_description(&description)
            .map_err(|reason| IuvsError::InvalidFilename(format!("'{}': {}", filename, reason)))?;

        let timestamp = NaiveDateTime::parse_from_str(&field("timestamp"), "%Y%m%dT%H%M%S")
            .map_err(|e| IuvsError::InvalidFilename(format!("'{}': bad timestamp: {}", filename, e)))?
            .and_utc();

        Ok(Self {
            filename: filename.to_string(),
            spacecraft: field("spacecraft"),
            instrument: field("instrument"),
            level: field("level"),
            segment,
            orbit,
            channel,
            timestamp,
            version: field("version"),
            revision: field("revision"),
            extension: field("extension"),
        })
    }

    /// Parse the final component of `path`
    pub fn from_path(path: &Path) -> IuvsResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IuvsError::InvalidFilename(format!("{} has no filename", path.display())))?;
        Self::parse(name)
    }

    /// Version number without its leading `v`
    pub fn version_number(&self) -> Option<u32> {
        self.version.trim_start_matches('v').parse().ok()
    }

    /// Revision number without its leading `r` or `s`
    pub fn revision_number(&self) -> Option<u32> {
        self.revision.get(1..)?.parse().ok()
    }
}

fn parse_description(description: &str) -> Result<(String, u32, Option<Channel>), String> {
    let parts: Vec<&str> = description.split('-').collect();
    let orbit_index = parts
        .iter()
        .position(|p| p.starts_with("orbit"))
        .ok_or_else(|| "no orbit in the description".to_string())?;

    let orbit = parts[orbit_index]
        .trim_start_matches("orbit")
        .parse::<u32>()
        .map_err(|e| format!("bad orbit number: {}", e))?;
    let segment = parts[..orbit_index].join("-");
    let channel = match parts.get(orbit_index + 1) {
        Some(token) => Some(token.parse::<Channel>().map_err(|e| e.to_string())?),
        None => None,
    };

    Ok((segment, orbit, channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_apoapse_filename() {
        let parsed = DataFilename::parse("mvn_iuv_l1b_apoapse-orbit03400-muv_20160628T104609_v13_r01.fits.gz").unwrap();
        assert_eq!(parsed.spacecraft, "mvn");
        assert_eq!(parsed.instrument, "iuv");
        assert_eq!(parsed.level, "l1b");
        assert_eq!(parsed.segment, "apoapse");
        assert_eq!(parsed.orbit, 3400);
        assert_eq!(parsed.channel, Some(Channel::Muv));
        assert_eq!(parsed.timestamp, Utc.with_ymd_and_hms(2016, 6, 28, 10, 46, 9).unwrap());
        assert_eq!(parsed.version_number(), Some(13));
        assert_eq!(parsed.revision_number(), Some(1));
        assert_eq!(parsed.extension, "fits.gz");
    }

    #[test]
    fn test_revision_number_of_edited_name() {
        let mut parsed = DataFilename::parse("mvn_iuv_l1b_apoapse-orbit03400-muv_20160628T104609_v13_r01.fits.gz").unwrap();
        parsed.revision = String::new();
        assert_eq!(parsed.revision_number(), None);
        parsed.revision = "é2".to_string();
        assert_eq!(parsed.revision_number(), None);
        parsed.revision = "s07".to_string();
        assert_eq!(parsed.revision_number(), Some(7));
    }

    #[test]
    fn test_multi_part_segment_without_channel() {
        let parsed = DataFilename::parse("mvn_iuv_l1a_outbound-hifi-orbit12345_20200101T000000_v02_s03.fits").unwrap();
        assert_eq!(parsed.segment, "outbound-hifi");
        assert_eq!(parsed.orbit, 12345);
        assert_eq!(parsed.channel, None);
        assert_eq!(parsed.extension, "fits");
    }

    #[test]
    fn test_invalid_filenames() {
        for bad in [
            "mvn_iuv_l1b_apoapse-muv_20160628T104609_v13_r01.fits.gz",
            "mvn_ngi_l1b_apoapse-orbit03400-muv_20160628T104609_v13_r01.fits.gz",
            "mvn_iuv_l1b_apoapse-orbit03400-muv_20160628T104609_v13_r01.xml",
            "mvn_iuv_l1b_apoapse-orbit03400-xuv_20160628T104609_v13_r01.fits",
            "mvn_iuv_l1b_apoapse-orbit03400-muv_20161328T104609_v13_r01.fits",
        ] {
            assert!(
                matches!(DataFilename::parse(bad), Err(IuvsError::InvalidFilename(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_from_path() {
        let path = Path::new("/data/orbit03400/mvn_iuv_l1b_apoapse-orbit03400-fuv_20160628T104609_v13_r01.fits.gz");
        assert_eq!(DataFilename::from_path(path).unwrap().channel, Some(Channel::Fuv));
    }
}
