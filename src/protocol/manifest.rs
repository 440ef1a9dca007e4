/// Version manifest served next to the firmware images.
///
/// The body is a comma-delimited record whose first two fields are the
/// server's `major` and `minor` version, optionally behind a `label:` prefix,
/// e.g. `version:2,3,build-77`. Extra fields are ignored.
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest is empty")]
    Empty,
    #[error("manifest has no {0} field")]
    MissingField(&'static str),
    #[error("manifest {field} field {value:?} is not an unsigned integer")]
    BadNumber { field: &'static str, value: String },
}

/// Firmware version, ordered lexicographically on `(major, minor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct FirmwareVersion {
    #[serde(rename = "@major")]
    pub major: u32,
    #[serde(rename = "@minor")]
    pub minor: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether a server advertising `self` should replace `local`.
    pub fn is_newer_than(&self, local: &FirmwareVersion) -> bool {
        self > local
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for FirmwareVersion {
    type Err = ManifestError;

    /// `"1.4"` or `"1,4"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.trim().splitn(2, ['.', ',']);
        let major = number(fields.next(), "major")?;
        let minor = number(fields.next(), "minor")?;
        Ok(Self { major, minor })
    }
}

/// Parse the manifest body received from the server.
pub fn parse_manifest(body: &[u8]) -> Result<FirmwareVersion, ManifestError> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if text.is_empty() {
        return Err(ManifestError::Empty);
    }

    let record = match text.split_once(':') {
        Some((_label, rest)) => rest,
        None => text,
    };

    let mut fields = record.split(',');
    let major = number(fields.next(), "major")?;
    let minor = number(fields.next(), "minor")?;
    Ok(FirmwareVersion { major, minor })
}

fn number(field: Option<&str>, name: &'static str) -> Result<u32, ManifestError> {
    let value = field.map(str::trim).filter(|v| !v.is_empty());
    let value = value.ok_or(ManifestError::MissingField(name))?;
    value.parse().map_err(|_| ManifestError::BadNumber {
        field: name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32) -> FirmwareVersion {
        FirmwareVersion::new(major, minor)
    }

    #[test]
    fn test_parse_labelled_record() {
        assert_eq!(parse_manifest(b"version:2,3,...").unwrap(), v(2, 3));
        assert_eq!(parse_manifest(b"version: 10 , 0\r\n").unwrap(), v(10, 0));
    }

    #[test]
    fn test_parse_bare_record() {
        assert_eq!(parse_manifest(b"1,7").unwrap(), v(1, 7));
    }

    #[test]
    fn test_malformed_manifests() {
        assert!(matches!(parse_manifest(b"  \n"), Err(ManifestError::Empty)));
        assert!(matches!(
            parse_manifest(b"version:4"),
            Err(ManifestError::MissingField("minor"))
        ));
        assert!(matches!(
            parse_manifest(b"version:x,1"),
            Err(ManifestError::BadNumber { field: "major", .. })
        ));
        assert!(matches!(
            parse_manifest(b"version:1,-2"),
            Err(ManifestError::BadNumber { field: "minor", .. })
        ));
    }

    #[test]
    fn test_update_decision() {
        assert!(v(2, 0).is_newer_than(&v(1, 0)));
        assert!(!v(1, 0).is_newer_than(&v(1, 0)));
        assert!(!v(1, 5).is_newer_than(&v(1, 9)));
        assert!(!v(1, 9).is_newer_than(&v(1, 10)));
        assert!(v(1, 10).is_newer_than(&v(1, 9)));
        assert!(!v(0, 99).is_newer_than(&v(1, 0)));
    }

    #[test]
    fn test_version_from_str() {
        assert_eq!("1.0".parse::<FirmwareVersion>().unwrap(), v(1, 0));
        assert_eq!("3,12".parse::<FirmwareVersion>().unwrap(), v(3, 12));
        assert!("3".parse::<FirmwareVersion>().is_err());
        assert_eq!(v(4, 2).to_string(), "4.2");
    }
}
