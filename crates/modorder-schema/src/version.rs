use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid version '{0}', expected <major>.<minor>.<patch>")]
    Invalid(String),
}

/// A numeric `major.minor.patch` version.
///
/// Ordering is purely numeric on the triplet. Pre-release and build metadata
/// are accepted by the loose parser but not retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const ZERO: Version = Version::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse exactly `N.N.N`.
    pub fn parse_strict(input: &str) -> Result<Self, VersionError> {
        if input.is_empty() {
            return Err(VersionError::Empty);
        }
        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::Invalid(input.to_owned()));
        }
        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = parse_component(part).ok_or_else(|| VersionError::Invalid(input.to_owned()))?;
        }
        Ok(Self::new(nums[0], nums[1], nums[2]))
    }

    /// Parse leniently: optional `v`/`=` prefix, one to four components
    /// (missing ones are zero, a fourth revision component is dropped), and a
    /// trailing `-pre`/`+build` suffix is ignored.
    pub fn parse_loose(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let body = trimmed
            .trim_start_matches('=')
            .trim_start()
            .trim_start_matches(['v', 'V']);
        let core = body.split(['-', '+']).next().unwrap_or(body).trim();
        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(VersionError::Invalid(input.to_owned()));
        }
        let mut nums = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            let value =
                parse_component(part).ok_or_else(|| VersionError::Invalid(input.to_owned()))?;
            if i < 3 {
                nums[i] = value;
            }
        }
        Ok(Self::new(nums[0], nums[1], nums[2]))
    }

    pub fn parse(input: &str, loose: bool) -> Result<Self, VersionError> {
        if loose {
            Self::parse_loose(input)
        } else {
            Self::parse_strict(input)
        }
    }

    /// Pick a package version from, in priority order, an explicit metadata
    /// string, a version probed from a bundled binary, and finally zero.
    /// An explicit string that fails to parse falls through to the next tier.
    pub fn resolve(explicit: Option<&str>, probed: Option<Version>) -> Version {
        explicit
            .and_then(|s| Self::parse_loose(s).ok())
            .or(probed)
            .unwrap_or(Self::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

fn parse_component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_loose(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_loose(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = 0xFEEF_04BDu32.to_le_bytes();

/// Extract the file version from a PE binary's `VS_VERSIONINFO` resource.
///
/// Prefers the numeric `VS_FIXEDFILEINFO` block; falls back to the UTF-16
/// `FileVersion` string table entry.
pub fn probe_file_version(bytes: &[u8]) -> Option<Version> {
    fixed_file_version(bytes)
        .filter(|v| !v.is_zero())
        .or_else(|| string_file_version(bytes))
}

fn fixed_file_version(bytes: &[u8]) -> Option<Version> {
    let start = bytes
        .windows(4)
        .position(|w| w == FIXED_FILE_INFO_SIGNATURE)?;
    // dwSignature, dwStrucVersion, dwFileVersionMS, dwFileVersionLS
    let ms = read_u32_le(bytes, start + 8)?;
    let ls = read_u32_le(bytes, start + 12)?;
    Some(Version::new(
        u64::from(ms >> 16),
        u64::from(ms & 0xFFFF),
        u64::from(ls >> 16),
    ))
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes(slice.try_into().ok()?))
}

fn string_file_version(bytes: &[u8]) -> Option<Version> {
    let key: Vec<u8> = "FileVersion\0"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    let start = bytes.windows(key.len()).position(|w| w == key.as_slice())? + key.len();
    let units: Vec<u16> = bytes[start..]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .skip_while(|u| *u == 0)
        .take_while(|u| *u != 0)
        .take(64)
        .collect();
    let value = String::from_utf16(&units).ok()?;
    Version::parse_loose(&value).ok()
}
