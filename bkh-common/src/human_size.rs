//! Human-readable byte sizes ("150G", "500M")
//!
//! Used for the free-space buffer the harvester keeps on the storage volume.
//! Parsing never fails: unreadable input is reported and replaced by
//! [`DEFAULT_BUFFER_BYTES`].

use tracing::warn;

/// 2^30 bytes
pub const GIB: u64 = 1 << 30;
/// 2^20 bytes
pub const MIB: u64 = 1 << 20;

/// Fallback buffer when the configured value is missing or unparsable (150 GiB)
pub const DEFAULT_BUFFER_BYTES: u64 = 150 * GIB;

/// Size unit suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Gibibytes,
    Mebibytes,
}

/// Suffix → unit lookup (case-insensitive)
const UNIT_TABLE: &[(char, SizeUnit)] = &[('G', SizeUnit::Gibibytes), ('M', SizeUnit::Mebibytes)];

impl SizeUnit {
    /// Byte multiplier for this unit
    pub const fn multiplier(self) -> u64 {
        match self {
            SizeUnit::Gibibytes => GIB,
            SizeUnit::Mebibytes => MIB,
        }
    }

    /// Look up a unit by its suffix letter
    pub fn from_suffix(suffix: char) -> Option<Self> {
        let upper = suffix.to_ascii_uppercase();
        UNIT_TABLE
            .iter()
            .find(|(letter, _)| *letter == upper)
            .map(|(_, unit)| *unit)
    }
}

/// Parse a buffer size string such as `"150G"` or `"500M"` into bytes
///
/// - `None` or blank: warning, 150 GiB
/// - bare number: interpreted as GiB
/// - unknown unit letter: warning, interpreted as GiB
/// - unparsable number or overflow: warning, 150 GiB
///
/// # Examples
///
/// ```
/// use bkh_common::human_size::{parse_buffer, GIB, MIB};
///
/// assert_eq!(parse_buffer(Some("150G")), 150 * GIB);
/// assert_eq!(parse_buffer(Some("500M")), 500 * MIB);
/// assert_eq!(parse_buffer(Some("bogus")), 150 * GIB);
/// assert_eq!(parse_buffer(None), 150 * GIB);
/// ```
pub fn parse_buffer(value: Option<&str>) -> u64 {
    let raw = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            warn!("buffer not set. Using 150G");
            return DEFAULT_BUFFER_BYTES;
        }
    };

    // Safe: raw is non-empty
    let last = raw.chars().last().unwrap_or('G');
    let (number, unit) = if last.is_ascii_digit() {
        (raw, SizeUnit::Gibibytes)
    } else {
        let number = &raw[..raw.len() - last.len_utf8()];
        let unit = match SizeUnit::from_suffix(last) {
            Some(unit) => unit,
            None => {
                warn!(buffer = %raw, "could not read unit. Using G");
                SizeUnit::Gibibytes
            }
        };
        (number, unit)
    };

    match number.trim().parse::<u64>() {
        Ok(amount) => match amount.checked_mul(unit.multiplier()) {
            Some(bytes) => bytes,
            None => {
                warn!(buffer = %raw, "buffer value too large. Using 150G");
                DEFAULT_BUFFER_BYTES
            }
        },
        Err(_) => {
            warn!(buffer = %raw, "could not parse buffer. Using 150G");
            DEFAULT_BUFFER_BYTES
        }
    }
}

/// Format a byte count with the largest unit that keeps it readable
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.1}G", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1}M", bytes as f64 / MIB as f64)
    } else {
        format!("{}B", bytes)
    }
}
