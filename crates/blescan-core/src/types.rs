//! Shared data model: hardware addresses, raw sightings and device records.
//!
//! A [`Sighting`] is what the radio reports (address, signal, raw name bytes).
//! A [`DeviceRecord`] is the canonical, sanitized form that flows through the
//! aggregator, the wire codec and the presenter on both sides of the link.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::CodecError;
use crate::sanitize::sanitize_name;

/// Name buffer size on the producer side, terminator included.
pub const PRODUCER_NAME_CAPACITY: usize = 32;

/// Name buffer size on the consumer side, terminator included.
pub const CONSUMER_NAME_CAPACITY: usize = 64;

/// Number of leading manufacturer bytes that hold the company identifier.
const COMPANY_ID_LEN: usize = 2;

/// How many manufacturer payload bytes must be printable before the payload
/// is accepted as a name.
const MANUFACTURER_PROBE_LEN: usize = 10;

static MAC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("MAC pattern is valid")
});

// ---------------------------------------------------------------------------
// MacAddress
// ---------------------------------------------------------------------------

/// A 6-byte Bluetooth device address.
///
/// Displays in the canonical wire form `XX:XX:XX:XX:XX:XX` (uppercase hex).
/// Two records with equal addresses denote the same physical device.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Create an address from its raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create an address from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidAddress`] if the slice is not exactly 6 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 6] = bytes.try_into().map_err(|_| CodecError::InvalidAddress {
            input: format!("{} bytes", bytes.len()),
        })?;
        Ok(Self(arr))
    }

    /// Parse a colon-separated address such as `"aa:bb:cc:dd:ee:ff"`.
    ///
    /// Hex digits are accepted in either case.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidAddress`] for anything else.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        if !MAC_PATTERN.is_match(s) {
            return Err(CodecError::InvalidAddress {
                input: s.to_owned(),
            });
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(s.split(':')) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| CodecError::InvalidAddress {
                input: s.to_owned(),
            })?;
        }
        Ok(Self(bytes))
    }

    /// Return the raw 6-byte address.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Advertisement payload
// ---------------------------------------------------------------------------

/// The advertisement fields a device name can be recovered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementData {
    /// Complete local name.
    pub complete_name: Option<Vec<u8>>,
    /// Shortened local name.
    pub short_name: Option<Vec<u8>>,
    /// Manufacturer-specific data, company identifier included.
    pub manufacturer_data: Option<Vec<u8>>,
}

impl AdvertisementData {
    /// Pick the raw name bytes for this advertisement.
    ///
    /// Order: complete name, shortened name, then the manufacturer payload
    /// (company identifier skipped) when its first bytes are printable.
    #[must_use]
    pub fn resolve_name(&self) -> Option<&[u8]> {
        fn non_empty(field: Option<&[u8]>) -> Option<&[u8]> {
            field.filter(|b| !b.is_empty())
        }

        non_empty(self.complete_name.as_deref())
            .or_else(|| non_empty(self.short_name.as_deref()))
            .or_else(|| self.manufacturer_name())
    }

    fn manufacturer_name(&self) -> Option<&[u8]> {
        let data = self.manufacturer_data.as_deref()?;
        if data.len() <= COMPANY_ID_LEN {
            return None;
        }
        let payload = &data[COMPANY_ID_LEN..];
        payload
            .iter()
            .take(MANUFACTURER_PROBE_LEN)
            .all(|b| (0x20..=0x7E).contains(b))
            .then_some(payload)
    }
}

// ---------------------------------------------------------------------------
// Sighting
// ---------------------------------------------------------------------------

/// One raw observation of a device during a scan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    /// Device address.
    pub address: MacAddress,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Raw advertised name bytes, if any were advertised.
    pub name: Option<Vec<u8>>,
}

impl Sighting {
    /// Create a sighting.
    #[must_use]
    pub const fn new(address: MacAddress, rssi: i16, name: Option<Vec<u8>>) -> Self {
        Self {
            address,
            rssi,
            name,
        }
    }

    /// Create a sighting from an advertisement, resolving the name bytes.
    #[must_use]
    pub fn from_advertisement(address: MacAddress, rssi: i16, advert: &AdvertisementData) -> Self {
        Self::new(address, rssi, advert.resolve_name().map(<[u8]>::to_vec))
    }
}

// ---------------------------------------------------------------------------
// DeviceRecord
// ---------------------------------------------------------------------------

/// One discovered device, as aggregated, transmitted and displayed.
///
/// `name` is `None` when the device advertised no name at all. `Some("")`
/// is possible when a name was advertised but nothing printable survived
/// sanitization; both count as "no name" for merging and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device address (identity key).
    pub address: MacAddress,

    /// Received signal strength in dBm; larger is stronger.
    #[serde(rename = "rssi_dbm")]
    pub signal_strength: i32,

    /// Printable device name.
    pub name: Option<String>,
}

impl DeviceRecord {
    /// Create a record.
    #[must_use]
    pub const fn new(address: MacAddress, signal_strength: i32, name: Option<String>) -> Self {
        Self {
            address,
            signal_strength,
            name,
        }
    }

    /// Build a record from a radio sighting, sanitizing the name into a buffer
    /// of `name_capacity` bytes (terminator included).
    #[must_use]
    pub fn from_sighting(sighting: &Sighting, name_capacity: usize) -> Self {
        let name = sighting
            .name
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| sanitize_name(raw, name_capacity));
        Self::new(sighting.address, i32::from(sighting.rssi), name)
    }

    /// Whether the record carries a non-empty name.
    #[must_use]
    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// The name, or an empty string when absent.
    #[must_use]
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}
