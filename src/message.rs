//! Typed RAVEn message shapes and field decoding.
//!
//! The RAVEn stick emits XML fragments whose numeric fields are hex text
//! (e.g. `0x000003e8`). Fields stay as strings until [`reading`] parses
//! them, so a fragment that frames cleanly but carries garbage numbers is
//! reported against the exact offending field.
//!
//! [`reading`]: InstantaneousDemand::reading

use serde::Deserialize;
use thiserror::Error;

/// A field that could not be parsed as a 32-bit unsigned integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} is not a valid 32-bit unsigned integer: {value:?}")]
pub struct ParseError {
    /// Name of the offending XML element.
    pub field: &'static str,
    /// The raw text that failed to parse.
    pub value: String,
}

/// One reading of current power draw.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstantaneousDemand {
    #[serde(rename = "DeviceMacId")]
    pub device_mac_id: String,
    #[serde(rename = "MeterMacId")]
    pub meter_mac_id: String,
    #[serde(rename = "Demand")]
    pub demand: String,
    #[serde(rename = "Multiplier")]
    pub multiplier: String,
    #[serde(rename = "Divisor")]
    pub divisor: String,
}

/// One reading of cumulative delivered energy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentSummationDelivered {
    #[serde(rename = "DeviceMacId")]
    pub device_mac_id: String,
    #[serde(rename = "MeterMacId")]
    pub meter_mac_id: String,
    #[serde(rename = "SummationDelivered")]
    pub summation_delivered: String,
    #[serde(rename = "Multiplier")]
    pub multiplier: String,
    #[serde(rename = "Divisor")]
    pub divisor: String,
}

/// A complete message framed off the serial stream.
///
/// The message vocabulary is small and fixed, so this is a closed sum type
/// rather than open-ended dynamic dispatch; routing over it is exhaustive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RavenMessage {
    Demand(InstantaneousDemand),
    Summation(CurrentSummationDelivered),
}

impl RavenMessage {
    /// The kind tag of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            RavenMessage::Demand(_) => MessageKind::Demand,
            RavenMessage::Summation(_) => MessageKind::Summation,
        }
    }
}

/// Message kind, used as the `message_type` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    Demand,
    Summation,
}

impl MessageKind {
    /// Label value for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Demand => "demand",
            MessageKind::Summation => "summation",
        }
    }
}

/// Numeric inputs for unit conversion, decoded from one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Raw demand or summation value.
    pub value: u32,
    pub multiplier: u32,
    pub divisor: u32,
}

impl InstantaneousDemand {
    /// Decode the numeric fields of this message.
    pub fn reading(&self) -> Result<Reading, ParseError> {
        Ok(Reading {
            value: parse_field("Demand", &self.demand)?,
            multiplier: parse_field("Multiplier", &self.multiplier)?,
            divisor: parse_field("Divisor", &self.divisor)?,
        })
    }
}

impl CurrentSummationDelivered {
    /// Decode the numeric fields of this message.
    pub fn reading(&self) -> Result<Reading, ParseError> {
        Ok(Reading {
            value: parse_field("SummationDelivered", &self.summation_delivered)?,
            multiplier: parse_field("Multiplier", &self.multiplier)?,
            divisor: parse_field("Divisor", &self.divisor)?,
        })
    }
}

/// Parse a string field as `u32`, accepting decimal or `0x`-prefixed hex.
///
/// The device encodes numeric fields as hex text; decimal is accepted for
/// completeness. Anything else, or a value past the 32-bit range, is a
/// protocol violation and fails.
pub fn parse_field(field: &'static str, value: &str) -> Result<u32, ParseError> {
    let text = value.trim();

    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse::<u32>()
    };

    parsed.map_err(|_| ParseError {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_hex() {
        assert_eq!(parse_field("Demand", "0x0000a0").unwrap(), 160);
        assert_eq!(parse_field("Divisor", "0x000003e8").unwrap(), 1000);
        assert_eq!(parse_field("Multiplier", "0X01").unwrap(), 1);
        assert_eq!(parse_field("Demand", "0xFFFFFFFF").unwrap(), u32::MAX);
    }

    #[test]
    fn test_parse_field_decimal() {
        assert_eq!(parse_field("Demand", "160").unwrap(), 160);
        assert_eq!(parse_field("Demand", "0").unwrap(), 0);
    }

    #[test]
    fn test_parse_field_whitespace() {
        assert_eq!(parse_field("Demand", " 0x0a ").unwrap(), 10);
    }

    #[test]
    fn test_parse_field_invalid() {
        let err = parse_field("Demand", "watts").unwrap_err();
        assert_eq!(err.field, "Demand");
        assert_eq!(err.value, "watts");

        assert!(parse_field("Demand", "").is_err());
        assert!(parse_field("Demand", "0x").is_err());
        assert!(parse_field("Demand", "-5").is_err());
        assert!(parse_field("Demand", "1.5").is_err());
    }

    #[test]
    fn test_parse_field_out_of_range() {
        // One past u32::MAX, in both encodings.
        assert!(parse_field("Demand", "0x100000000").is_err());
        assert!(parse_field("Demand", "4294967296").is_err());
    }

    #[test]
    fn test_demand_reading() {
        let demand = InstantaneousDemand {
            device_mac_id: "0xd8d5b9000000af03".to_string(),
            meter_mac_id: "0x00135003007c1810".to_string(),
            demand: "0x0000a0".to_string(),
            multiplier: "0x00000001".to_string(),
            divisor: "0x000003e8".to_string(),
        };

        let reading = demand.reading().unwrap();
        assert_eq!(reading.value, 160);
        assert_eq!(reading.multiplier, 1);
        assert_eq!(reading.divisor, 1000);
    }

    #[test]
    fn test_summation_reading_bad_field() {
        let summation = CurrentSummationDelivered {
            device_mac_id: "D1".to_string(),
            meter_mac_id: "M1".to_string(),
            summation_delivered: "0x01".to_string(),
            multiplier: "not-a-number".to_string(),
            divisor: "0x01".to_string(),
        };

        let err = summation.reading().unwrap_err();
        assert_eq!(err.field, "Multiplier");
    }

    #[test]
    fn test_message_kind_labels() {
        assert_eq!(MessageKind::Demand.as_str(), "demand");
        assert_eq!(MessageKind::Summation.as_str(), "summation");

        let demand = InstantaneousDemand {
            device_mac_id: "D1".to_string(),
            meter_mac_id: "M1".to_string(),
            demand: "0x0a".to_string(),
            multiplier: "0x01".to_string(),
            divisor: "0x01".to_string(),
        };
        assert_eq!(RavenMessage::Demand(demand).kind(), MessageKind::Demand);
    }
}
