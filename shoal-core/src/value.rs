//! Typed attribute values
//!
//! Attribute triples carry a scalar instead of a vertex ID. The store keeps
//! the raw bit pattern in its payload zone and the type tag in the bucket
//! entry, so the value round-trips through `(tag, bits)`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A typed attribute value
///
/// Tags follow the input file format: 1 = int, 2 = float, 3 = double.
/// Tag 0 is reserved for SID lists in store bucket entries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i32),
    Float(f32),
    Double(f64),
}

impl AttrValue {
    /// The type tag stored in bucket entries and input files
    pub fn type_tag(self) -> u8 {
        match self {
            AttrValue::Int(_) => 1,
            AttrValue::Float(_) => 2,
            AttrValue::Double(_) => 3,
        }
    }

    /// Raw bit pattern for the store payload zone
    pub fn to_bits(self) -> u64 {
        match self {
            AttrValue::Int(v) => v as u32 as u64,
            AttrValue::Float(v) => v.to_bits() as u64,
            AttrValue::Double(v) => v.to_bits(),
        }
    }

    /// Reconstruct from a type tag and raw bits
    pub fn from_bits(tag: u8, bits: u64) -> Result<Self> {
        match tag {
            1 => Ok(AttrValue::Int(bits as u32 as i32)),
            2 => Ok(AttrValue::Float(f32::from_bits(bits as u32))),
            3 => Ok(AttrValue::Double(f64::from_bits(bits))),
            _ => Err(Error::value(format!("unsupported value type tag {tag}"))),
        }
    }

    /// Parse the value column of an `attr_*` record given its type tag
    pub fn parse(tag: u8, text: &str) -> Result<Self> {
        match tag {
            1 => text
                .parse::<i32>()
                .map(AttrValue::Int)
                .map_err(|e| Error::value(format!("bad int attribute {text:?}: {e}"))),
            2 => text
                .parse::<f32>()
                .map(AttrValue::Float)
                .map_err(|e| Error::value(format!("bad float attribute {text:?}: {e}"))),
            3 => text
                .parse::<f64>()
                .map(AttrValue::Double)
                .map_err(|e| Error::value(format!("bad double attribute {text:?}: {e}"))),
            _ => Err(Error::value(format!("unsupported value type tag {tag}"))),
        }
    }
}

impl Default for AttrValue {
    fn default() -> Self {
        AttrValue::Int(0)
    }
}
