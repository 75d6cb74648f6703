//! Feature property values.

use std::collections::HashMap;
use std::fmt;

use tessera_proto::tile;

use crate::error::{DecodeError, DecodeResult};

/// A feature's property bag.
pub type Properties = HashMap<String, PropertyValue>;

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl PropertyValue {
    /// Numeric view of the value, if it has one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::String(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// String view of the value, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value, if it is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl TryFrom<&tile::Value> for PropertyValue {
    type Error = DecodeError;

    fn try_from(value: &tile::Value) -> DecodeResult<Self> {
        if let Some(s) = &value.string_value {
            return Ok(Self::String(s.clone()));
        }
        if let Some(v) = value.float_value {
            return Ok(Self::Float(v));
        }
        if let Some(v) = value.double_value {
            return Ok(Self::Double(v));
        }
        if let Some(v) = value.int_value {
            return Ok(Self::Int(v));
        }
        if let Some(v) = value.uint_value {
            return Ok(Self::UInt(v));
        }
        if let Some(v) = value.sint_value {
            return Ok(Self::Int(v));
        }
        if let Some(v) = value.bool_value {
            return Ok(Self::Bool(v));
        }
        Err(DecodeError::InvalidFormat {
            context: "value",
            detail: "no variant set".to_string(),
        })
    }
}

/// Resolve a feature's tag pairs against its layer's dictionaries.
///
/// # Errors
///
/// Returns an error if the tag list has odd length, any index is out of
/// range of the key or value table, or a referenced value failed to decode
/// (`None` in `values`).
pub fn decode_properties(
    tags: &[u32],
    keys: &[String],
    values: &[Option<PropertyValue>],
) -> DecodeResult<Properties> {
    if tags.len() % 2 != 0 {
        return Err(DecodeError::InvalidFormat {
            context: "tags",
            detail: format!("odd tag count {}", tags.len()),
        });
    }

    let mut properties = Properties::with_capacity(tags.len() / 2);
    for pair in tags.chunks_exact(2) {
        let key_index = pair[0] as usize;
        let value_index = pair[1] as usize;

        let key = keys.get(key_index).ok_or(DecodeError::IndexOutOfBounds {
            index: key_index,
            len: keys.len(),
        })?;
        let value = values
            .get(value_index)
            .ok_or(DecodeError::IndexOutOfBounds {
                index: value_index,
                len: values.len(),
            })?
            .as_ref()
            .ok_or_else(|| DecodeError::InvalidFormat {
                context: "tags",
                detail: format!("value {value_index} has no variant set"),
            })?;

        properties.insert(key.clone(), value.clone());
    }
    Ok(properties)
}
