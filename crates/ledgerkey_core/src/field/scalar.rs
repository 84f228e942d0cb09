//! Scalar key components.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Primitive kind of a scalar key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// UTF-8 string with a maximum length in characters.
    Text,
    /// Opaque hash of a fixed byte length.
    Hash,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Text => "text",
            Self::Hash => "hash",
        };
        f.write_str(name)
    }
}

/// A single typed key component value.
///
/// Values of the same kind order naturally (numerically, by code point, or
/// bytewise for hashes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    /// 16-bit signed integer.
    Int16(i16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    Text(String),
    /// Opaque hash bytes.
    Hash(Vec<u8>),
}

impl ScalarValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        match self {
            Self::Int16(_) => ScalarKind::Int16,
            Self::Int32(_) => ScalarKind::Int32,
            Self::Int64(_) => ScalarKind::Int64,
            Self::Text(_) => ScalarKind::Text,
            Self::Hash(_) => ScalarKind::Hash,
        }
    }

    /// SHA-256 digest of `bytes` as a 32-byte hash value.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> Self {
        Self::Hash(Sha256::digest(bytes).to_vec())
    }

    /// A 16-byte hash value holding a UUID.
    #[must_use]
    pub fn from_uuid(uuid: &Uuid) -> Self {
        Self::Hash(uuid.as_bytes().to_vec())
    }

    /// Widens an integer value to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::Text(_) | Self::Hash(_) => None,
        }
    }

    /// Returns the string, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a hash value.
    #[must_use]
    pub fn as_hash(&self) -> Option<&[u8]> {
        match self {
            Self::Hash(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Hash(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i16> for ScalarValue {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for ScalarValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Hash(v)
    }
}
