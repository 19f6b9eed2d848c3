//! Extent queries: the max/min value of a store's primary key or of one of its indexes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{IndexedDbError, Result};

/// Textual form the engine uses for "no record".
pub const NULL_EXTENT: &str = "null";

/// Direction of an extent query. Serialized as `"Max"` / `"Min"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Extent {
    Max,
    Min,
}

impl Extent {
    pub fn as_str(self) -> &'static str {
        match self {
            Extent::Max => "Max",
            Extent::Min => "Min",
        }
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a raw extent response.
///
/// An empty store or index answers with the literal `null`, which maps to
/// `T::default()`. Anything else must decode as `T`; a malformed payload is a
/// [`IndexedDbError::Decode`].
pub fn decode_extent<T>(call: &str, raw: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if raw.trim() == NULL_EXTENT {
        return Ok(T::default());
    }
    serde_json::from_str(raw).map_err(|e| IndexedDbError::decode(call, e))
}
