//! Error types for the IndexedDB interop layer

use thiserror::Error;

/// Result type for interop operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors raised by an invocation channel while crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The named boundary function does not exist on the other side
    #[error("boundary function not found: {0}")]
    NotFound(String),

    /// The storage engine rejected or failed the call
    #[error("engine error: {0}")]
    Engine(String),

    /// The call could not be delivered or its arguments/result could not be converted
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors that can occur during interop operations
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// The interop options carry no database descriptor
    #[error("IndexedDB database model not configured; supply one with IndexedDbOptions::builder().database(..)")]
    NotConfigured,

    /// Descriptor failed validation
    #[error("invalid database descriptor: {0}")]
    InvalidDescriptor(String),

    /// Caller passed arguments the engine cannot pair up
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Boundary call failed
    #[error("{call} failed: {source}")]
    Channel {
        call: String,
        #[source]
        source: ChannelError,
    },

    /// Response payload did not match the requested type
    #[error("could not decode {call} response: {source}")]
    Decode {
        call: String,
        #[source]
        source: serde_json::Error,
    },

    /// A caller value could not be serialized
    #[error("could not encode argument: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IndexedDbError {
    pub(crate) fn channel(call: &str, source: ChannelError) -> Self {
        IndexedDbError::Channel {
            call: call.to_string(),
            source,
        }
    }

    pub(crate) fn decode(call: &str, source: serde_json::Error) -> Self {
        IndexedDbError::Decode {
            call: call.to_string(),
            source,
        }
    }
}

#[cfg(feature = "browser")]
impl From<wasm_bindgen::JsValue> for ChannelError {
    fn from(val: wasm_bindgen::JsValue) -> Self {
        let msg = js_sys::JSON::stringify(&val)
            .map(String::from)
            .unwrap_or_else(|_| format!("{:?}", val));
        ChannelError::Engine(msg)
    }
}
