//! The invocation channel: the one seam between this crate and the storage engine.
//!
//! A channel invokes a named function on the other side of the runtime boundary
//! with positional JSON arguments and returns the raw JSON response. Everything
//! else in the crate is built on this single method, so a test can swap in a
//! mock channel and observe exactly what crosses the boundary.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ChannelError;

/// Boundary function names. Positional argument order is fixed per call:
///
/// ```text
/// openDb(descriptor) -> integer            // -1 = failure
/// deleteDb(descriptor) -> string
/// addItems(descriptor, storeName, items[]) -> string
/// updateItems(descriptor, storeName, items[]) -> string
/// updateItemsByKey(descriptor, storeName, items[], keys[]) -> string
/// getByKey(descriptor, storeName, key) -> item | null
/// deleteByKey(descriptor, storeName, key) -> string
/// deleteAll(descriptor, storeName) -> string
/// getAll(descriptor, storeName) -> item[]
/// getRange(descriptor, storeName, lower, upper) -> item[]
/// getByIndex(descriptor, storeName, lower, upper, indexName, isRange) -> item[]
/// getExtent(descriptor, storeName, indexName | null, "Max" | "Min") -> raw json
/// ```
pub mod calls {
    pub const OPEN_DB: &str = "openDb";
    pub const DELETE_DB: &str = "deleteDb";
    pub const ADD_ITEMS: &str = "addItems";
    pub const UPDATE_ITEMS: &str = "updateItems";
    pub const UPDATE_ITEMS_BY_KEY: &str = "updateItemsByKey";
    pub const GET_BY_KEY: &str = "getByKey";
    pub const DELETE_BY_KEY: &str = "deleteByKey";
    pub const DELETE_ALL: &str = "deleteAll";
    pub const GET_ALL: &str = "getAll";
    pub const GET_RANGE: &str = "getRange";
    pub const GET_BY_INDEX: &str = "getByIndex";
    pub const GET_EXTENT: &str = "getExtent";

    pub const ALL: [&str; 12] = [
        OPEN_DB,
        DELETE_DB,
        ADD_ITEMS,
        UPDATE_ITEMS,
        UPDATE_ITEMS_BY_KEY,
        GET_BY_KEY,
        DELETE_BY_KEY,
        DELETE_ALL,
        GET_ALL,
        GET_RANGE,
        GET_BY_INDEX,
        GET_EXTENT,
    ];

    /// Strip a namespace prefix (`ns.openDb` -> `openDb`).
    pub fn function_name(identifier: &str) -> &str {
        identifier.rsplit('.').next().unwrap_or(identifier)
    }
}

/// Engine value returned by `openDb` when the database could not be opened.
pub const OPEN_FAILED: i64 = -1;

/// Thread-safety bounds for channels. Browser channels wrap `JsValue`s, which
/// are neither `Send` nor `Sync`, so the bounds only apply off wasm32.
#[cfg(not(target_arch = "wasm32"))]
pub trait ChannelBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + ?Sized> ChannelBounds for T {}

#[cfg(target_arch = "wasm32")]
pub trait ChannelBounds {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> ChannelBounds for T {}

/// Invoke a boundary function by name with positional arguments.
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait InvocationChannel: ChannelBounds {
    async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl<C: InvocationChannel + ?Sized> InvocationChannel for Arc<C> {
    async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError> {
        (**self).invoke(identifier, args).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl<'a, C: InvocationChannel + ?Sized> InvocationChannel for &'a C {
    async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError> {
        (**self).invoke(identifier, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_name() {
        assert_eq!(calls::function_name("dnetindexeddbinterop.getAll"), "getAll");
        assert_eq!(calls::function_name("getAll"), "getAll");
        assert_eq!(calls::function_name("a.b.getExtent"), "getExtent");
    }
}
