//! Browser invocation channel using wasm-bindgen
//!
//! Calls the engine-side interop script installed on the page, e.g.
//! `globalThis.dnetindexeddbinterop.openDb(descriptor)`. Arguments and results
//! cross as JSON: each argument is rebuilt on the JS side with `JSON.parse`,
//! the result is read back with `JSON.stringify`. Promise results are awaited;
//! a rejected promise becomes a [`ChannelError::Engine`] carrying the
//! stringified rejection value.

use js_sys::{Array, Function, Promise, Reflect, JSON};
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use crate::channel::InvocationChannel;
use crate::error::ChannelError;

/// Channel over functions reachable from `globalThis`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserChannel;

impl BrowserChannel {
    pub fn new() -> Self {
        Self
    }

    /// Walk a dotted identifier from `globalThis`. Returns the function and the
    /// object it should be called on.
    fn resolve(identifier: &str) -> Result<(JsValue, Function), ChannelError> {
        let mut owner = JsValue::UNDEFINED;
        let mut target: JsValue = js_sys::global().into();

        for segment in identifier.split('.') {
            let next = Reflect::get(&target, &JsValue::from_str(segment))
                .map_err(|_| ChannelError::NotFound(identifier.to_string()))?;
            if next.is_undefined() || next.is_null() {
                return Err(ChannelError::NotFound(identifier.to_string()));
            }
            owner = target;
            target = next;
        }

        let function = target
            .dyn_into::<Function>()
            .map_err(|_| ChannelError::NotFound(format!("{} is not a function", identifier)))?;
        Ok((owner, function))
    }
}

#[async_trait::async_trait(?Send)]
impl InvocationChannel for BrowserChannel {
    async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError> {
        let (owner, function) = Self::resolve(identifier)?;

        let js_args = Array::new();
        for value in &args {
            js_args.push(&to_js(value)?);
        }

        let returned = function.apply(&owner, &js_args).map_err(ChannelError::from)?;

        // Promise.resolve passes plain values through and adopts thenables
        let settled = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(ChannelError::from)?;

        from_js(&settled)
    }
}

fn to_js(value: &Value) -> Result<JsValue, ChannelError> {
    let text = serde_json::to_string(value)
        .map_err(|e| ChannelError::Transport(format!("encode argument: {}", e)))?;
    JSON::parse(&text).map_err(|e| ChannelError::Transport(format!("JSON.parse: {:?}", e)))
}

fn from_js(value: &JsValue) -> Result<Value, ChannelError> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = JSON::stringify(value)
        .map(String::from)
        .map_err(|e| ChannelError::Transport(format!("JSON.stringify: {:?}", e)))?;
    serde_json::from_str(&text)
        .map_err(|e| ChannelError::Transport(format!("decode result: {}", e)))
}
