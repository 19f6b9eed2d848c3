//! Boundary contract tests: what the facade sends and how it reads responses

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use idb_interop::{
    ChannelError, DatabaseDescriptor, Extent, IndexedDbError, IndexedDbInterop,
    IndexedDbOptions, InvocationChannel, StoreSchema, OPEN_FAILED,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Records every call and answers from a canned table keyed by function name.
#[derive(Default)]
struct RecordingChannel {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    responses: Mutex<HashMap<String, Result<Value, ChannelError>>>,
}

impl RecordingChannel {
    fn respond(&self, function: &str, response: Value) {
        self.responses
            .lock()
            .insert(function.to_string(), Ok(response));
    }

    fn fail(&self, function: &str, error: ChannelError) {
        self.responses
            .lock()
            .insert(function.to_string(), Err(error));
    }

    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    fn last_args(&self) -> Vec<Value> {
        self.calls.lock().last().map(|(_, a)| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl InvocationChannel for RecordingChannel {
    async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError> {
        self.calls.lock().push((identifier.to_string(), args));
        let function = identifier.rsplit('.').next().unwrap_or(identifier);
        self.responses
            .lock()
            .get(function)
            .cloned()
            .unwrap_or(Ok(Value::Null))
    }
}

fn descriptor() -> DatabaseDescriptor {
    DatabaseDescriptor::builder("contract", 3)
        .store(StoreSchema::new("Users", "id").index("by_name", "name"))
        .build()
        .unwrap()
}

fn facade() -> IndexedDbInterop<Arc<RecordingChannel>> {
    IndexedDbInterop::new(
        Arc::new(RecordingChannel::default()),
        IndexedDbOptions::for_database(descriptor()),
    )
    .unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_missing_descriptor_fails_before_any_call() {
    let channel = Arc::new(RecordingChannel::default());
    let result = IndexedDbInterop::new(channel.clone(), IndexedDbOptions::default());

    assert!(matches!(result, Err(IndexedDbError::NotConfigured)));
    assert!(channel.calls().is_empty());
}

#[test]
fn test_invalid_descriptor_fails_before_any_call() {
    let channel = Arc::new(RecordingChannel::default());
    let broken = DatabaseDescriptor {
        name: "broken".into(),
        version: 0,
        stores: Vec::new(),
        db_model_guid: None,
        db_model_id: None,
    };
    let result = IndexedDbInterop::new(channel.clone(), IndexedDbOptions::for_database(broken));

    assert!(matches!(result, Err(IndexedDbError::InvalidDescriptor(_))));
    assert!(channel.calls().is_empty());
}

#[test]
fn test_correlation_ids_are_unique() {
    let a = facade();
    let b = facade();

    assert!(!a.correlation_id().is_empty());
    assert_ne!(a.correlation_id(), b.correlation_id());
    assert_eq!(a.descriptor().db_model_guid, Some(a.correlation_id()));
    assert!(a.handle().is_none());
}

// ============================================================================
// Open / handle
// ============================================================================

#[tokio::test]
async fn test_open_stores_handle_for_later_calls() {
    let db = facade();
    db.channel().respond("openDb", json!(42));
    db.channel().respond("getAll", json!([]));

    assert_eq!(db.open_indexed_db().await.unwrap(), Some(42));
    assert_eq!(db.handle(), Some(42));

    db.get_all::<Value>("Users").await.unwrap();
    let args = db.channel().last_args();
    let sent = &args[0];
    assert_eq!(sent["dbModelId"], 42);
    assert_eq!(sent["dbModelGuid"], json!(db.correlation_id()));
    assert_eq!(sent["name"], "contract");
    assert_eq!(sent["version"], 3);
}

#[tokio::test]
async fn test_open_sentinel_leaves_handle_unset() {
    let db = facade();
    db.channel().respond("openDb", json!(OPEN_FAILED));

    assert_eq!(db.open_indexed_db().await.unwrap(), None);
    assert_eq!(db.handle(), None);

    db.delete_all("Users").await.ok();
    let args = db.channel().last_args();
    let sent = &args[0];
    assert!(sent.get("dbModelId").is_none());
}

#[tokio::test]
async fn test_failed_reopen_keeps_previous_handle() {
    let db = facade();
    db.channel().respond("openDb", json!(5));
    db.open_indexed_db().await.unwrap();

    db.channel().respond("openDb", json!(-1));
    assert_eq!(db.open_indexed_db().await.unwrap(), None);
    assert_eq!(db.handle(), Some(5));
}

// ============================================================================
// Call names and argument order
// ============================================================================

#[tokio::test]
async fn test_call_names_are_namespaced() {
    let db = facade();
    db.channel().respond("addItems", json!("ok"));
    db.add_items("Users", &[json!({"id": 1})]).await.unwrap();

    let custom = IndexedDbInterop::new(
        Arc::new(RecordingChannel::default()),
        IndexedDbOptions::builder()
            .database(descriptor())
            .namespace("myidb")
            .build(),
    )
    .unwrap();
    custom.delete_indexed_db().await.ok();

    assert_eq!(db.channel().calls()[0].0, "dnetindexeddbinterop.addItems");
    assert_eq!(custom.channel().calls()[0].0, "myidb.deleteDb");
}

#[tokio::test]
async fn test_positional_arguments() {
    let db = facade();
    for function in ["addItems", "updateItems", "updateItemsByKey", "deleteByKey", "deleteAll"] {
        db.channel().respond(function, json!("done"));
    }
    db.channel().respond("getRange", json!([]));
    db.channel().respond("getByIndex", json!([]));

    let items = [json!({"id": 1, "name": "A"})];
    db.add_items("Users", &items).await.unwrap();
    db.update_items("Users", &items).await.unwrap();
    db.update_items_by_key("Users", &items, &[9]).await.unwrap();
    db.get_by_key::<_, Value>("Users", &1).await.unwrap();
    db.delete_by_key("Users", &1).await.unwrap();
    db.delete_all("Users").await.unwrap();
    db.get_range::<_, Value>("Users", &1, &5).await.unwrap();
    db.get_by_index_exact::<_, Value>("Users", "by_name", "A")
        .await
        .unwrap();
    db.get_by_index_range::<_, Value>("Users", "by_name", "A", "M")
        .await
        .unwrap();

    let tails: Vec<(String, Vec<Value>)> = db
        .channel()
        .calls()
        .into_iter()
        .map(|(name, args)| (name, args[1..].to_vec()))
        .collect();

    let ns = |f: &str| format!("dnetindexeddbinterop.{}", f);
    assert_eq!(
        tails,
        vec![
            (ns("addItems"), vec![json!("Users"), json!(items)]),
            (ns("updateItems"), vec![json!("Users"), json!(items)]),
            (ns("updateItemsByKey"), vec![json!("Users"), json!(items), json!([9])]),
            (ns("getByKey"), vec![json!("Users"), json!(1)]),
            (ns("deleteByKey"), vec![json!("Users"), json!(1)]),
            (ns("deleteAll"), vec![json!("Users")]),
            (ns("getRange"), vec![json!("Users"), json!(1), json!(5)]),
            (
                ns("getByIndex"),
                vec![json!("Users"), json!("A"), json!("A"), json!("by_name"), json!(false)]
            ),
            (
                ns("getByIndex"),
                vec![json!("Users"), json!("A"), json!("M"), json!("by_name"), json!(true)]
            ),
        ]
    );
}

#[tokio::test]
async fn test_extent_arguments() {
    let db = facade();
    db.get_max_key::<i64>("Users").await.unwrap();
    db.get_min_index::<String>("Users", "by_name").await.unwrap();

    let calls = db.channel().calls();
    assert_eq!(calls[0].0, "dnetindexeddbinterop.getExtent");
    assert_eq!(
        calls[0].1[1..].to_vec(),
        vec![json!("Users"), Value::Null, json!("Max")]
    );
    assert_eq!(
        calls[1].1[1..].to_vec(),
        vec![json!("Users"), json!("by_name"), json!("Min")]
    );
}

// ============================================================================
// Response decoding
// ============================================================================

#[tokio::test]
async fn test_null_extent_is_default() {
    let db = facade();
    db.channel().respond("getExtent", Value::Null);

    assert_eq!(db.get_max_key::<i64>("Users").await.unwrap(), 0);
    assert_eq!(db.get_min_key::<String>("Users").await.unwrap(), "");
}

#[tokio::test]
async fn test_extent_payload_matches_direct_decode() {
    let db = facade();
    let payload = json!([2024, "z"]);
    db.channel().respond("getExtent", payload.clone());

    let via_facade: (i64, String) = db
        .get_extent("Users", Some("compound"), Extent::Max)
        .await
        .unwrap();
    let direct: (i64, String) = serde_json::from_value(payload).unwrap();
    assert_eq!(via_facade, direct);
}

#[tokio::test]
async fn test_malformed_extent_is_decode_error() {
    let db = facade();
    db.channel().respond("getExtent", json!({"unexpected": true}));

    let err = db.get_max_key::<i64>("Users").await.unwrap_err();
    assert!(matches!(
        err,
        IndexedDbError::Decode { ref call, .. } if call == "dnetindexeddbinterop.getExtent"
    ));
}

#[tokio::test]
async fn test_get_by_key_null_is_none() {
    let db = facade();
    let found: Option<Value> = db.get_by_key("Users", &1).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_wrong_shape_is_decode_error() {
    let db = facade();
    db.channel().respond("getAll", json!({"not": "a list"}));
    let err = db.get_all::<Value>("Users").await.unwrap_err();
    assert!(matches!(err, IndexedDbError::Decode { .. }));
}

#[tokio::test]
async fn test_channel_failure_propagates() {
    let db = facade();
    db.channel()
        .fail("deleteAll", ChannelError::Engine("QuotaExceededError".into()));

    let err = db.delete_all("Users").await.unwrap_err();
    match err {
        IndexedDbError::Channel { call, source } => {
            assert_eq!(call, "dnetindexeddbinterop.deleteAll");
            assert_eq!(source, ChannelError::Engine("QuotaExceededError".into()));
        }
        other => panic!("unexpected error: {other}"),
    }
    // No retry
    assert_eq!(db.channel().calls().len(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Holds calls on the "Slow" store until released.
#[derive(Default)]
struct GatedChannel {
    gate: Notify,
}

#[async_trait]
impl InvocationChannel for GatedChannel {
    async fn invoke(&self, _identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError> {
        if args.get(1) == Some(&json!("Slow")) {
            self.gate.notified().await;
        }
        Ok(json!([]))
    }
}

#[tokio::test]
async fn test_independent_stores_do_not_block() {
    let channel = Arc::new(GatedChannel::default());
    let db = Arc::new(
        IndexedDbInterop::new(channel.clone(), IndexedDbOptions::for_database(descriptor()))
            .unwrap(),
    );

    let slow_db = db.clone();
    let slow = tokio::spawn(async move { slow_db.get_all::<Value>("Slow").await });

    let fast = tokio::time::timeout(Duration::from_secs(2), db.get_all::<Value>("Fast"))
        .await
        .expect("call on another store was blocked");
    assert!(fast.unwrap().is_empty());
    assert!(!slow.is_finished());

    channel.gate.notify_one();
    assert!(slow.await.unwrap().unwrap().is_empty());
}
