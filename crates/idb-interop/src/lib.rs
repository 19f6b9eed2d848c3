//! Typed async forwarding layer over a browser IndexedDB interop boundary
//!
//! The storage engine lives on the other side of a runtime boundary (in the
//! browser, a JavaScript interop script driving IndexedDB). This crate turns
//! strongly typed calls into named boundary invocations with positional JSON
//! arguments and decodes the responses. It keeps no data model of its own: the
//! only state is the database descriptor, stamped with a correlation id at
//! construction and with the engine handle once opened.
//!
//! # Layout
//!
//! - [`IndexedDbInterop`] - the facade, one method per storage primitive
//! - [`InvocationChannel`] - the single-method seam to the engine
//! - [`MemoryEngine`] - an in-process engine for tests and native hosts
//! - `BrowserChannel` (feature `browser`, wasm32) - calls into the page's JS
//!
//! # Example
//!
//! ```rust,ignore
//! use idb_interop::{DatabaseDescriptor, IndexedDbInterop, IndexedDbOptions, MemoryEngine, StoreSchema};
//!
//! let descriptor = DatabaseDescriptor::builder("app", 1)
//!     .store(StoreSchema::new("Users", "id").index("by_name", "name"))
//!     .build()?;
//!
//! let db = IndexedDbInterop::new(MemoryEngine::new(), IndexedDbOptions::for_database(descriptor))?;
//! db.open_indexed_db().await?;
//!
//! db.add_items("Users", &[User { id: 1, name: "A".into() }]).await?;
//! let user: Option<User> = db.get_by_key("Users", &1).await?;
//! let newest: i64 = db.get_max_key("Users").await?;
//! ```

#[cfg(all(feature = "browser", target_arch = "wasm32"))]
pub mod browser;
pub mod channel;
pub mod descriptor;
pub mod error;
pub mod extent;
pub mod interop;
pub mod memory;
pub mod options;
pub mod query;
pub mod tracing;

#[cfg(all(feature = "browser", target_arch = "wasm32"))]
pub use browser::BrowserChannel;
pub use channel::{InvocationChannel, OPEN_FAILED};
pub use descriptor::{
    DatabaseDescriptor, DbHandle, DescriptorBuilder, IndexDefinition, IndexSpec, KeySpec,
    StoreSchema,
};
pub use error::{ChannelError, IndexedDbError, Result};
pub use extent::Extent;
pub use interop::IndexedDbInterop;
pub use memory::{IdbKey, MemoryEngine};
pub use options::{IndexedDbOptions, IndexedDbOptionsBuilder, DEFAULT_NAMESPACE};
pub use query::IndexQuery;
