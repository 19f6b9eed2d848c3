//! Interop configuration.

use crate::descriptor::DatabaseDescriptor;

/// Default JS global the engine-side interop script installs itself under.
pub const DEFAULT_NAMESPACE: &str = "dnetindexeddbinterop";

/// Options handed to [`IndexedDbInterop::new`](crate::IndexedDbInterop::new).
///
/// The descriptor is required; a facade cannot be constructed without one.
#[derive(Debug, Clone)]
pub struct IndexedDbOptions {
    database: Option<DatabaseDescriptor>,
    namespace: String,
}

impl Default for IndexedDbOptions {
    fn default() -> Self {
        Self {
            database: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl IndexedDbOptions {
    pub fn builder() -> IndexedDbOptionsBuilder {
        IndexedDbOptionsBuilder::default()
    }

    /// Shorthand for options carrying `descriptor` and the default namespace.
    pub fn for_database(descriptor: DatabaseDescriptor) -> Self {
        Self::builder().database(descriptor).build()
    }

    pub fn database(&self) -> Option<&DatabaseDescriptor> {
        self.database.as_ref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully qualified boundary call name, e.g. `dnetindexeddbinterop.openDb`.
    pub fn qualify(&self, function: &str) -> String {
        if self.namespace.is_empty() {
            function.to_string()
        } else {
            format!("{}.{}", self.namespace, function)
        }
    }

    pub(crate) fn take_database(&mut self) -> Option<DatabaseDescriptor> {
        self.database.take()
    }
}

#[derive(Debug, Default)]
pub struct IndexedDbOptionsBuilder {
    options: IndexedDbOptions,
}

impl IndexedDbOptionsBuilder {
    pub fn database(mut self, descriptor: DatabaseDescriptor) -> Self {
        self.options.database = Some(descriptor);
        self
    }

    /// Override the JS global the boundary functions live on. An empty
    /// namespace sends bare function names.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    pub fn build(self) -> IndexedDbOptions {
        self.options
    }
}
