//! Index lookups.

/// How to match an index: one exact value or an inclusive range.
///
/// On the wire both forms use the same `getByIndex` call. `Exact(v)` sends
/// `v` as both bounds with `isRange = false`; the engine matches on the lower
/// bound. `Range` sends the two bounds with `isRange = true`.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery<K> {
    Exact(K),
    Range { lower: K, upper: K },
}

impl<K> IndexQuery<K> {
    pub fn exact(value: K) -> Self {
        IndexQuery::Exact(value)
    }

    pub fn range(lower: K, upper: K) -> Self {
        IndexQuery::Range { lower, upper }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, IndexQuery::Range { .. })
    }

    /// `(lower, upper)` as sent to the engine.
    pub fn bounds(&self) -> (&K, &K) {
        match self {
            IndexQuery::Exact(value) => (value, value),
            IndexQuery::Range { lower, upper } => (lower, upper),
        }
    }
}
