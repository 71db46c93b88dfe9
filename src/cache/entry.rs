//! Cache entry and the read view handed to callers.

use std::sync::Arc;

/// A cached origin response keyed by the raw client request.
#[derive(Debug)]
pub struct CacheEntry {
    /// Raw request bytes; both the lookup key and a readable label.
    pub(crate) url: Arc<[u8]>,
    /// Full origin response, headers and body.
    pub(crate) data: Arc<[u8]>,
    /// Logical access tick; the smallest tick is evicted first.
    pub(crate) last_access: u64,
}

impl CacheEntry {
    pub(crate) fn new(url: &[u8], data: &[u8], last_access: u64) -> Self {
        Self {
            url: Arc::from(url),
            data: Arc::from(data),
            last_access,
        }
    }

    /// Byte length of the cached response.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the cached response is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes charged against the cache budget for this entry.
    pub fn accounting_size(&self) -> usize {
        accounting_size(self.url.len(), self.data.len())
    }
}

/// Budget charge for an entry: payload, key, terminator byte and fixed overhead.
pub fn accounting_size(key_len: usize, data_len: usize) -> usize {
    data_len + key_len + 1 + std::mem::size_of::<CacheEntry>()
}

/// Read view of a cache hit.
///
/// Shares the stored bytes, so it stays valid after the entry is evicted.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    data: Arc<[u8]>,
}

impl CachedResponse {
    pub(crate) fn new(data: Arc<[u8]>) -> Self {
        Self { data }
    }

    /// The cached response bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the cached response.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the cached response is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounting_includes_key_and_overhead() {
        let entry = CacheEntry::new(b"GET /a HTTP/1.1\r\n\r\n", b"payload", 1);
        assert_eq!(
            entry.accounting_size(),
            7 + 19 + 1 + std::mem::size_of::<CacheEntry>()
        );
        assert_eq!(entry.len(), 7);
    }
}
