use std::collections::VecDeque;

use crate::hpack::error::HpackError;

/// Overhead added to `name.len() + value.len()` for each dynamic entry.
const ENTRY_OVERHEAD: usize = 32;

/// Default dynamic table limit set by the protocol layer.
pub const DEFAULT_LIMIT: usize = 4096;

/// How a header field is present in the index address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    /// Neither name nor value indexed.
    None,
    /// Only the name matches an entry.
    Name,
    /// The exact `(name, value)` pair is indexed.
    Full,
}

/// HPACK index address space: the immutable static table joined with the
/// mutable dynamic table.
///
/// ```text
/// <----------  Index Address Space ---------->
/// <-- Static  Table -->  <-- Dynamic Table -->
/// +---+-----------+---+  +---+-----------+---+
/// | 1 |    ...    | s |  |s+1|    ...    |s+k|
/// +---+-----------+---+  +---+-----------+---+
///                        ^                   |
///                        |                   V
///                 Insertion Point       Dropping Point
/// ```
///
/// Indices are 1-based. New dynamic entries enter at the front (index
/// `s+1`); eviction drops from the back until `size <= max_size`.
#[derive(Debug)]
pub struct HpackContext {
    dynamic: VecDeque<(String, String)>,
    size: usize,
    max_size: usize,
    limit: usize,
}

impl Default for HpackContext {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl HpackContext {
    /// Context with the default 4096-byte limit.
    pub fn new() -> HpackContext {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Context bounded by a protocol-level `limit`.
    pub fn with_limit(limit: usize) -> HpackContext {
        HpackContext {
            dynamic: VecDeque::new(),
            size: 0,
            max_size: limit,
            limit,
        }
    }

    /// Current dynamic table byte size.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current dynamic table bound, `<= limit`.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Protocol-level bound on `max_size`.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of addressable entries, static and dynamic.
    pub fn len(&self) -> usize {
        STATIC_TABLE.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the static table is always addressable
    }

    /// The dynamic table entries, most recent first.
    pub fn dynamic(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dynamic.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Look up a 1-based index.
    ///
    /// Static entries without a value yield an empty value string.
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        let index = index.checked_sub(1)?;
        match STATIC_TABLE.get(index) {
            Some(&(name, value)) => Some((name, value)),
            None => self
                .dynamic
                .get(index - STATIC_TABLE.len())
                .map(|(n, v)| (n.as_str(), v.as_str())),
        }
    }

    /// Find the best index for `(name, value)`.
    ///
    /// A full match anywhere wins over a name match; ties go to the
    /// lowest index.
    pub fn get_index(&self, name: &str, value: &str) -> (IndexType, usize) {
        let mut name_match = None;

        for (i, (n, v)) in self.entries().enumerate() {
            if n == name {
                if v == value {
                    return (IndexType::Full, i + 1);
                }
                if name_match.is_none() {
                    name_match = Some(i + 1);
                }
            }
        }

        match name_match {
            Some(index) => (IndexType::Name, index),
            None => (IndexType::None, 0),
        }
    }

    /// Insert an entry at the front of the dynamic table, evicting from
    /// the back until the size bound holds again.
    ///
    /// An entry larger than `max_size` empties the table.
    pub fn add(&mut self, name: String, value: String) {
        self.size += entry_size(&name, &value);
        self.dynamic.push_front((name, value));
        self.evict();
    }

    /// Change the dynamic table bound, evicting as needed.
    ///
    /// # Errors
    ///
    /// Rejects values above the protocol `limit`.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<(), HpackError> {
        if max_size > self.limit {
            return Err(HpackError::SizeUpdateTooLarge {
                max_size,
                limit: self.limit,
            });
        }
        self.max_size = max_size;
        self.evict();
        Ok(())
    }

    /// Change the protocol-level limit, pulling `max_size` down with it.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        if self.max_size > limit {
            self.max_size = limit;
            self.evict();
        }
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        STATIC_TABLE
            .iter()
            .map(|&(n, v)| (n, v))
            .chain(self.dynamic())
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            let (name, value) = self
                .dynamic
                .pop_back()
                .expect("table size is the sum of entry sizes");
            self.size -= entry_size(&name, &value);
        }
    }
}

#[inline]
fn entry_size(name: &str, value: &str) -> usize {
    ENTRY_OVERHEAD + name.len() + value.len()
}

/// The static table of RFC 7541 Appendix A. Entries without a value
/// carry the empty string.
pub static STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup() {
        let context = HpackContext::new();
        assert_eq!(context.get(2), Some((":method", "GET")));
        assert_eq!(context.get(61), Some(("www-authenticate", "")));
        assert_eq!(context.get(0), None);
        assert_eq!(context.get(62), None);
    }

    #[test]
    fn test_dynamic_indexing() {
        let mut context = HpackContext::new();
        context.add("x-a".into(), "1".into());
        context.add("x-b".into(), "2".into());

        // most recent insertion sits at index 62
        assert_eq!(context.get(62), Some(("x-b", "2")));
        assert_eq!(context.get(63), Some(("x-a", "1")));
        assert_eq!(context.size(), 2 * (32 + 4));
    }

    #[test]
    fn test_get_index() {
        let mut context = HpackContext::new();
        assert_eq!(context.get_index(":method", "GET"), (IndexType::Full, 2));
        assert_eq!(context.get_index(":method", "PATCH"), (IndexType::Name, 2));
        assert_eq!(context.get_index("x-nope", "1"), (IndexType::None, 0));

        context.add("x-a".into(), "1".into());
        assert_eq!(context.get_index("x-a", "1"), (IndexType::Full, 62));
        assert_eq!(context.get_index("x-a", "2"), (IndexType::Name, 62));
    }

    #[test]
    fn test_eviction_on_size_bound() {
        let mut context = HpackContext::with_limit(80);
        context.add("x-a".into(), "1".into()); // 36 bytes
        context.add("x-b".into(), "2".into()); // 36 bytes
        context.add("x-c".into(), "3".into()); // evicts x-a
        assert_eq!(context.size(), 72);
        assert_eq!(context.get(63), Some(("x-b", "2")));
        assert_eq!(context.get(64), None);
    }

    #[test]
    fn test_oversized_entry_empties_table() {
        let mut context = HpackContext::with_limit(40);
        context.add("x-a".into(), "1".into());
        context.add("name".into(), "much too large for the table".into());
        assert_eq!(context.size(), 0);
        assert_eq!(context.get(62), None);
    }

    #[test]
    fn test_max_size_update_evicts() {
        let mut context = HpackContext::new();
        context.add("x-a".into(), "1".into());
        context.add("x-b".into(), "2".into());

        context.set_max_size(40).unwrap();
        assert_eq!(context.size(), 36);
        assert_eq!(context.get(62), Some(("x-b", "2")));

        assert!(context.set_max_size(DEFAULT_LIMIT + 1).is_err());
    }

    #[test]
    fn test_lowering_limit_pulls_max_size() {
        let mut context = HpackContext::new();
        context.add("x-a".into(), "1".into());
        context.set_limit(10);
        assert_eq!(context.max_size(), 10);
        assert_eq!(context.size(), 0);
    }
}
