//! Static and dynamic HPACK tables (RFC 7541 section 2.3).
//!
//! Index 1 through 61 address the static table; higher indices address the
//! dynamic table, newest entry first.

use std::collections::VecDeque;

use bytes::Bytes;

use super::HeaderField;

/// Per-entry overhead counted against the dynamic table size.
pub const ENTRY_OVERHEAD: usize = 32;

/// Number of entries in the static table.
pub const STATIC_LEN: usize = STATIC_TABLE.len();

#[derive(Debug)]
pub struct DynamicTable {
    fields: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub const fn new(max_size: usize) -> Self {
        Self {
            fields: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    /// Look up a 1-based index across both tables.
    pub fn get(&self, index: usize) -> Option<HeaderField> {
        let index = index.checked_sub(1)?;
        match STATIC_TABLE.get(index) {
            Some(&(name, value)) => Some(HeaderField::new(
                Bytes::from_static(name),
                Bytes::from_static(value),
            )),
            None => self.fields.get(index - STATIC_LEN).cloned(),
        }
    }

    pub fn insert(&mut self, field: HeaderField) {
        let size = field.size();

        // an entry larger than the whole table empties it and is not stored
        if size > self.max_size {
            self.fields.clear();
            self.size = 0;
            return;
        }

        while self.max_size - self.size < size {
            self.evict();
        }
        self.fields.push_front(field);
        self.size += size;
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.size > self.max_size {
            self.evict();
        }
    }

    fn evict(&mut self) {
        if let Some(field) = self.fields.pop_back() {
            self.size -= field.size();
        }
    }

    pub fn size(&self) -> usize { self.size }

    pub fn len(&self) -> usize { self.fields.len() }

    #[cfg(test)]
    pub fn fields(&self) -> &VecDeque<HeaderField> { &self.fields }
}

#[rustfmt::skip]
const STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];
