//! HTTP header fields store.
//!
//! An ordered, case-insensitive multimap from lowercase field names to lists
//! of values, with the wire-level line parser and encoder.
use std::fmt::Write as _;
use std::slice;
use std::time::SystemTime;

use crate::matches;

/// Ordered multimap of HTTP header fields.
///
/// Names are kept lowercase; insertion order of first occurrence is
/// preserved. A field may carry multiple values, either from repeated
/// lines or from comma-separated lists. `set-cookie` values are never
/// merged back into one line.
///
/// ```rust
/// use tenon::headers;
///
/// let h = headers! { content_length: 23, transfer_encoding: ["chunked"] };
/// assert_eq!(h.get("content-length"), Some("23"));
/// ```
#[derive(Clone, Default)]
pub struct Headers {
    fields: Vec<(String, Vec<String>)>,
}

impl Headers {
    /// Create an empty header store.
    #[inline]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Parse one header field line (without the trailing CRLF).
    ///
    /// The line must match `name ":" value` where `name` is one or more
    /// token octets and `value` is horizontal-tab or printable ASCII.
    /// Surrounding whitespace of the value is trimmed. The value is split
    /// on `,` unless the trimmed value is an RFC 1123 datetime.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderParseError`] when the line does not match.
    pub fn parse_line(line: &[u8]) -> Result<(String, Vec<String>), HeaderParseError> {
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| HeaderParseError::new(line))?;
        let (name, rest) = line.split_at(colon);

        if name.is_empty() || !name.iter().all(|&b| matches::is_field_name(b)) {
            return Err(HeaderParseError::new(line));
        }
        let value = &rest[1..];
        if !value.iter().all(|&b| matches::is_field_value(b)) {
            return Err(HeaderParseError::new(line));
        }

        // both sides are ASCII here
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        let value = String::from_utf8_lossy(value).trim().to_owned();

        Ok((name, split_field_value(value)))
    }

    /// Parse a sequence of header field lines into this store.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderParseError`] on the first line that does not match.
    pub fn parse_lines<'a, I>(&mut self, lines: I) -> Result<(), HeaderParseError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for line in lines {
            let (name, values) = Self::parse_line(line)?;
            self.entry(name).extend(values);
        }
        Ok(())
    }

    /// Returns the number of distinct field names.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the first value of the field, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Returns all values of the field, in insertion order.
    pub fn values(&self, name: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns `true` if the field is present with at least one value.
    pub fn contains(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    /// Replace the field with a single value.
    pub fn set<V: IntoValues>(&mut self, name: &str, value: V) {
        let values = self.entry(name.to_ascii_lowercase());
        values.clear();
        value.extend_into(values);
    }

    /// Append one or more values to the field.
    ///
    /// Lists extend the existing values; a [`SystemTime`] is formatted as
    /// an RFC 1123 date; anything else is rendered to a single value.
    pub fn add<V: IntoValues>(&mut self, name: &str, value: V) {
        value.extend_into(self.entry(name.to_ascii_lowercase()));
    }

    /// Remove the field entirely, returning its values.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        match self.fields.iter().position(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(i) => self.fields.remove(i).1,
            None => Vec::new(),
        }
    }

    /// Merge all fields of `other` into this store, appending values.
    pub fn update(&mut self, other: &Headers) {
        for (name, values) in &other.fields {
            self.entry(name.clone()).extend(values.iter().cloned());
        }
    }

    /// Iterate over `(name, rendered_value)` pairs ready for the wire.
    ///
    /// List values are joined with `", "`, except `set-cookie` which
    /// yields one pair per value.
    pub fn fields(&self) -> Fields<'_> {
        Fields {
            inner: self.fields.iter(),
            pending: None,
        }
    }

    /// Encode all fields as CRLF-terminated header lines.
    pub fn http_encode(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.fields() {
            let _ = write!(out, "{name}: {value}\r\n");
        }
        out
    }

    fn entry(&mut self, name: String) -> &mut Vec<String> {
        debug_assert!(name.chars().all(|c| !c.is_ascii_uppercase()));

        match self.fields.iter().position(|(n, _)| *n == name) {
            Some(i) => &mut self.fields[i].1,
            None => {
                self.fields.push((name, Vec::new()));
                &mut self.fields.last_mut().expect("just pushed").1
            }
        }
    }
}

impl std::fmt::Debug for Headers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(n, v)| (n, v)))
            .finish()
    }
}

/// Split a field value on `,` unless it is an RFC 1123 datetime.
fn split_field_value(value: String) -> Vec<String> {
    if value.contains(',') && !is_rfc1123_datetime(&value) {
        value.split(',').map(|v| v.trim().to_owned()).collect()
    } else {
        vec![value]
    }
}

/// Returns `true` for values shaped like `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn is_rfc1123_datetime(value: &str) -> bool {
    value.len() == 29
        && value.ends_with(" GMT")
        && httpdate::parse_http_date(value).is_ok()
}

/// `content-length` grammar: a single decimal integer with no leading
/// zero, except the literal `0`.
pub(crate) fn parse_content_length(value: &str) -> Option<u64> {
    if value == "0" {
        return Some(0);
    }
    if value.is_empty() || value.starts_with('0') || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Render a lowercase field name title-cased for the wire,
/// e.g. `content-length` becomes `Content-Length`.
pub(crate) fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper = c == '-';
    }
    out
}

// ===== Fields iterator =====

/// Iterator of wire-ready `(name, value)` pairs, see [`Headers::fields`].
pub struct Fields<'a> {
    inner: slice::Iter<'a, (String, Vec<String>)>,
    pending: Option<(&'a str, slice::Iter<'a, String>)>,
}

impl std::fmt::Debug for Fields<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fields").finish_non_exhaustive()
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = (&'a str, String);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((name, values)) = &mut self.pending {
                if let Some(value) = values.next() {
                    return Some((*name, value.clone()));
                }
                self.pending = None;
            }

            let (name, values) = self.inner.next()?;
            if values.is_empty() {
                continue;
            }
            if name == "set-cookie" {
                // one line per cookie, never merged
                self.pending = Some((name.as_str(), values.iter()));
            } else {
                return Some((name.as_str(), values.join(", ")));
            }
        }
    }
}

// ===== Values =====

/// A type usable as a header value in [`Headers::set`] and [`Headers::add`].
pub trait IntoValues: sealed::Sealed {}
mod sealed {
    use super::*;

    pub trait Sealed {
        fn extend_into(self, values: &mut Vec<String>);
    }

    impl IntoValues for &str {}
    impl Sealed for &str {
        fn extend_into(self, values: &mut Vec<String>) {
            values.push(self.to_owned());
        }
    }

    impl IntoValues for String {}
    impl Sealed for String {
        fn extend_into(self, values: &mut Vec<String>) {
            values.push(self);
        }
    }

    impl<const N: usize> IntoValues for [&str; N] {}
    impl<const N: usize> Sealed for [&str; N] {
        fn extend_into(self, values: &mut Vec<String>) {
            values.extend(self.into_iter().map(str::to_owned));
        }
    }

    impl IntoValues for Vec<String> {}
    impl Sealed for Vec<String> {
        fn extend_into(self, values: &mut Vec<String>) {
            values.extend(self);
        }
    }

    impl IntoValues for &[String] {}
    impl Sealed for &[String] {
        fn extend_into(self, values: &mut Vec<String>) {
            values.extend(self.iter().cloned());
        }
    }

    impl IntoValues for SystemTime {}
    impl Sealed for SystemTime {
        fn extend_into(self, values: &mut Vec<String>) {
            values.push(httpdate::fmt_http_date(self));
        }
    }

    impl IntoValues for u64 {}
    impl Sealed for u64 {
        fn extend_into(self, values: &mut Vec<String>) {
            values.push(itoa::Buffer::new().format(self).to_owned());
        }
    }

    impl IntoValues for usize {}
    impl Sealed for usize {
        fn extend_into(self, values: &mut Vec<String>) {
            values.push(itoa::Buffer::new().format(self).to_owned());
        }
    }

    impl IntoValues for i32 {}
    impl Sealed for i32 {
        fn extend_into(self, values: &mut Vec<String>) {
            values.push(itoa::Buffer::new().format(self).to_owned());
        }
    }
}

// ===== Macros =====

/// Build a [`Headers`] from `name: value` pairs.
///
/// Underscores in names are normalized to hyphens, so `content_length`
/// produces a `content-length` field.
#[macro_export]
macro_rules! headers {
    () => { $crate::headers::Headers::new() };
    ($($name:ident : $value:expr),* $(,)?) => {{
        let mut headers = $crate::headers::Headers::new();
        $(
            let name = stringify!($name).replace('_', "-").to_ascii_lowercase();
            headers.add(&name, $value);
        )*
        headers
    }};
}

// ===== Error =====

/// Header field line rejected by [`Headers::parse_line`].
#[derive(Debug)]
pub struct HeaderParseError {
    line: String,
}

impl HeaderParseError {
    fn new(line: &[u8]) -> Self {
        Self {
            line: String::from_utf8_lossy(line).into_owned(),
        }
    }
}

impl std::error::Error for HeaderParseError {}
impl std::fmt::Display for HeaderParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed header field line: {:?}", self.line)
    }
}

// ===== Test =====
