//! W3C `tracestate` reader/writer.
//!
//! A `tracestate` header is a comma-separated list of `key=value` entries
//! contributed by different tracing systems. This codec isolates one entry,
//! identified by a configured key, from everything else: parsing hands the
//! entry's value span to a caller-supplied handler and returns the remaining
//! entries re-joined for later re-emission; writing puts this system's entry
//! first, followed by the others.
//!
//! See <https://www.w3.org/TR/trace-context/#tracestate-header>.

/// Reads and writes one tracing system's entry within a `tracestate` header.
#[derive(Clone, Debug)]
pub struct TracestateFormat {
    key: String,
}

/// Total output length past which the W3C spec recommends trimming.
const TRACESTATE_RECOMMENDED_MAX: usize = 512;

impl TracestateFormat {
    /// Create a format isolating entries under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        TracestateFormat { key: key.into() }
    }

    /// The entry key this format owns.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize a header carrying `this_value` under this format's key,
    /// followed by `other_entries` when present.
    pub fn write(&self, this_value: &str, other_entries: Option<&str>) -> String {
        let others = other_entries.filter(|entries| !entries.is_empty());
        let mut header =
            String::with_capacity(self.key.len() + 1 + this_value.len() + 1 + others.map_or(0, str::len));
        header.push_str(&self.key);
        header.push('=');
        header.push_str(this_value);
        if let Some(others) = others {
            header.push(',');
            header.push_str(others);
        }
        if header.len() > TRACESTATE_RECOMMENDED_MAX {
            tracing::warn!(
                length = header.len(),
                limit = TRACESTATE_RECOMMENDED_MAX,
                "tracestate header exceeds the recommended maximum length"
            );
        }
        header
    }

    /// Scan `tracestate` for this format's entry.
    ///
    /// `handler` is invoked with the header and the begin/end byte offsets of
    /// the entry's raw value (which may be empty or whitespace-only). Only
    /// the first matching entry counts; later entries under the same key are
    /// treated like any other entry. Returning `false` from the handler
    /// stops the scan, and everything after the handled entry passes through
    /// to the result untouched.
    ///
    /// Returns the remaining entries as a comma-joined string, or `None`
    /// when this entry was all the header held.
    pub fn parse_and_return_other_entries<H>(
        &self,
        tracestate: &str,
        mut handler: H,
    ) -> Option<String>
    where
        H: FnMut(&str, usize, usize) -> bool,
    {
        let mut other_entries: Option<String> = None;
        let mut this_entry_seen = false;
        let mut pos = 0;

        while pos < tracestate.len() {
            let end = tracestate[pos..]
                .find(',')
                .map(|comma| comma + pos)
                .unwrap_or(tracestate.len());
            let entry = &tracestate[pos..end];

            if !entry.trim_matches(ows).is_empty() {
                match entry.find('=') {
                    Some(separator) => {
                        // OWS is trimmed around keys, never inside values
                        let key = entry[..separator].trim_matches(ows);
                        let value_begin = pos + separator + 1;
                        if !this_entry_seen && key == self.key {
                            this_entry_seen = true;
                            if !handler(tracestate, value_begin, end) {
                                if end < tracestate.len() {
                                    append_entry(&mut other_entries, &tracestate[end + 1..]);
                                }
                                return other_entries;
                            }
                        } else {
                            let mut rebuilt =
                                String::with_capacity(key.len() + 1 + (end - value_begin));
                            rebuilt.push_str(key);
                            rebuilt.push('=');
                            rebuilt.push_str(&tracestate[value_begin..end]);
                            append_entry(&mut other_entries, &rebuilt);
                        }
                    }
                    // no separator: not an entry we can interpret, pass it on
                    None => append_entry(&mut other_entries, entry.trim_matches(ows)),
                }
            }
            pos = end + 1;
        }
        other_entries
    }
}

fn ows(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn append_entry(other_entries: &mut Option<String>, entry: &str) {
    let others = other_entries.get_or_insert_with(String::new);
    if !others.is_empty() {
        others.push(',');
    }
    others.push_str(entry);
}
