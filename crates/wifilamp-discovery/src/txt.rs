//! DNS-SD TXT record codec (RFC 6763 §6).
//!
//! A TXT record is a sequence of length-prefixed strings, each `key=value`
//! or a bare `key` for a boolean attribute.

use tracing::debug;

/// Longest string a single length byte can describe.
const MAX_ENTRY_LEN: usize = u8::MAX as usize;

/// Parsed TXT attributes, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxtRecord {
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl TxtRecord {
    /// Parses a wire-format TXT blob.
    ///
    /// Entries with an empty key are ignored. Fails only when a length byte
    /// points past the end of the blob.
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let mut entries: Vec<(String, Option<Vec<u8>>)> = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let len = data[pos] as usize;
            pos += 1;

            let end = pos + len;
            if end > data.len() {
                return Err(format!(
                    "entry at offset {} claims {} bytes but only {} remain",
                    pos - 1,
                    len,
                    data.len() - pos
                ));
            }

            let entry = &data[pos..end];
            pos = end;

            if entry.is_empty() {
                continue;
            }

            let (key, value) = match entry.iter().position(|b| *b == b'=') {
                Some(eq) => (&entry[..eq], Some(entry[eq + 1..].to_vec())),
                None => (entry, None),
            };

            if key.is_empty() {
                continue;
            }

            let key = String::from_utf8_lossy(key).into_owned();

            // The first occurrence of a key wins
            if entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(&key)) {
                continue;
            }

            entries.push((key, value));
        }

        Ok(Self { entries })
    }

    /// Looks up a key, case-insensitively.
    ///
    /// `Some(None)` means the key is present as a boolean attribute.
    pub fn get(&self, key: &str) -> Option<Option<&[u8]>> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&[u8]>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// Encodes attributes into a wire-format TXT blob.
///
/// No attributes encode to a single zero byte. Entries longer than 255
/// bytes cannot be represented and are skipped.
pub fn encode<'a, I>(attributes: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
{
    let mut out = Vec::new();

    for (key, value) in attributes {
        let mut entry = key.as_bytes().to_vec();
        if let Some(value) = value {
            entry.push(b'=');
            entry.extend_from_slice(value);
        }

        if entry.len() > MAX_ENTRY_LEN {
            debug!(key, len = entry.len(), "Skipping oversized TXT entry");
            continue;
        }

        out.push(entry.len() as u8);
        out.extend_from_slice(&entry);
    }

    if out.is_empty() {
        out.push(0);
    }

    out
}
