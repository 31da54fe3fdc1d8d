//! Ledger entries and the ledger text format.
//!
//! The ledger file is a flat, human-readable table:
//!
//! ```text
//! # snipsync ledger v1
//! 0b6f1c0e-snippet,2024-05-01T10:00:00Z,2024-05-01T10:00:00Z
//! 7d1e44a2-snippet,2024-05-02T08:15:30Z,2024-05-02T08:15:31Z
//! ```
//!
//! Rows are `id,localFingerprint,remoteFingerprint`, sorted by id so that an
//! unchanged ledger encodes to identical bytes. `%`, `,`, CR and LF inside a
//! field are percent-escaped.

use crate::error::{ProtocolError, ProtocolResult};
use crate::fingerprint::Fingerprint;
use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// First line of every ledger file.
pub const LEDGER_HEADER: &str = "# snipsync ledger v1";

/// Last synchronized fingerprint pair of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Local fingerprint after the last successful sync of the item.
    pub local: Fingerprint,
    /// Remote fingerprint after the last successful sync of the item.
    pub remote: Fingerprint,
}

impl LedgerEntry {
    /// Creates an entry.
    pub fn new(local: impl Into<Fingerprint>, remote: impl Into<Fingerprint>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// Encodes ledger entries. Iteration order of the map gives sorted rows.
pub fn encode_ledger(entries: &BTreeMap<ItemId, LedgerEntry>) -> String {
    let mut out = String::with_capacity(LEDGER_HEADER.len() + 1 + entries.len() * 64);
    out.push_str(LEDGER_HEADER);
    out.push('\n');
    for (id, entry) in entries {
        out.push_str(&escape(id.as_str()));
        out.push(',');
        out.push_str(&escape(entry.local.as_str()));
        out.push(',');
        out.push_str(&escape(entry.remote.as_str()));
        out.push('\n');
    }
    out
}

/// Decodes ledger text.
///
/// Blank lines are ignored. A missing header, a row without exactly three
/// fields, an empty id, a bad escape or a duplicate id makes the whole text
/// invalid.
pub fn decode_ledger(text: &str) -> ProtocolResult<BTreeMap<ItemId, LedgerEntry>> {
    let mut lines = text.lines().enumerate();

    match lines.next() {
        Some((_, header)) if header.trim_end() == LEDGER_HEADER => {}
        Some((_, header)) => return Err(ProtocolError::UnsupportedLedger(header.to_owned())),
        None => return Ok(BTreeMap::new()),
    }

    let mut entries = BTreeMap::new();
    for (index, line) in lines {
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(ProtocolError::corrupt(
                line_no,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }

        let id = unescape(fields[0], line_no)?;
        if id.is_empty() {
            return Err(ProtocolError::corrupt(line_no, "empty item id"));
        }
        let local = unescape(fields[1], line_no)?;
        let remote = unescape(fields[2], line_no)?;

        let previous = entries.insert(ItemId::new(id), LedgerEntry::new(local, remote));
        if previous.is_some() {
            return Err(ProtocolError::corrupt(line_no, "duplicate item id"));
        }
    }

    Ok(entries)
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ',' => out.push_str("%2C"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(field: &str, line: usize) -> ProtocolResult<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        let decoded = match code.as_str() {
            "25" => '%',
            "2C" => ',',
            "0A" => '\n',
            "0D" => '\r',
            other => {
                return Err(ProtocolError::corrupt(
                    line,
                    format!("invalid escape sequence %{other}"),
                ))
            }
        };
        out.push(decoded);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> BTreeMap<ItemId, LedgerEntry> {
        let mut entries = BTreeMap::new();
        entries.insert(
            ItemId::from("b-snippet"),
            LedgerEntry::new("2024-05-02T08:15:30Z", "2024-05-02T08:15:31Z"),
        );
        entries.insert(
            ItemId::from("a-snippet"),
            LedgerEntry::new("2024-05-01T10:00:00Z", "2024-05-01T10:00:00Z"),
        );
        entries
    }

    #[test]
    fn encodes_sorted_rows_under_header() {
        let text = encode_ledger(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], LEDGER_HEADER);
        assert!(lines[1].starts_with("a-snippet,"));
        assert!(lines[2].starts_with("b-snippet,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn decode_reverses_encode() {
        let entries = sample();
        assert_eq!(decode_ledger(&encode_ledger(&entries)).unwrap(), entries);
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut entries = BTreeMap::new();
        entries.insert(
            ItemId::from("odd,id%\nname"),
            LedgerEntry::new("rev,1", "rev\r2"),
        );
        let text = encode_ledger(&entries);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("odd%2Cid%25%0Aname"));
        assert_eq!(decode_ledger(&text).unwrap(), entries);
    }

    #[test]
    fn empty_text_is_empty_ledger() {
        assert!(decode_ledger("").unwrap().is_empty());
        assert!(decode_ledger(&format!("{LEDGER_HEADER}\n\n")).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(
            decode_ledger("id,local,remote\n"),
            Err(ProtocolError::UnsupportedLedger(_))
        ));

        let missing_field = format!("{LEDGER_HEADER}\nabc,only-local\n");
        assert!(matches!(
            decode_ledger(&missing_field),
            Err(ProtocolError::CorruptLedger { line: 2, .. })
        ));

        let bad_escape = format!("{LEDGER_HEADER}\nab%ZZ,l,r\n");
        assert!(decode_ledger(&bad_escape).is_err());

        let duplicate = format!("{LEDGER_HEADER}\na,l,r\na,l2,r2\n");
        assert!(matches!(
            decode_ledger(&duplicate),
            Err(ProtocolError::CorruptLedger { line: 3, .. })
        ));

        let empty_id = format!("{LEDGER_HEADER}\n,l,r\n");
        assert!(decode_ledger(&empty_id).is_err());
    }

    proptest! {
        #[test]
        fn arbitrary_fields_survive_encoding(
            rows in proptest::collection::btree_map("[a-z0-9,%\\n-]{1,12}", ("\\PC{0,16}", "\\PC{0,16}"), 0..8)
        ) {
            let entries: BTreeMap<ItemId, LedgerEntry> = rows
                .into_iter()
                .map(|(id, (l, r))| (ItemId::new(id), LedgerEntry::new(l, r)))
                .collect();
            let decoded = decode_ledger(&encode_ledger(&entries)).unwrap();
            prop_assert_eq!(decoded, entries);
        }
    }
}
