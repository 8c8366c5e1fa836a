//! UUID pattern scanning for payloads the typed parsers reject.
//!
//! Works on raw bytes, so payloads that are not UTF-8 or carry trailing
//! bytes come back unchanged apart from the replaced ids.

use lazy_static::lazy_static;
use regex::bytes::{Captures, Regex};

use crate::model::Id;

lazy_static! {
    static ref UUID_PATTERN: Regex =
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("uuid pattern is a valid regex");
}

/// Offset of the last occurrence of `marker`, or 0 when there is none.
/// `None` means the marker was required and is absent.
fn scan_start(data: &[u8], marker: Option<&str>) -> Option<usize> {
    let Some(marker) = marker else {
        return Some(0);
    };
    let marker = marker.as_bytes();
    if marker.is_empty() || marker.len() > data.len() {
        return None;
    }
    data.windows(marker.len()).rposition(|w| w == marker)
}

/// Every id in `data`, in order of appearance, nil excluded.
pub fn scan_ids(data: &[u8]) -> Vec<Id> {
    UUID_PATTERN
        .find_iter(data)
        .filter_map(|m| Id::try_parse_ascii(m.as_bytes()).ok())
        .filter(|id| !id.is_nil())
        .collect()
}

/// Ids appearing after the last occurrence of `marker`, or none when the
/// marker is absent.
pub fn scan_ids_after(data: &[u8], marker: &str) -> Vec<Id> {
    match scan_start(data, Some(marker)) {
        Some(pos) => scan_ids(&data[pos..]),
        None => Vec::new(),
    }
}

/// Replaces every id in `data` after the last `marker` (or everywhere when
/// `marker` is `None`) for which `remap` yields a replacement. Returns the
/// rewritten bytes and the number of replacements.
pub fn replace_ids(data: &[u8], marker: Option<&str>, remap: impl Fn(&Id) -> Option<Id>) -> (Vec<u8>, usize) {
    let Some(start) = scan_start(data, marker) else {
        return (data.to_vec(), 0);
    };

    let mut replaced = 0;
    let tail = UUID_PATTERN.replace_all(&data[start..], |caps: &Captures<'_>| {
        let found = &caps[0];
        match Id::try_parse_ascii(found).ok().and_then(|id| remap(&id)) {
            Some(new_id) => {
                replaced += 1;
                new_id.hyphenated().to_string().into_bytes()
            }
            None => found.to_vec(),
        }
    });

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..start]);
    out.extend_from_slice(&tail);
    (out, replaced)
}
