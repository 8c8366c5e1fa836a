//! Payloads that reference other assets by id.
//!
//! Wearables list texture ids and gestures list animation and sound ids.
//! Both need those references discovered on export and rewritten to the
//! re-uploaded ids on import. The typed parsers handle well-formed payloads;
//! anything they reject falls back to a UUID pattern scan.

pub mod gesture;
pub mod scan;
pub mod wearable;

use tracing::debug;

pub use gesture::{Gesture, GestureStep};
pub use wearable::Wearable;

use crate::model::{AssetType, Id};

/// An id found inside a composite payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub id: Id,
    /// Type implied by where the id appeared, when the payload says.
    pub hint: Option<AssetType>,
}

/// Result of rewriting a composite payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub data: Vec<u8>,
    pub replaced: usize,
}

/// Returns true if payloads of this type can reference other assets.
pub fn is_composite(asset_type: AssetType) -> bool {
    asset_type.is_wearable() || asset_type == AssetType::Gesture
}

/// Finds the asset ids referenced by a composite payload. Non-composite
/// types yield nothing.
pub fn discover_references(asset_type: AssetType, data: &[u8]) -> Vec<Reference> {
    let text = std::str::from_utf8(data).ok();
    if asset_type.is_wearable() {
        match text.map(Wearable::parse) {
            Some(Ok(wearable)) => wearable
                .texture_ids()
                .into_iter()
                .map(|id| Reference { id, hint: Some(AssetType::Texture) })
                .collect(),
            parsed => {
                if let Some(Err(err)) = parsed {
                    debug!(%err, "wearable did not parse, scanning for texture ids");
                }
                scan::scan_ids_after(data, "textures")
                    .into_iter()
                    .map(|id| Reference { id, hint: Some(AssetType::Texture) })
                    .collect()
            }
        }
    } else if asset_type == AssetType::Gesture {
        match text.map(Gesture::parse) {
            Some(Ok(gesture)) => gesture
                .references()
                .into_iter()
                .map(|(id, ty)| Reference { id, hint: Some(ty) })
                .collect(),
            parsed => {
                if let Some(Err(err)) = parsed {
                    debug!(%err, "gesture did not parse, scanning for asset ids");
                }
                scan::scan_ids(data)
                    .into_iter()
                    .map(|id| Reference { id, hint: None })
                    .collect()
            }
        }
    } else {
        Vec::new()
    }
}

/// Rewrites the references of a composite payload through `remap`.
/// Returns `None` for non-composite types.
///
/// A payload the typed parser reproduces exactly is rewritten through it.
/// Anything else (invalid UTF-8, trailing bytes, unusual spacing) has its
/// ids replaced in place and every other byte kept; when the parser still
/// understood it, only the ids it found in reference positions change.
pub fn rewrite_references(
    asset_type: AssetType,
    data: &[u8],
    remap: impl Fn(&Id) -> Option<Id>,
) -> Option<Rewritten> {
    if !is_composite(asset_type) {
        return None;
    }
    let Ok(text) = std::str::from_utf8(data) else {
        debug!(?asset_type, "payload is not UTF-8, rewriting ids in place");
        return Some(rewrite_in_place(asset_type, data, None, &remap));
    };

    if asset_type.is_wearable() {
        if let Ok(mut wearable) = Wearable::parse(text) {
            if wearable.to_text() == text {
                let replaced = wearable.rewrite(&remap);
                return Some(Rewritten {
                    data: wearable.to_text().into_bytes(),
                    replaced,
                });
            }
            let ids = wearable.texture_ids();
            return Some(rewrite_in_place(asset_type, data, Some(ids.as_slice()), &remap));
        }
    } else if let Ok(mut gesture) = Gesture::parse(text) {
        if gesture.to_text() == text {
            let replaced = gesture.rewrite(&remap);
            return Some(Rewritten {
                data: gesture.to_text().into_bytes(),
                replaced,
            });
        }
        let ids: Vec<Id> = gesture.references().into_iter().map(|(id, _)| id).collect();
        return Some(rewrite_in_place(asset_type, data, Some(ids.as_slice()), &remap));
    }
    Some(rewrite_in_place(asset_type, data, None, &remap))
}

/// Byte-preserving replacement, limited to `only` when given.
fn rewrite_in_place(
    asset_type: AssetType,
    data: &[u8],
    only: Option<&[Id]>,
    remap: impl Fn(&Id) -> Option<Id>,
) -> Rewritten {
    let marker = asset_type.is_wearable().then_some("textures");
    let (data, replaced) = scan::replace_ids(data, marker, |id| {
        if only.is_some_and(|ids| !ids.contains(id)) {
            return None;
        }
        remap(id)
    });
    Rewritten { data, replaced }
}

/// Wearable type code from a wearable payload, if it parses.
pub fn wearable_type(data: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(data).ok()?;
    Wearable::parse(text).ok().map(|w| w.wearable_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sound_gesture(sound: Id) -> Vec<u8> {
        Gesture {
            version: 2,
            key: 0,
            mask: 0,
            trigger: "/hi".to_string(),
            replace: String::new(),
            steps: vec![GestureStep::Sound { name: "hi".to_string(), asset_id: sound, flags: 0 }],
        }
        .to_text()
        .into_bytes()
    }

    #[test]
    fn test_gesture_references_carry_types() {
        let sound = Uuid::from_u128(5);
        let refs = discover_references(AssetType::Gesture, &sound_gesture(sound));
        assert_eq!(refs, vec![Reference { id: sound, hint: Some(AssetType::Sound) }]);
    }

    #[test]
    fn test_wearable_fallback_scan() {
        // No type line, so the typed parser rejects it
        let tex = Uuid::from_u128(0xabc);
        let text = format!("LLWearable version 22\nShirt\ntextures 1\n0 {}\n", tex.hyphenated());
        let refs = discover_references(AssetType::Clothing, text.as_bytes());
        assert_eq!(refs, vec![Reference { id: tex, hint: Some(AssetType::Texture) }]);

        let new = Uuid::from_u128(0xdef);
        let out = rewrite_references(AssetType::Clothing, text.as_bytes(), |_| Some(new)).unwrap();
        assert_eq!(out.replaced, 1);
        assert!(String::from_utf8(out.data).unwrap().contains(&new.hyphenated().to_string()));
    }

    #[test]
    fn test_non_composite() {
        assert!(discover_references(AssetType::Notecard, b"whatever").is_empty());
        assert!(rewrite_references(AssetType::Texture, b"", |_| None).is_none());
        assert!(!is_composite(AssetType::Sound));
    }

    #[test]
    fn test_rewrite_keeps_trailing_and_invalid_bytes() {
        let old = Uuid::from_u128(5);
        let new = Uuid::from_u128(6);
        let mut data = sound_gesture(old);
        data.push(0);
        let out = rewrite_references(AssetType::Gesture, &data, |id| (*id == old).then_some(new)).unwrap();
        assert_eq!(out.replaced, 1);
        assert_eq!(out.data.last(), Some(&0));
        assert_eq!(out.data.len(), data.len());

        let mut data = b"LLWearable version 22\n\xff\xfe\ntextures 1\n0 ".to_vec();
        data.extend_from_slice(old.hyphenated().to_string().as_bytes());
        data.extend_from_slice(b"\n\x80");
        let out = rewrite_references(AssetType::Clothing, &data, |_| Some(new)).unwrap();
        assert_eq!(out.replaced, 1);
        assert!(out.data.starts_with(b"LLWearable version 22\n\xff\xfe\n"));
        assert!(out.data.ends_with(b"\n\x80"));
        assert_eq!(
            discover_references(AssetType::Clothing, &out.data),
            vec![Reference { id: new, hint: Some(AssetType::Texture) }]
        );
        assert_eq!(wearable_type(&data), None);
    }

    #[test]
    fn test_gesture_rewrite() {
        let old = Uuid::from_u128(5);
        let new = Uuid::from_u128(6);
        let out = rewrite_references(AssetType::Gesture, &sound_gesture(old), |id| (*id == old).then_some(new)).unwrap();
        assert_eq!(out.replaced, 1);
        assert_eq!(
            discover_references(AssetType::Gesture, &out.data),
            vec![Reference { id: new, hint: Some(AssetType::Sound) }]
        );
    }
}
