//! Typed view of the text wearable format.
//!
//! ```text
//! LLWearable version 22
//! Shirt
//!     permissions 0
//!     { ... }
//! type 4
//! parameters 2
//! 781 0.5
//! 800 1
//! textures 1
//! 0 5748decc-f629-461c-9a36-a35a221fe21f
//! ```
//!
//! Only the lines that matter for archiving are interpreted; everything else
//! is kept verbatim so a rewrite changes nothing but texture ids.

use crate::error::CompositeError;
use crate::limits::MAX_FACES;
use crate::model::Id;

const HEADER: &str = "LLWearable version";

/// One `index id` line of the textures block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WearableTexture {
    pub index: u32,
    pub id: Id,
    line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wearable {
    lines: Vec<String>,
    trailing_newline: bool,
    pub wearable_type: u32,
    textures: Vec<WearableTexture>,
}

/// Splits a trimmed line into exactly a keyword and one value.
fn keyword_value<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let mut parts = line.split_whitespace();
    if parts.next()? != keyword {
        return None;
    }
    let value = parts.next()?;
    parts.next().is_none().then_some(value)
}

impl Wearable {
    pub fn parse(text: &str) -> Result<Self, CompositeError> {
        let lines: Vec<String> = text.lines().map(str::to_owned).collect();
        match lines.first() {
            Some(first) if first.trim_start().starts_with(HEADER) => {}
            _ => return Err(CompositeError::Malformed { line: 1, expected: "wearable header" }),
        }

        let mut wearable_type = None;
        let mut textures = Vec::new();
        let mut i = 1;
        while i < lines.len() {
            if let Some(value) = keyword_value(&lines[i], "type") {
                let ty = value
                    .parse()
                    .map_err(|_| CompositeError::Malformed { line: i + 1, expected: "wearable type" })?;
                wearable_type = Some(ty);
            } else if let Some(value) = keyword_value(&lines[i], "textures") {
                let count: usize = value
                    .parse()
                    .map_err(|_| CompositeError::Malformed { line: i + 1, expected: "texture count" })?;
                if count > MAX_FACES {
                    return Err(CompositeError::TooMany { field: "textures", count, max: MAX_FACES });
                }
                for line in i + 1..=i + count {
                    let text = lines
                        .get(line)
                        .ok_or(CompositeError::UnexpectedEnd { context: "texture entry" })?;
                    textures.push(parse_texture_line(text, line)?);
                }
                i += count;
            }
            i += 1;
        }

        Ok(Self {
            lines,
            trailing_newline: text.ends_with('\n'),
            wearable_type: wearable_type.ok_or(CompositeError::UnexpectedEnd { context: "wearable type" })?,
            textures,
        })
    }

    pub fn textures(&self) -> &[WearableTexture] {
        &self.textures
    }

    /// Non-nil texture ids, in block order.
    pub fn texture_ids(&self) -> Vec<Id> {
        self.textures.iter().map(|t| t.id).filter(|id| !id.is_nil()).collect()
    }

    /// Replaces texture ids for which `remap` has a substitute. Returns the
    /// number of replaced entries.
    pub fn rewrite(&mut self, remap: impl Fn(&Id) -> Option<Id>) -> usize {
        let mut replaced = 0;
        for texture in &mut self.textures {
            if let Some(new_id) = remap(&texture.id) {
                texture.id = new_id;
                self.lines[texture.line] = format!("{} {}", texture.index, new_id.hyphenated());
                replaced += 1;
            }
        }
        replaced
    }

    pub fn to_text(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }
}

fn parse_texture_line(text: &str, line: usize) -> Result<WearableTexture, CompositeError> {
    let mut parts = text.split_whitespace();
    let index = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(CompositeError::Malformed { line: line + 1, expected: "texture index" })?;
    let raw = parts
        .next()
        .ok_or(CompositeError::Malformed { line: line + 1, expected: "texture id" })?;
    let id = Id::try_parse(raw).map_err(|_| CompositeError::InvalidId {
        line: line + 1,
        text: raw.to_owned(),
    })?;
    Ok(WearableTexture { index, id, line })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const SHIRT: &str = "LLWearable version 22\n\
Shirt\n\
\tpermissions 0\n\
\t{\n\
\t\tbase_mask\t7fffffff\n\
\t\tcreator_id\t11111111-2222-4333-8444-555555555555\n\
\t}\n\
\tsale_info\t0\n\
\t{\n\
\t\tsale_type\tnot\n\
\t\tsale_price\t10\n\
\t}\n\
type 4\n\
parameters 1\n\
781 0.5\n\
textures 2\n\
0 aaaaaaaa-bbbb-4ccc-8ddd-eeeeeeeeeeee\n\
1 00000000-0000-0000-0000-000000000000\n";

    #[test]
    fn test_parse_shirt() {
        let shirt = Wearable::parse(SHIRT).unwrap();
        assert_eq!(shirt.wearable_type, 4);
        assert_eq!(shirt.textures().len(), 2);
        assert_eq!(
            shirt.texture_ids(),
            vec![Uuid::parse_str("aaaaaaaa-bbbb-4ccc-8ddd-eeeeeeeeeeee").unwrap()]
        );
        assert_eq!(shirt.to_text(), SHIRT);
    }

    #[test]
    fn test_rewrite_only_textures() {
        let mut shirt = Wearable::parse(SHIRT).unwrap();
        let old = Uuid::parse_str("aaaaaaaa-bbbb-4ccc-8ddd-eeeeeeeeeeee").unwrap();
        let new = Uuid::from_u128(0x42);

        let replaced = shirt.rewrite(|id| (*id == old).then_some(new));
        assert_eq!(replaced, 1);

        let text = shirt.to_text();
        assert!(text.contains(&format!("0 {}", new.hyphenated())));
        assert!(text.contains("creator_id\t11111111-2222-4333-8444-555555555555"));
        assert_eq!(Wearable::parse(&text).unwrap().texture_ids(), vec![new]);
    }

    #[test]
    fn test_rejects_other_payloads() {
        assert!(matches!(
            Wearable::parse("Linden text version 2\n"),
            Err(CompositeError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_truncated_texture_block() {
        let text = "LLWearable version 22\nShirt\ntype 4\ntextures 3\n0 aaaaaaaa-bbbb-4ccc-8ddd-eeeeeeeeeeee\n";
        assert!(matches!(
            Wearable::parse(text),
            Err(CompositeError::UnexpectedEnd { context: "texture entry" })
        ));
    }
}
