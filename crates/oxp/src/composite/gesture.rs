//! Typed view of the ascii gesture format.
//!
//! A gesture is a header (version, trigger key, modifier mask, trigger
//! phrase, replacement text, step count) followed by its steps, one value
//! per line. Animation and sound steps reference assets by id.

use crate::error::CompositeError;
use crate::model::{AssetType, Id};

const GESTURE_VERSION: u32 = 2;
const MAX_STEPS: usize = 255;

const STEP_ANIMATION: u32 = 0;
const STEP_SOUND: u32 = 1;
const STEP_CHAT: u32 = 2;
const STEP_WAIT: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum GestureStep {
    Animation { name: String, asset_id: Id, flags: u32 },
    Sound { name: String, asset_id: Id, flags: u32 },
    Chat { text: String, flags: u32 },
    Wait { seconds: f32, flags: u32 },
}

impl GestureStep {
    /// Referenced asset and its type, for animation and sound steps.
    pub fn asset(&self) -> Option<(Id, AssetType)> {
        match self {
            GestureStep::Animation { asset_id, .. } => Some((*asset_id, AssetType::Animation)),
            GestureStep::Sound { asset_id, .. } => Some((*asset_id, AssetType::Sound)),
            _ => None,
        }
    }

    fn asset_id_mut(&mut self) -> Option<&mut Id> {
        match self {
            GestureStep::Animation { asset_id, .. } | GestureStep::Sound { asset_id, .. } => Some(asset_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gesture {
    pub version: u32,
    pub key: u32,
    pub mask: u32,
    pub trigger: String,
    pub replace: String,
    pub steps: Vec<GestureStep>,
}

/// Line cursor with 1-based positions for error reporting.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            last: 0,
        }
    }

    fn text(&mut self, context: &'static str) -> Result<&'a str, CompositeError> {
        let (index, line) = self.inner.next().ok_or(CompositeError::UnexpectedEnd { context })?;
        self.last = index + 1;
        Ok(line.trim_end_matches('\r'))
    }

    fn number<T: std::str::FromStr>(&mut self, expected: &'static str) -> Result<T, CompositeError> {
        let line = self.text(expected)?;
        line.trim()
            .parse()
            .map_err(|_| CompositeError::Malformed { line: self.last, expected })
    }

    fn id(&mut self, context: &'static str) -> Result<Id, CompositeError> {
        let line = self.text(context)?.trim();
        Id::try_parse(line).map_err(|_| CompositeError::InvalidId {
            line: self.last,
            text: line.to_owned(),
        })
    }
}

impl Gesture {
    pub fn parse(text: &str) -> Result<Self, CompositeError> {
        let mut lines = Lines::new(text);

        let version = lines.number("gesture version")?;
        let key = lines.number("trigger key")?;
        let mask = lines.number("trigger mask")?;
        let trigger = lines.text("trigger")?.to_owned();
        let replace = lines.text("replacement")?.to_owned();
        let count: usize = lines.number("step count")?;
        if count > MAX_STEPS {
            return Err(CompositeError::TooMany { field: "steps", count, max: MAX_STEPS });
        }

        let mut steps = Vec::with_capacity(count);
        for _ in 0..count {
            let code: u32 = lines.number("step type")?;
            let step = match code {
                STEP_ANIMATION => GestureStep::Animation {
                    name: lines.text("animation name")?.to_owned(),
                    asset_id: lines.id("animation id")?,
                    flags: lines.number("step flags")?,
                },
                STEP_SOUND => GestureStep::Sound {
                    name: lines.text("sound name")?.to_owned(),
                    asset_id: lines.id("sound id")?,
                    flags: lines.number("step flags")?,
                },
                STEP_CHAT => GestureStep::Chat {
                    text: lines.text("chat text")?.to_owned(),
                    flags: lines.number("step flags")?,
                },
                STEP_WAIT => GestureStep::Wait {
                    seconds: lines.number("wait seconds")?,
                    flags: lines.number("step flags")?,
                },
                other => return Err(CompositeError::UnknownStep { code: other }),
            };
            steps.push(step);
        }

        Ok(Self {
            version,
            key,
            mask,
            trigger,
            replace,
            steps,
        })
    }

    /// Non-nil animation and sound references, in step order.
    pub fn references(&self) -> Vec<(Id, AssetType)> {
        self.steps
            .iter()
            .filter_map(GestureStep::asset)
            .filter(|(id, _)| !id.is_nil())
            .collect()
    }

    /// Replaces step asset ids for which `remap` has a substitute. Returns
    /// the number of replaced steps.
    pub fn rewrite(&mut self, remap: impl Fn(&Id) -> Option<Id>) -> usize {
        let mut replaced = 0;
        for step in &mut self.steps {
            if let Some(asset_id) = step.asset_id_mut() {
                if let Some(new_id) = remap(&*asset_id) {
                    *asset_id = new_id;
                    replaced += 1;
                }
            }
        }
        replaced
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n",
            self.version.max(GESTURE_VERSION),
            self.key,
            self.mask,
            self.trigger,
            self.replace,
            self.steps.len()
        );
        for step in &self.steps {
            let body = match step {
                GestureStep::Animation { name, asset_id, flags } => {
                    format!("{}\n{}\n{}\n{}\n", STEP_ANIMATION, name, asset_id.hyphenated(), flags)
                }
                GestureStep::Sound { name, asset_id, flags } => {
                    format!("{}\n{}\n{}\n{}\n", STEP_SOUND, name, asset_id.hyphenated(), flags)
                }
                GestureStep::Chat { text, flags } => format!("{}\n{}\n{}\n", STEP_CHAT, text, flags),
                GestureStep::Wait { seconds, flags } => format!("{}\n{:.6}\n{}\n", STEP_WAIT, seconds, flags),
            };
            out.push_str(&body);
        }
        out
    }
}
