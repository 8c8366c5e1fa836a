//! Asset and inventory type tags, and raw asset payloads.

/// Kind of asset payload.
///
/// The discriminants are the grid's numeric asset type codes; the wire form
/// in archives is the short name returned by [`AssetType::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i8)]
pub enum AssetType {
    Texture = 0,
    Sound = 1,
    CallingCard = 2,
    Landmark = 3,
    Clothing = 5,
    Object = 6,
    Notecard = 7,
    LslText = 10,
    LslBytecode = 11,
    Bodypart = 13,
    Animation = 20,
    Gesture = 21,
    Mesh = 49,
    Settings = 56,
    Material = 57,
    None = -1,
}

impl AssetType {
    /// Short wire name.
    pub fn name(self) -> &'static str {
        match self {
            AssetType::Texture => "texture",
            AssetType::Sound => "sound",
            AssetType::CallingCard => "callcard",
            AssetType::Landmark => "landmark",
            AssetType::Clothing => "clothing",
            AssetType::Object => "object",
            AssetType::Notecard => "notecard",
            AssetType::LslText => "lsltext",
            AssetType::LslBytecode => "lslbyte",
            AssetType::Bodypart => "bodypart",
            AssetType::Animation => "animatn",
            AssetType::Gesture => "gesture",
            AssetType::Mesh => "mesh",
            AssetType::Settings => "settings",
            AssetType::Material => "material",
            AssetType::None => "-1",
        }
    }

    /// Looks up a type by its short wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "texture" => AssetType::Texture,
            "sound" => AssetType::Sound,
            "callcard" => AssetType::CallingCard,
            "landmark" => AssetType::Landmark,
            "clothing" => AssetType::Clothing,
            "object" => AssetType::Object,
            "notecard" => AssetType::Notecard,
            "lsltext" => AssetType::LslText,
            "lslbyte" => AssetType::LslBytecode,
            "bodypart" => AssetType::Bodypart,
            "animatn" => AssetType::Animation,
            "gesture" => AssetType::Gesture,
            "mesh" => AssetType::Mesh,
            "settings" => AssetType::Settings,
            "material" => AssetType::Material,
            "-1" => AssetType::None,
            _ => return None,
        };
        Some(ty)
    }

    /// Wearable payloads whose text lists texture ids.
    pub fn is_wearable(self) -> bool {
        matches!(self, AssetType::Clothing | AssetType::Bodypart)
    }

    /// Types that can only be fetched through the object that holds them.
    pub fn fetched_via_inventory(self) -> bool {
        matches!(self, AssetType::Notecard | AssetType::LslText)
    }

    /// Types whose upload is charged the per-upload price.
    pub fn is_paid_upload(self) -> bool {
        matches!(self, AssetType::Texture | AssetType::Sound | AssetType::Animation)
    }
}

/// Kind of inventory item, independent of the payload it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum InventoryType {
    Texture = 0,
    Sound = 1,
    CallingCard = 2,
    Landmark = 3,
    Object = 6,
    Notecard = 7,
    Category = 8,
    Lsl = 10,
    Snapshot = 15,
    Attachment = 17,
    Wearable = 18,
    Animation = 19,
    Gesture = 20,
    Mesh = 22,
    Settings = 25,
    Material = 26,
    None = -1,
}

impl InventoryType {
    /// The inventory type an item of the given asset type is created with.
    pub fn for_asset(asset_type: AssetType) -> Self {
        match asset_type {
            AssetType::Texture => InventoryType::Texture,
            AssetType::Sound => InventoryType::Sound,
            AssetType::CallingCard => InventoryType::CallingCard,
            AssetType::Landmark => InventoryType::Landmark,
            AssetType::Clothing | AssetType::Bodypart => InventoryType::Wearable,
            AssetType::Object => InventoryType::Object,
            AssetType::Notecard => InventoryType::Notecard,
            AssetType::LslText | AssetType::LslBytecode => InventoryType::Lsl,
            AssetType::Animation => InventoryType::Animation,
            AssetType::Gesture => InventoryType::Gesture,
            AssetType::Mesh => InventoryType::Mesh,
            AssetType::Settings => InventoryType::Settings,
            AssetType::Material => InventoryType::Material,
            AssetType::None => InventoryType::None,
        }
    }

    /// Numeric wire code.
    pub fn code(self) -> i8 {
        self as i8
    }

    /// Looks up a type by numeric wire code.
    pub fn from_code(code: i8) -> Option<Self> {
        let ty = match code {
            0 => InventoryType::Texture,
            1 => InventoryType::Sound,
            2 => InventoryType::CallingCard,
            3 => InventoryType::Landmark,
            6 => InventoryType::Object,
            7 => InventoryType::Notecard,
            8 => InventoryType::Category,
            10 => InventoryType::Lsl,
            15 => InventoryType::Snapshot,
            17 => InventoryType::Attachment,
            18 => InventoryType::Wearable,
            19 => InventoryType::Animation,
            20 => InventoryType::Gesture,
            22 => InventoryType::Mesh,
            25 => InventoryType::Settings,
            26 => InventoryType::Material,
            -1 => InventoryType::None,
            _ => return None,
        };
        Some(ty)
    }
}

/// Payload of an empty notecard, used when a notecard item has never been
/// saved and therefore has no asset.
pub const EMPTY_NOTECARD: &[u8] =
    b"Linden text version 2\n{\nLLEmbeddedItems version 1\n{\ncount 0\n}\nText length 0\n}\n";

/// An asset payload carried inside an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBlob {
    pub name: String,
    pub description: String,
    pub asset_type: AssetType,
    pub data: Vec<u8>,
}

impl AssetBlob {
    pub fn new(asset_type: AssetType, name: impl Into<String>, description: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            asset_type,
            data,
        }
    }
}
