//! Export a linkset to an archive on one grid and rebuild it on another.

mod common;

use common::{AGENT, STRANGER, SourceGrid, TargetGrid};
use oxp::codec::encode_manifest;
use oxp::composite::{Gesture, GestureStep};
use oxp::export::ExportState;
use oxp::import::{ObjectUpdate, UploadTransport};
use oxp::model::{AssetType, Permissions, PrimRecord, Quaternion, TextureEntry, Vector3};
use oxp::{
    ExportOperation, ExportOptions, ExportPolicy, GridKind, Id, ImportError, ImportOperation, ImportOptions,
    ImportState, InventoryRecord, LinksetSnapshot, ManifestHeader, OperationKind, OperationRegistry, PrimSnapshot,
};
use md5::{Digest, Md5};
use std::path::Path;
use uuid::Uuid;

const TEX: Id = Uuid::from_u128(0x7e1);
const TEX2: Id = Uuid::from_u128(0x7e2);
const WAVE: Id = Uuid::from_u128(0xa01);
const BOW: Id = Uuid::from_u128(0xa02);
const CHIME: Id = Uuid::from_u128(0x50d);
const GESTURE: Id = Uuid::from_u128(0x6e5);
const NOTE: Id = Uuid::from_u128(0x407e);

fn prim(id: u128, creator: Id, texture: Id, position: Vector3) -> PrimSnapshot {
    let mut params = PrimRecord::placeholder(position, Vector3::new(0.5, 0.5, 0.5), Quaternion::IDENTITY, None, None);
    params.textures = vec![TextureEntry::with_image(texture)];
    params.permissions = Some(Permissions {
        creator,
        owner: AGENT,
        ..Permissions::default()
    });
    params.material = 0;
    params.name = format!("prim {id}");
    PrimSnapshot {
        id: Uuid::from_u128(id),
        params,
    }
}

fn gesture() -> Gesture {
    Gesture {
        version: 2,
        key: 0,
        mask: 0,
        trigger: "/greet".to_string(),
        replace: String::new(),
        steps: vec![
            GestureStep::Animation { name: "wave".to_string(), asset_id: WAVE, flags: 0 },
            GestureStep::Sound { name: "chime".to_string(), asset_id: CHIME, flags: 0 },
            GestureStep::Chat { text: "hello".to_string(), flags: 0 },
            GestureStep::Animation { name: "bow".to_string(), asset_id: BOW, flags: 0 },
        ],
    }
}

/// A two-prim chair with a gesture, a notecard and an item the agent did
/// not create in its root.
fn source() -> (SourceGrid, Vec<LinksetSnapshot>) {
    let mut grid = SourceGrid::new();
    grid.own(TEX, AssetType::Texture, "seat", vec![1; 16]);
    grid.own(TEX2, AssetType::Texture, "back", vec![2; 16]);
    grid.own(WAVE, AssetType::Animation, "wave", vec![3; 8]);
    grid.own(BOW, AssetType::Animation, "bow", vec![4; 8]);
    grid.own(CHIME, AssetType::Sound, "chime", vec![5; 8]);
    grid.own(GESTURE, AssetType::Gesture, "greet", gesture().to_text().into_bytes());
    grid.own(NOTE, AssetType::Notecard, "readme", b"sit here".to_vec());

    let root = prim(1, AGENT, TEX, Vector3::new(100.0, 100.0, 20.0));
    grid.contents.insert(
        root.id,
        vec![
            InventoryRecord::new(Uuid::from_u128(0x100), "greet", AssetType::Gesture, GESTURE, Permissions::created_by(AGENT)),
            InventoryRecord::new(Uuid::from_u128(0x101), "readme", AssetType::Notecard, NOTE, Permissions::created_by(AGENT)),
            InventoryRecord::new(Uuid::from_u128(0x102), "gift", AssetType::Notecard, NOTE, Permissions::created_by(STRANGER)),
        ],
    );
    let linkset = LinksetSnapshot {
        root,
        children: vec![prim(2, AGENT, TEX2, Vector3::new(0.0, 0.0, 1.0))],
    };
    (grid, vec![linkset])
}

fn export(path: &Path) -> SourceGrid {
    let mut registry = OperationRegistry::new();
    let (mut grid, selection) = source();
    let mut op = ExportOperation::begin(
        registry.begin(OperationKind::Export).unwrap(),
        ExportPolicy::new(AGENT, GridKind::Managed),
        ExportOptions::default().with_inventory(true),
        ManifestHeader::stamped("Builder", "1.0", "Resident", "agni"),
        selection,
        path,
        &mut grid,
    )
    .unwrap();
    grid.serve(&mut op);
    assert_eq!(op.state(), ExportState::Done);
    assert!(registry.active(OperationKind::Export).is_none());
    grid
}

#[test]
fn test_export_then_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chair.oxp");
    let source = export(&path);

    let report = &source.finished[0];
    assert_eq!(report.prims, 2);
    assert_eq!(report.placeholder_prims, 0);
    assert_eq!(report.skipped_items, 1);
    assert_eq!(source.failed, 0);

    let mut registry = OperationRegistry::new();
    let handle = registry.begin(OperationKind::Import).unwrap();
    let mut op = ImportOperation::open(handle, &path, ImportOptions::default()).unwrap();
    let summary = op.summary().clone();
    assert_eq!(summary.header.author, "Resident");
    assert_eq!(summary.header.creation_date.len(), 10);
    assert_eq!((summary.linksets, summary.prims, summary.inventory_items), (1, 2, 2));
    assert_eq!((summary.textures, summary.sounds, summary.animations, summary.generic), (2, 1, 2, 2));

    let mut target = TargetGrid::new();
    op.start(&mut target).unwrap();
    target.serve(&mut op);
    assert_eq!(op.state(), ImportState::Done);
    assert!(registry.active(OperationKind::Import).is_none());

    // every referenced asset was re-uploaded once, the gesture after its parts
    assert_eq!(target.uploads.len(), 7);
    let position = |id: &Id| target.uploads.iter().position(|u| u.old_asset_id == *id).unwrap();
    for part in [WAVE, BOW, CHIME] {
        assert!(position(&part) < position(&GESTURE));
    }

    // the gesture payload reaches the update transport already rewritten
    let upload = target.upload_for(&GESTURE).unwrap();
    assert!(matches!(upload.transport, UploadTransport::UpdateGesture { .. }));
    let rewritten = Gesture::parse(std::str::from_utf8(&upload.data).unwrap()).unwrap();
    let parts: Vec<Id> = rewritten.references().into_iter().map(|(id, _)| id).collect();
    let expected: Vec<Id> = [WAVE, CHIME, BOW].iter().map(|id| target.new_id_of(id).unwrap()).collect();
    assert_eq!(parts, expected);

    // both prims rebuilt, linked once, relative transform kept
    assert_eq!(target.created.len(), 2);
    let (root_request, root) = &target.created[0];
    let (child_request, child) = &target.created[1];
    assert!(root_request.is_root);
    assert!(!child_request.is_root);
    let offset = child_request.position - root_request.position;
    assert!(offset.approx_eq(&Vector3::new(0.0, 0.0, 1.0), 1e-4));
    assert_eq!(target.links, vec![vec![*root, *child]]);

    // faces point at the re-uploaded textures
    let faces = target
        .updates_for(root)
        .into_iter()
        .find_map(|u| match u {
            ObjectUpdate::Textures(faces) => Some(faces.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(faces[0].image_id, target.new_id_of(&TEX).unwrap());

    // contents dropped into the root by their new items
    assert_eq!(target.drops.len(), 2);
    assert!(target.drops.iter().all(|(object, _)| object == root));

    let report = &target.finished[0];
    assert_eq!(report.uploaded, 7);
    assert_eq!(report.objects_created, 2);
    assert_eq!(report.items_dropped, 2);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_future_version_issues_no_requests() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.oxp");
    export(&path);

    let manifest = oxp::read_archive(&path).unwrap();
    let mut bytes = encode_manifest(&manifest).unwrap();
    // the version varint follows the four magic bytes
    bytes[4] += 1;

    let target = TargetGrid::new();
    let handle = oxp::OperationHandle::detached(OperationKind::Import);
    let err = ImportOperation::from_bytes(handle, &bytes, ImportOptions::default()).unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedVersion { found: 2, supported: 1 }));
    assert_eq!(target.requests(), 0);
}

#[test]
fn test_insufficient_funds_prompts_and_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("costly.oxp");
    export(&path);

    let mut target = TargetGrid::new();
    target.balance = 20;
    let handle = oxp::OperationHandle::detached(OperationKind::Import);
    let mut op = ImportOperation::open(handle, &path, ImportOptions::default()).unwrap();
    let err = op.start(&mut target).unwrap_err();

    // two textures, one sound and two animations at 10 each
    assert!(matches!(err, ImportError::InsufficientFunds { cost: 50 }));
    assert_eq!(target.prompts, vec![50]);
    assert_eq!(target.requests(), 0);
    assert_eq!(op.state(), ImportState::Idle);
}

#[test]
fn test_import_without_uploads_keeps_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("same-grid.oxp");
    export(&path);

    let mut target = TargetGrid::new();
    target.balance = 0;
    let handle = oxp::OperationHandle::detached(OperationKind::Import);
    let mut op = ImportOperation::open(handle, &path, ImportOptions::without_uploads()).unwrap();
    op.start(&mut target).unwrap();
    target.serve(&mut op);

    assert_eq!(op.state(), ImportState::Done);
    assert!(target.uploads.is_empty());
    let (_, root) = target.created[0];
    let faces = target
        .updates_for(&root)
        .into_iter()
        .find_map(|u| match u {
            ObjectUpdate::Textures(faces) => Some(faces.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(faces[0].image_id, TEX);
    // nothing in the target inventory holds the archived contents
    assert!(target.drops.is_empty());
}

#[test]
fn test_legacy_grid_keys_assets_by_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.oxp");
    export(&path);

    let mut target = TargetGrid::new();
    target.capabilities.clear();
    let handle = oxp::OperationHandle::detached(OperationKind::Import);
    let mut op = ImportOperation::open(handle, &path, ImportOptions::default()).unwrap();
    op.start(&mut target).unwrap();
    target.serve(&mut op);
    assert_eq!(op.state(), ImportState::Done);

    let upload = target.upload_for(&TEX).unwrap();
    assert!(matches!(upload.transport, UploadTransport::LegacyStore { temporary: false }));
    let mut input = upload.transaction_id.as_bytes().to_vec();
    input.extend_from_slice(target.session.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&Md5::digest(&input));
    let stored = Uuid::from_bytes(bytes);

    let (_, root) = target.created[0];
    let faces = target
        .updates_for(&root)
        .into_iter()
        .find_map(|u| match u {
            ObjectUpdate::Textures(faces) => Some(faces.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(faces[0].image_id, stored);
}
