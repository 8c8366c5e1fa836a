//! Operation lifecycle: owned handles and the single-active registry.
//!
//! Each export or import owns an [`OperationHandle`]. Closing the handle
//! (cancel, disconnect, host teardown) turns every later callback into a
//! no-op. The [`OperationRegistry`] allows one active operation per kind.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Export,
    Import,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Export => f.write_str("export"),
            OperationKind::Import => f.write_str("import"),
        }
    }
}

/// Shared liveness flag for one running operation.
///
/// Clones observe the same flag, so the host can keep a clone to cancel an
/// operation it has handed off.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    id: u64,
    kind: OperationKind,
    open: Arc<AtomicBool>,
}

impl OperationHandle {
    /// A handle not tracked by any registry.
    pub fn detached(kind: OperationKind) -> Self {
        Self::new(0, kind)
    }

    fn new(id: u64, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Closes the operation. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(operation = self.id, kind = %self.kind, "operation closed");
        }
    }
}

/// Hands out handles, at most one open handle per [`OperationKind`].
#[derive(Debug, Default)]
pub struct OperationRegistry {
    next_id: u64,
    export: Option<OperationHandle>,
    import: Option<OperationHandle>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: OperationKind) -> &mut Option<OperationHandle> {
        match kind {
            OperationKind::Export => &mut self.export,
            OperationKind::Import => &mut self.import,
        }
    }

    /// Opens a new operation of `kind`, failing while another is open.
    /// Handles closed since they were issued free their slot.
    pub fn begin(&mut self, kind: OperationKind) -> Result<OperationHandle, RegistryError> {
        self.next_id += 1;
        let id = self.next_id;
        let slot = self.slot(kind);
        if slot.as_ref().is_some_and(OperationHandle::is_open) {
            return Err(RegistryError::Busy(kind));
        }
        let handle = OperationHandle::new(id, kind);
        *slot = Some(handle.clone());
        info!(operation = id, %kind, "operation started");
        Ok(handle)
    }

    /// The open operation of `kind`, if any.
    pub fn active(&self, kind: OperationKind) -> Option<&OperationHandle> {
        let slot = match kind {
            OperationKind::Export => &self.export,
            OperationKind::Import => &self.import,
        };
        slot.as_ref().filter(|h| h.is_open())
    }

    /// Closes the open operation of `kind`, if any.
    pub fn cancel(&mut self, kind: OperationKind) {
        if let Some(handle) = self.slot(kind).take() {
            handle.close();
        }
    }

    /// Closes everything, e.g. on disconnect.
    pub fn cancel_all(&mut self) {
        self.cancel(OperationKind::Export);
        self.cancel(OperationKind::Import);
    }
}
