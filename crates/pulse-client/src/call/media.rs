//! Local media collaborator.

use async_trait::async_trait;
use uuid::Uuid;

use pulse_core::events::CallMode;
use pulse_core::AppResult;

/// Handle to acquired local capture (camera/microphone).
///
/// These are scarce exclusive resources; whoever acquires one must release
/// it before the owning session reaches `Ended`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    /// Opaque stream identifier.
    pub stream_id: Uuid,
    /// What was captured.
    pub mode: CallMode,
}

/// Access to local capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync + std::fmt::Debug + 'static {
    /// Acquires local capture for a mode.
    ///
    /// Fails with a `Media` error when permission or device acquisition
    /// fails; that failure is terminal for the call attempt that requested
    /// it.
    async fn acquire(&self, mode: CallMode) -> AppResult<LocalMedia>;

    /// Releases previously acquired capture. Synchronous: the devices must
    /// be free by the time this returns.
    fn release(&self, media: &LocalMedia);
}
