//! Pipeline observability events.
//!
//! Listeners are called best-effort from whichever thread handles the
//! block; the pipeline never depends on their ordering or success.

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A block is about to enter the transform sequence.
    BeforeTransform,
    /// A block left the transform sequence.
    AfterTransform,
    /// A block payload is about to be entropy-coded.
    BeforeEntropy,
    /// A block payload finished entropy coding.
    AfterEntropy,
    /// A block was fully decoded and verified.
    BlockDecoded,
}

/// A block-scoped notification.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The block the event refers to.
    pub block_id: u64,
    /// Payload size at this stage, in bytes.
    pub size: usize,
    /// Block checksum, when checksumming is enabled.
    pub checksum: Option<u32>,
}

/// Observer of pipeline progress.
pub trait Listener: Send + Sync {
    /// Receive one event.
    fn on_event(&self, event: &Event);
}
