//! Presence tracking: per-user records, transition rules, and decay.

pub mod record;
pub mod registry;

pub use pulse_core::events::PresenceStatus;
pub use record::PresenceRecord;
pub use registry::PresenceRegistry;
