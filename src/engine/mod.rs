//! The synchronisation and compilation engine.
//!
//! * [`overlay`]: bars + signal descriptor → [`crate::models::ChartSpec`]
//! * [`reconciler`]: price ticks merged into signal records
//! * [`scheduler`]: per-source refresh timers, one fetch in flight at a time
//! * [`probe`]: resource-version polling with coalesced change callbacks
//! * [`lifecycle`]: the cancellation token handed out by both of the above

pub mod lifecycle;
pub mod overlay;
pub mod probe;
pub mod reconciler;
pub mod scheduler;

pub use lifecycle::LifecycleToken;
pub use overlay::compile;
pub use probe::{FreshnessProbe, ProbeHandle, ProbeStatus, VersionLedger, VersionSource};
pub use reconciler::reconcile;
pub use scheduler::{
    RefreshJob, RefreshScheduler, RefreshTrigger, SourceHandle, SourceOptions, SourceState,
    SourceStatus,
};
