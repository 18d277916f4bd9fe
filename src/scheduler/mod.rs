pub mod job;
pub mod registry;
pub mod report;
pub mod status;

pub use job::{Entity, EntityKind, Job, RunState};
pub use registry::{EntityRegistry, Registry, ReloadSummary, SharedRegistry};
pub use report::{RendererTarget, Report};
pub use status::StartStatus;
