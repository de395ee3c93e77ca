//! Hosting surface: resolution contexts, the process-wide handle
//! registry, the engine-loader boundary, and the startup pipeline.

pub mod context;
pub mod engine;
pub mod registry;
pub mod startup;

pub use context::{HostContext, ResolutionPlan};
pub use engine::{EngineHandle, EngineLoader, StubEngine};
pub use registry::{ContextHandle, ContextRegistry};
pub use startup::{initialize, initialize_for_app, initialize_for_bundle, run_app};
