//! Alternate drivers over a workflow graph.
//!
//! Both drivers keep their own position and variables in memory and step
//! with the engine's shared primitives, so rollback and skip checks, gateway
//! selection and completion rules match the live engine.

mod cursor;
pub mod debug;
pub mod mock;

pub use debug::{CallStackFrame, DebugSession, DebugSnapshot, DebugStatus};
pub use mock::{
    MockCapabilities, MockScenario, MockSimulator, NodeMock, SimulationReport, SimulationStatus,
    TraceEntry,
};
