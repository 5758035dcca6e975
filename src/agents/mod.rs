// Public module exports
pub mod assembler;
pub mod events;
pub mod master_agent;
pub mod prompt;
pub mod registry;
pub mod session;
pub mod task_detector;
pub mod video_agent;

// Re-export main types for convenience
pub use events::StreamEvent;
pub use master_agent::{MasterAgent, OrchestrationAction, TurnOptions, TurnRequest};
pub use registry::{Agent, AgentRegistry};
pub use session::{SessionManager, TurnContext, TurnPhase};
pub use task_detector::{GenerationMode, TaskDetector};
pub use video_agent::VideoAgent;
