pub mod agents;
pub mod backend;
pub mod error;
pub mod handlers;
pub mod init;
pub mod models;
pub mod storage;
pub mod types;

pub use crate::storage::{AiConfig, AppState};
pub use crate::agents::{MasterAgent, SessionManager, StreamEvent, TurnRequest};
