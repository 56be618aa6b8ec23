// Download pipeline - orchestration of the external media tools

pub mod compat;
pub mod models;
pub mod orchestrator;
pub mod status;
pub mod tools;
pub mod updater;

pub use models::{DownloadJob, DownloadOutcome, JobStage};
pub use orchestrator::Orchestrator;
pub use status::{StatusEvent, StatusSender, StatusUpdate};
pub use tools::{CodecProbe, CommandGateway, MediaToolGateway};
pub use updater::ToolUpdater;
