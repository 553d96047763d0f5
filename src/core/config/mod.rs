pub mod data;
pub mod io;
pub mod orchestrator;
pub mod store;

pub use data::{Channel, ChannelDraft, ChannelEdit, Config};
pub use io::ConfigError;
pub use orchestrator::ConfigOrchestrator;
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
