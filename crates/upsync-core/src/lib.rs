pub mod checksum;
pub mod compare;
pub mod config;
pub mod enumeration;
pub mod errors;
pub mod remote;
pub mod stats;
pub mod sync;

pub use checksum::DEFAULT_CHUNK_SIZE;
pub use compare::Classification;
pub use config::UploaderConfig;
pub use enumeration::CandidateSource;
pub use stats::RunStatistics;
pub use sync::{SyncDriver, SyncOptions};
