// Service modules (daemon functionality)
pub mod capture;
pub mod database;
pub mod folder;
pub mod http_server;
pub mod process;
pub mod service_config;
pub mod service_state;
pub mod upload;

// App state (configuration, paths)
pub mod state;

// Re-exports for consumers
pub use capture::{CaptureError, CaptureService, DuplicatePolicy, PathValidationError};
pub use database::Database;
pub use folder::{Folder, IngestError, IngestOutcome, SnapshotSummary};
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use service_config::{Config as ServiceConfig, FolderConfig};
pub use service_state::State as ServiceState;
pub use state::{AppConfig, AppState, StateError};
