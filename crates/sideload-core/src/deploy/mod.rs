//! Deployment runs: dispatch, events, cleanup.

pub mod cleanup;
pub mod dispatcher;
pub mod events;

pub use cleanup::{CleanupManager, remove_path_if_exists};
pub use dispatcher::{Deployer, RunHandle};
pub use events::{
    DeployEvent, DeployObserver, EventForwarder, EventLog, LogLevel, LogRecord, PackageEvent,
    channel_observer,
};
