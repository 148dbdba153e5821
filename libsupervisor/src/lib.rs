pub mod child;
pub mod config;
pub mod error;
pub mod group;
pub mod registry;
pub mod sink;

// re-export selected public API
pub use child::ChildController;
pub use config::{Config, GroupSpec, OverflowPolicy, ProcessSpec, RestartPolicy, SinkSpec};
pub use error::{ConfigError, ControlError};
pub use group::ProcessGroup;
pub use registry::Registry;
