//! Per-configuration container matching and its propagation downstream.

mod config;
mod error;
mod listener;
mod manager;
mod options;
mod path;

pub use config::{MonitoredConfig, PipelineContext};
pub use error::{Error, Result};
pub use listener::{ContainerInfoListener, ContainerStoppedEvent, LogListener};
pub use manager::{ContainerManager, ConfigSummary, PointerScope};
pub use options::{ContainerDiscoveryOptions, InputKind};
pub use path::real_base_dir;
