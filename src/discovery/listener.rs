use crate::container::{ContainerID, ContainerInfo};

/// A container stopped while matched by a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStoppedEvent {
    pub config_name: String,
    pub container_id: ContainerID,
    pub real_base_dir: String,
}

/// The file-collection side, told about every change to a configuration's matched set.
pub trait ContainerInfoListener: Send + Sync {
    fn upsert_container_info(&self, config_name: &str, info: &ContainerInfo);

    fn delete_container_info(&self, config_name: &str, container_id: &ContainerID);

    fn container_stopped(&self, _event: &ContainerStoppedEvent) {}
}

/// Logs every notification.
#[derive(Debug, Default)]
pub struct LogListener;

impl ContainerInfoListener for LogListener {
    fn upsert_container_info(&self, config_name: &str, info: &ContainerInfo) {
        log::debug!(
            "config `{}`: container {} at `{}`",
            config_name,
            info.id(),
            info.real_base_dir
        );
    }

    fn delete_container_info(&self, config_name: &str, container_id: &ContainerID) {
        log::debug!("config `{}`: container {} removed", config_name, container_id);
    }

    fn container_stopped(&self, event: &ContainerStoppedEvent) {
        log::info!(
            "config `{}`: container {} stopped, finishing `{}`",
            event.config_name,
            event.container_id,
            event.real_base_dir
        );
    }
}
