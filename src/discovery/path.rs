use std::path::Path;

use crate::container::RawContainerInfo;

/// Strips `prefix` from `path` when it covers whole path components.
fn strip_dir_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// The host directory holding what a configuration reads from a container.
///
/// Stdio configurations read the runtime log directory. File configurations translate
/// `base_path` through the mount with the longest matching destination, falling back to
/// the container's upper dir. `host_root` is prepended when the agent itself runs in a
/// container with the host filesystem mounted.
pub fn real_base_dir(
    info: &RawContainerInfo,
    base_path: &str,
    is_stdio: bool,
    host_root: &str,
) -> String {
    let dir = if is_stdio {
        Path::new(&info.log_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        info.mounts
            .iter()
            .filter_map(|mount| {
                strip_dir_prefix(base_path, &mount.destination).map(|rest| (mount, rest))
            })
            .max_by_key(|(mount, _)| mount.destination.trim_end_matches('/').len())
            .map(|(mount, rest)| format!("{}{}", mount.source.trim_end_matches('/'), rest))
            .unwrap_or_else(|| format!("{}{}", info.upper_dir.trim_end_matches('/'), base_path))
    };

    if host_root.is_empty() || dir.is_empty() {
        dir
    } else {
        format!("{}{}", host_root.trim_end_matches('/'), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerID, Mount};

    fn info() -> RawContainerInfo {
        let mut info = RawContainerInfo::new(ContainerID::new("abc").unwrap());
        info.log_path = "/var/lib/docker/containers/abc/abc-json.log".to_owned();
        info.upper_dir = "/var/lib/docker/overlay2/abc/diff".to_owned();
        info.mounts = vec![
            Mount::new("/data/volumes/home", "/home"),
            Mount::new("/data/volumes/logs", "/home/admin/logs"),
            Mount::new("/data/other", "/home/adm"),
        ];
        info
    }

    #[test]
    fn test_stdio_uses_log_dir() {
        assert_eq!(
            real_base_dir(&info(), "/ignored", true, ""),
            "/var/lib/docker/containers/abc"
        );
    }

    #[test]
    fn test_longest_mount_wins() {
        assert_eq!(
            real_base_dir(&info(), "/home/admin/logs/app", false, ""),
            "/data/volumes/logs/app"
        );
        assert_eq!(
            real_base_dir(&info(), "/home/admin", false, ""),
            "/data/volumes/home/admin"
        );
        assert_eq!(
            real_base_dir(&info(), "/home/admin/logs", false, ""),
            "/data/volumes/logs"
        );
    }

    #[test]
    fn test_falls_back_to_upper_dir() {
        assert_eq!(
            real_base_dir(&info(), "/opt/app", false, "/host_all"),
            "/host_all/var/lib/docker/overlay2/abc/diff/opt/app"
        );
    }

    #[test]
    fn test_root_mount() {
        let mut info = info();
        info.mounts = vec![Mount::new("/srv/root", "/")];
        assert_eq!(real_base_dir(&info, "/etc/app", false, ""), "/srv/root/etc/app");
    }
}
