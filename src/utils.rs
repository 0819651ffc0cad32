use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use v4l::{capability::Flags, video::Capture, Device};

/// A `/dev/video*` node and what V4L2 reports about it.
#[derive(Debug, Clone, Serialize)]
pub struct VideoDeviceInfo {
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
    pub capture: bool,
    pub formats: Vec<String>,
}

/// `/dev/video*` nodes present on this system, sorted by index.
pub fn list_video_devices() -> Vec<PathBuf> {
    list_video_devices_in(Path::new("/dev")).unwrap_or_default()
}

pub(crate) fn list_video_devices_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut devices: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix("video")?.parse().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    devices.sort_by_key(|(index, _)| *index);
    Ok(devices.into_iter().map(|(_, path)| path).collect())
}

/// Query capabilities and formats of a video node. `None` when it cannot be
/// opened.
pub fn describe_video_device(path: &Path) -> Option<VideoDeviceInfo> {
    let dev = match Device::with_path(path) {
        Ok(dev) => dev,
        Err(e) => {
            debug!("Cannot open {}: {}", path.display(), e);
            return None;
        }
    };
    let caps = dev.query_caps().ok()?;
    let formats = dev
        .enum_formats()
        .map(|formats| formats.iter().map(|f| f.fourcc.to_string()).collect())
        .unwrap_or_default();

    Some(VideoDeviceInfo {
        path: path.to_path_buf(),
        card: caps.card,
        driver: caps.driver,
        capture: caps.capabilities.contains(Flags::VIDEO_CAPTURE),
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn lists_only_video_nodes_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["video10", "video2", "video0", "videox", "null", "media0"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let devices = list_video_devices_in(dir.path()).unwrap();
        let names: Vec<_> = devices
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["video0", "video2", "video10"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_video_devices_in(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn describing_a_regular_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(describe_video_device(file.path()).is_none());
    }
}
