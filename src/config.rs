//! Layered configuration: built-in defaults, an optional TOML file, then
//! `PI_KINECT_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable prefix, e.g. `PI_KINECT_NETWORK__PORT=8081`.
pub const ENV_PREFIX: &str = "PI_KINECT";

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub camera: CameraConfig,
    pub kinect: KinectConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Preferred `/dev/videoN` index for the generic camera backend.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinectConfig {
    /// Try the libfreenect backends (native and system library).
    pub enabled: bool,
    /// Fall back to a generic V4L2 camera when no Kinect is found.
    pub fallback_to_generic: bool,
    pub color_enabled: bool,
    pub depth_enabled: bool,
    /// Depth samples at or above this value carry no return.
    pub depth_ceiling: u16,
    /// Searched before the well-known library locations.
    pub library_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
            jpeg_quality: 85,
        }
    }
}

impl Default for KinectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_to_generic: true,
            color_enabled: true,
            depth_enabled: true,
            depth_ceiling: crate::tonemap::DEFAULT_DEPTH_CEILING,
            library_paths: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera resolution must be non-zero, got {}x{}",
                camera.width, camera.height
            )));
        }
        if camera.fps == 0 {
            return Err(ConfigError::Invalid("camera.fps must be at least 1".into()));
        }
        if !(1..=100).contains(&camera.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "camera.jpeg_quality must be within 1..=100, got {}",
                camera.jpeg_quality
            )));
        }
        if self.kinect.depth_ceiling < 2 {
            return Err(ConfigError::Invalid(format!(
                "kinect.depth_ceiling must be at least 2, got {}",
                self.kinect.depth_ceiling
            )));
        }
        Ok(())
    }

    /// Sleep between capture cycles at the configured frame rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.camera.fps.max(1)))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_original_deployment() {
        let config = Config::default();
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.jpeg_quality, 85);
        assert_eq!(config.kinect.depth_ceiling, 2048);
        assert!(config.kinect.depth_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn frame_period_follows_fps() {
        let mut config = Config::default();
        config.camera.fps = 20;
        assert_eq!(config.frame_period(), Duration::from_millis(50));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[network]\nport = 9090\n\n[camera]\nwidth = 320\nheight = 240\n\n[kinect]\ndepth_enabled = false"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.network.port, 9090);
        assert_eq!(config.network.host, "0.0.0.0");
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 240);
        assert_eq!(config.camera.fps, 30);
        assert!(!config.kinect.depth_enabled);
        assert!(config.kinect.color_enabled);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::MissingFile(_))
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.camera.fps = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.kinect.depth_ceiling = 1;
        assert!(config.validate().is_err());
    }
}
