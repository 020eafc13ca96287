use crate::backend::BackendKind;
use crate::camera::FacingMode;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanbenchConfig {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub zoom: ZoomConfig,
    pub quagga: QuaggaConfig,
    pub html5qrcode: Html5QrcodeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Which camera to request ("environment" or "user")
    #[serde(default = "default_facing_mode")]
    pub facing_mode: FacingMode,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Delay between polling detection attempts (one display refresh)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

/// Auto-zoom tunables, kept separate per backend
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZoomConfig {
    #[serde(default = "default_zoom_tuning")]
    pub native: ZoomTuning,
    #[serde(default = "default_zoom_tuning")]
    pub zxing: ZoomTuning,
    #[serde(default = "default_zoom_tuning")]
    pub quagga: ZoomTuning,
    #[serde(default = "default_zoom_tuning")]
    pub quagga2: ZoomTuning,
    #[serde(default = "default_html5qrcode_zoom_tuning")]
    pub html5qrcode: ZoomTuning,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct ZoomTuning {
    /// At most one miss is counted per cooldown window
    pub cooldown_ms: u64,

    /// Zoom is raised on every Nth counted miss
    pub misses_per_step: u32,

    /// Zoom increment per step
    pub step: f64,

    /// Upper bound used when the camera reports zoom without a usable max
    pub fallback_max_zoom: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QuaggaConfig {
    #[serde(default = "default_patch_size")]
    pub patch_size: String,

    #[serde(default = "default_half_sample")]
    pub half_sample: bool,

    /// Inset of the scan area from each edge, in percent
    #[serde(default = "default_area_inset_percent")]
    pub area_inset_percent: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Html5QrcodeConfig {
    #[serde(default = "default_html5_fps")]
    pub fps: u32,

    #[serde(default = "default_qrbox_size")]
    pub qrbox_width: u32,

    #[serde(default = "default_qrbox_size")]
    pub qrbox_height: u32,
}

impl ZoomTuning {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl ZoomConfig {
    pub fn for_backend(&self, backend: BackendKind) -> ZoomTuning {
        match backend {
            BackendKind::Native => self.native,
            BackendKind::Zxing => self.zxing,
            BackendKind::Quagga => self.quagga,
            BackendKind::Quagga2 => self.quagga2,
            BackendKind::Html5Qrcode => self.html5qrcode,
        }
    }

    fn all(&self) -> [(BackendKind, ZoomTuning); 5] {
        BackendKind::ALL.map(|kind| (kind, self.for_backend(kind)))
    }
}

impl SessionConfig {
    /// Never zero; `tokio::time::interval` rejects a zero period
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl ScanbenchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("scanbench.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let mut builder = Config::builder()
            .set_default("camera.facing_mode", default_facing_mode().as_str())?
            .set_default(
                "session.frame_interval_ms",
                default_frame_interval_ms() as i64,
            )?
            .set_default("quagga.patch_size", default_patch_size())?
            .set_default("quagga.half_sample", default_half_sample())?
            .set_default("quagga.area_inset_percent", default_area_inset_percent())?
            .set_default("html5qrcode.fps", default_html5_fps())?
            .set_default("html5qrcode.qrbox_width", default_qrbox_size())?
            .set_default("html5qrcode.qrbox_height", default_qrbox_size())?;

        for kind in BackendKind::ALL {
            let tuning = if kind == BackendKind::Html5Qrcode {
                default_html5qrcode_zoom_tuning()
            } else {
                default_zoom_tuning()
            };
            let prefix = format!("zoom.{}", kind.key());
            builder = builder
                .set_default(format!("{}.cooldown_ms", prefix), tuning.cooldown_ms as i64)?
                .set_default(
                    format!("{}.misses_per_step", prefix),
                    tuning.misses_per_step as i64,
                )?
                .set_default(format!("{}.step", prefix), tuning.step)?
                .set_default(
                    format!("{}.fallback_max_zoom", prefix),
                    tuning.fallback_max_zoom,
                )?;
        }

        let settings = builder
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SCANBENCH_ prefix
            .add_source(Environment::with_prefix("SCANBENCH").separator("__"))
            .build()?;

        let config: ScanbenchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.frame_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Session frame_interval_ms must be greater than 0".to_string(),
            ));
        }

        for (kind, tuning) in self.zoom.all() {
            if tuning.cooldown_ms == 0 {
                return Err(ConfigError::Message(format!(
                    "Zoom cooldown_ms for {} must be greater than 0",
                    kind.key()
                )));
            }
            if tuning.misses_per_step == 0 {
                return Err(ConfigError::Message(format!(
                    "Zoom misses_per_step for {} must be greater than 0",
                    kind.key()
                )));
            }
            if !(tuning.step > 0.0) {
                return Err(ConfigError::Message(format!(
                    "Zoom step for {} must be positive",
                    kind.key()
                )));
            }
            if !(tuning.fallback_max_zoom >= 1.0) {
                return Err(ConfigError::Message(format!(
                    "Zoom fallback_max_zoom for {} must be at least 1.0",
                    kind.key()
                )));
            }
        }

        if self.quagga.area_inset_percent >= 50 {
            return Err(ConfigError::Message(
                "Quagga area_inset_percent must be below 50".to_string(),
            ));
        }

        if self.html5qrcode.fps == 0 {
            return Err(ConfigError::Message(
                "html5qrcode fps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScanbenchConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                facing_mode: default_facing_mode(),
            },
            session: SessionConfig {
                frame_interval_ms: default_frame_interval_ms(),
            },
            zoom: ZoomConfig {
                native: default_zoom_tuning(),
                zxing: default_zoom_tuning(),
                quagga: default_zoom_tuning(),
                quagga2: default_zoom_tuning(),
                html5qrcode: default_html5qrcode_zoom_tuning(),
            },
            quagga: QuaggaConfig {
                patch_size: default_patch_size(),
                half_sample: default_half_sample(),
                area_inset_percent: default_area_inset_percent(),
            },
            html5qrcode: Html5QrcodeConfig {
                fps: default_html5_fps(),
                qrbox_width: default_qrbox_size(),
                qrbox_height: default_qrbox_size(),
            },
        }
    }
}

// Default value functions
fn default_facing_mode() -> FacingMode {
    FacingMode::Environment
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_zoom_tuning() -> ZoomTuning {
    ZoomTuning {
        cooldown_ms: 2000,
        misses_per_step: 3,
        step: 0.5,
        fallback_max_zoom: 3.0,
    }
}
// html5-qrcode polls on its own 3s timer and reports a wider zoom range
fn default_html5qrcode_zoom_tuning() -> ZoomTuning {
    ZoomTuning {
        cooldown_ms: 3000,
        misses_per_step: 2,
        step: 0.5,
        fallback_max_zoom: 5.0,
    }
}

fn default_patch_size() -> String {
    "medium".to_string()
}
fn default_half_sample() -> bool {
    true
}
fn default_area_inset_percent() -> u32 {
    10
}

fn default_html5_fps() -> u32 {
    10
}
fn default_qrbox_size() -> u32 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScanbenchConfig::default();
        assert!(config.validate().is_ok());

        let native = config.zoom.for_backend(BackendKind::Native);
        assert_eq!(native.cooldown(), Duration::from_secs(2));
        assert_eq!(native.misses_per_step, 3);

        let html5 = config.zoom.for_backend(BackendKind::Html5Qrcode);
        assert_eq!(html5.cooldown(), Duration::from_secs(3));
        assert_eq!(html5.misses_per_step, 2);
        assert_eq!(html5.fallback_max_zoom, 5.0);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = ScanbenchConfig::load_from_file(&path).unwrap();
        assert_eq!(config.camera.facing_mode, FacingMode::Environment);
        assert_eq!(config.session.frame_interval_ms, 16);
        assert_eq!(config.zoom.quagga2.misses_per_step, 3);
        assert_eq!(config.html5qrcode.qrbox_width, 250);
    }

    #[test]
    fn test_load_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
facing_mode = "user"

[zoom.zxing]
cooldown_ms = 500
misses_per_step = 2
step = 0.25
fallback_max_zoom = 4.0
"#
        )
        .unwrap();

        let config = ScanbenchConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.facing_mode, FacingMode::User);
        assert_eq!(config.zoom.zxing.cooldown_ms, 500);
        assert_eq!(config.zoom.zxing.step, 0.25);
        // Untouched backends keep their defaults
        assert_eq!(config.zoom.native.cooldown_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScanbenchConfig::default();
        config.zoom.quagga.misses_per_step = 0;
        assert!(config.validate().is_err());

        config.zoom.quagga.misses_per_step = 3;
        config.zoom.html5qrcode.step = 0.0;
        assert!(config.validate().is_err());

        config.zoom.html5qrcode.step = 0.5;
        config.session.frame_interval_ms = 0;
        assert!(config.validate().is_err());

        config.session.frame_interval_ms = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_interval_never_zero() {
        let mut config = ScanbenchConfig::default();
        config.session.frame_interval_ms = 0;
        assert_eq!(config.session.frame_interval(), Duration::from_millis(1));
    }
}
