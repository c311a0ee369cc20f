use std::path::PathBuf;

use serde::Deserialize;

pub const SIM_HZ: f32 = 60.0;
pub const RENDER_HZ: f32 = 30.0;
pub const MAX_CATCH_UP_STEPS: u32 = 5;

pub const WALL_THICKNESS: f32 = 60.0;
pub const INPUT_STRIP: f32 = 48.0;

pub const SPAWN_MARGIN: f32 = 100.0;
pub const SPAWN_SPEED_MAX: f32 = 30.0;

pub const BODY_PADDING: f32 = 10.0;
pub const BODY_FIT_SLACK: f32 = 4.0;
pub const BODY_MIN_WIDTH: f32 = 80.0;
pub const BODY_MIN_HEIGHT: f32 = 40.0;
pub const LINE_HEIGHT: f32 = 1.2;

pub const BODY_FRICTION: f32 = 0.05;
pub const BODY_AIR_FRICTION: f32 = 0.02;
pub const BODY_RESTITUTION: f32 = 0.3;
pub const BODY_MASS: f32 = 1.0;

pub const SHAKE_SPEED_MIN: f32 = 120.0;
pub const SHAKE_SPEED_MAX: f32 = 300.0;

pub const DRAG_STIFFNESS: f32 = 0.2;
pub const DRAG_DAMPING: f32 = 0.1;

pub const RECALL_SPEED: f32 = 400.0;

pub const BROAD_PHASE_CELL: f32 = 128.0;

pub const FONT_FAMILY: &str = "-apple-system, BlinkMacSystemFont, \"Segoe UI\", Roboto, sans-serif";
pub const FONT_SMALL: f32 = 14.0;
pub const FONT_MEDIUM: f32 = 18.0;
pub const FONT_LARGE: f32 = 24.0;
pub const BOLD_SCALE: f32 = 1.2;
pub const WHISPER_SCALE: f32 = 0.8;
pub const WHISPER_ALPHA: f32 = 0.5;

pub const CELL_PX_WIDTH: f32 = 8.0;
pub const CELL_PX_HEIGHT: f32 = 16.0;

/// Runtime overrides read from `config.toml`. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Settings {
    pub sim_hz: Option<f32>,
    pub render_hz: Option<f32>,
    pub export_dir: Option<PathBuf>,
    pub history_limit: Option<usize>,
    pub seed: Option<u64>,
}

impl Settings {
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Self::default();
            }
        };

        Self::parse(&content).unwrap_or_else(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            Self::default()
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("thoughtboard").join("config.toml"))
    }

    pub fn sim_hz(&self) -> f32 {
        positive_or(self.sim_hz, SIM_HZ)
    }

    pub fn render_hz(&self) -> f32 {
        positive_or(self.render_hz, RENDER_HZ)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .or_else(dirs::document_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn positive_or(value: Option<f32>, fallback: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod settings_parse {
        use super::*;

        #[test]
        fn empty_file_yields_defaults() {
            let settings = Settings::parse("").unwrap();
            assert!(settings.sim_hz.is_none());
            assert_eq!(settings.sim_hz(), SIM_HZ);
            assert_eq!(settings.render_hz(), RENDER_HZ);
        }

        #[test]
        fn reads_overrides() {
            let settings = Settings::parse(
                r#"
                sim_hz = 120.0
                render_hz = 24.0
                history_limit = 8
                seed = 7
                export_dir = "/tmp/out"
                "#,
            )
            .unwrap();
            assert_eq!(settings.sim_hz(), 120.0);
            assert_eq!(settings.render_hz(), 24.0);
            assert_eq!(settings.history_limit, Some(8));
            assert_eq!(settings.seed, Some(7));
            assert_eq!(settings.export_dir(), PathBuf::from("/tmp/out"));
        }

        #[test]
        fn rejects_wrong_types() {
            assert!(Settings::parse("sim_hz = \"fast\"").is_err());
        }
    }

    mod rates {
        use super::*;

        #[test]
        fn non_positive_rates_fall_back() {
            let settings = Settings {
                sim_hz: Some(0.0),
                render_hz: Some(f32::NAN),
                ..Settings::default()
            };
            assert_eq!(settings.sim_hz(), SIM_HZ);
            assert_eq!(settings.render_hz(), RENDER_HZ);
        }
    }
}
