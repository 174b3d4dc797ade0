use serde::Deserialize;
use std::path::Path;
use std::{fs, io};

// --- Error Type ---
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    ParseJson(serde_json::Error),
    ParseToml(toml::de::Error),
    Validation(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self { ConfigError::Io(err) }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self { ConfigError::ParseJson(err) }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self { ConfigError::ParseToml(err) }
}

// --- Enums for Choices ---
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// Tagged fields: `x:<float> y:<float>[ j:<0|1>]`
    Tagged,
    /// Raw joystick readout: `<0..1023>,<0..1023>,<0|1>`
    AnalogCsv,
}

impl Default for FrameFormat {
    fn default() -> Self {
        FrameFormat::Tagged
    }
}

// --- Configuration Sections ---

#[derive(Deserialize, Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub format: FrameFormat,
}

fn default_baud_rate() -> u32 { 115_200 }
fn default_read_timeout_ms() -> u64 { 10 }

#[derive(Deserialize, Debug, Clone)]
pub struct MotionSettings {
    /// Resting height of the ground plane. Absent means "derive from the
    /// body's starting position on the first tick".
    #[serde(default)]
    pub ground_height: Option<f32>,
    #[serde(default = "default_jump_velocity")]
    pub jump_velocity: f32,
    #[serde(default = "default_ground_restitution")]
    pub ground_restitution: f32,
    #[serde(default = "default_ground_epsilon")]
    pub ground_epsilon: f32,
    #[serde(default = "default_axis_scale")]
    pub axis_scale: f32,
    #[serde(default = "default_gravity")]
    pub gravity: f32,
}

// Default values for motion settings
fn default_jump_velocity() -> f32 { 6.0 }
fn default_ground_restitution() -> f32 { 0.8 }
fn default_ground_epsilon() -> f32 { 0.05 }
fn default_axis_scale() -> f32 { 1.0 }
fn default_gravity() -> f32 { 9.81 }

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            ground_height: None,
            jump_velocity: default_jump_velocity(),
            ground_restitution: default_ground_restitution(),
            ground_epsilon: default_ground_epsilon(),
            axis_scale: default_axis_scale(),
            gravity: default_gravity(),
        }
    }
}

// --- Top-Level Config Struct ---

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Fixed simulation rate in Hz.
    pub framerate: u32,
    pub serial: SerialSettings,
    #[serde(default)]
    pub motion: MotionSettings,
}

// --- Loading Function ---

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;

    let config: Config = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };

    // Basic Validation
    if config.framerate == 0 {
        return Err(ConfigError::Validation("Framerate cannot be zero.".to_string()));
    }

    if config.serial.port_name.is_empty() {
        return Err(ConfigError::Validation("Serial port name cannot be empty.".to_string()));
    }

    if config.serial.baud_rate == 0 {
        return Err(ConfigError::Validation("Baud rate cannot be zero.".to_string()));
    }

    if config.serial.read_timeout_ms == 0 {
        return Err(ConfigError::Validation("Read timeout must be positive.".to_string()));
    }

    if !(0.0..=1.0).contains(&config.motion.ground_restitution) {
        return Err(ConfigError::Validation("Ground restitution must be within [0, 1].".to_string()));
    }

    if config.motion.ground_epsilon <= 0.0 {
        return Err(ConfigError::Validation("Ground epsilon must be positive.".to_string()));
    }

    if config.motion.jump_velocity <= 0.0 {
        return Err(ConfigError::Validation("Jump velocity must be positive.".to_string()));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_valid_config_json() {
        let content = r#"{
          "framerate": 50,
          "serial": {
            "port_name": "/dev/ttyACM0",
            "baud_rate": 115200,
            "read_timeout_ms": 10,
            "format": "tagged"
          },
          "motion": {
            "ground_height": 0.5,
            "jump_velocity": 6.0,
            "ground_restitution": 0.8,
            "ground_epsilon": 0.05
          }
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.framerate, 50);
        assert_eq!(config.serial.port_name, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.format, FrameFormat::Tagged);
        assert_eq!(config.motion.ground_height, Some(0.5));
        assert_eq!(config.motion.jump_velocity, 6.0);
        assert_eq!(config.motion.ground_restitution, 0.8);
        // Unspecified fields fall back to defaults
        assert_eq!(config.motion.axis_scale, 1.0);
        assert_eq!(config.motion.gravity, 9.81);
    }

    #[test]
    fn load_minimal_config_applies_defaults() {
        let content = r#"{
          "framerate": 50,
          "serial": { "port_name": "COM5" }
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.read_timeout_ms, 10);
        assert_eq!(config.serial.format, FrameFormat::Tagged);
        assert_eq!(config.motion.ground_height, None);
        assert_eq!(config.motion.jump_velocity, 6.0);
        assert_eq!(config.motion.ground_restitution, 0.8);
        assert_eq!(config.motion.ground_epsilon, 0.05);
    }

    #[test]
    fn load_valid_config_toml() {
        let content = r#"
          framerate = 50

          [serial]
          port_name = "/dev/ttyUSB0"
          format = "analogcsv"

          [motion]
          jump_velocity = 7.5
        "#;
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.serial.port_name, "/dev/ttyUSB0");
        assert_eq!(config.serial.format, FrameFormat::AnalogCsv);
        assert_eq!(config.motion.jump_velocity, 7.5);
    }

    #[test]
    fn load_invalid_framerate() {
        let content = r#"{
          "framerate": 0,
          "serial": { "port_name": "COM5" }
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_restitution_out_of_range() {
        let content = r#"{
          "framerate": 50,
          "serial": { "port_name": "COM5" },
          "motion": { "ground_restitution": 1.5 }
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_nonpositive_epsilon() {
        let content = r#"{
          "framerate": 50,
          "serial": { "port_name": "COM5" },
          "motion": { "ground_epsilon": 0.0 }
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_malformed_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }
}
