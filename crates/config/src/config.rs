//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Environment variable the daily encoder reads its configuration path from
pub const CONFIG_ENV_VAR: &str = "DAILIES_CONFIG";

/// Image extensions accepted when `globals.input_image_formats` is absent
pub const DEFAULT_INPUT_IMAGE_FORMATS: &[&str] = &["exr", "tif", "tiff", "png", "jpg", "jpeg"];

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Config file does not exist
    Missing(PathBuf),
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// TOML serialization error
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(path) => {
                write!(f, "Could not find config file: {}", path.display())
            }
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Serialize(e) => write!(f, "Failed to serialize config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e)
    }
}

/// The `[globals]` fields read by this tool
///
/// Other keys in `[globals]` belong to the encoder and are carried through
/// untouched by the raw document kept in [`Config`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Globals {
    /// Default output folder for generated movies
    #[serde(default)]
    pub movie_location: String,
    /// Default preset key into `output_codecs`
    #[serde(default)]
    pub output_codec: String,
    /// Accepted frame extensions, in scan order
    #[serde(default = "default_input_image_formats")]
    pub input_image_formats: Vec<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Scale output to fit the input height
    #[serde(default)]
    pub fit: bool,
}

fn default_input_image_formats() -> Vec<String> {
    DEFAULT_INPUT_IMAGE_FORMATS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for Globals {
    fn default() -> Self {
        Self {
            movie_location: String::new(),
            output_codec: String::new(),
            input_image_formats: default_input_image_formats(),
            width: None,
            height: None,
            fit: false,
        }
    }
}

/// Main configuration structure
///
/// Holds the typed `globals` view next to the full parsed document, so that
/// sections this tool knows nothing about survive an overlay copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub globals: Globals,
    document: Table,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            globals: Globals::default(),
            document: Table::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// A missing file is reported as [`ConfigError::Missing`] so callers can
    /// abort before anything else starts.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let document: Table = toml::from_str(content)?;
        Self::from_document(document)
    }

    fn from_document(document: Table) -> Result<Self, ConfigError> {
        let globals = match document.get("globals") {
            Some(value) => value.clone().try_into()?,
            None => Globals::default(),
        };
        Ok(Self { globals, document })
    }

    /// The full parsed document, including sections this tool does not read
    pub fn document(&self) -> &Table {
        &self.document
    }

    /// Preset names under `output_codecs`, in file order
    pub fn codec_names(&self) -> Vec<&str> {
        self.document
            .get("output_codecs")
            .and_then(Value::as_table)
            .map(|codecs| codecs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `name` is a preset under `output_codecs`
    pub fn has_codec(&self, name: &str) -> bool {
        self.codec_names().contains(&name)
    }

    /// Build a copy with `globals.width`, `globals.height` and `globals.fit`
    /// replaced
    ///
    /// `self` is left untouched; every other key, known or not, is carried
    /// over as-is.
    pub fn with_output_overrides(&self, width: u32, height: u32, fit: bool) -> Self {
        let mut document = self.document.clone();
        let globals = document
            .entry("globals")
            .or_insert_with(|| Value::Table(Table::new()));
        if let Some(table) = globals.as_table_mut() {
            table.insert("width".to_string(), Value::Integer(width.into()));
            table.insert("height".to_string(), Value::Integer(height.into()));
            table.insert("fit".to_string(), Value::Boolean(fit));
        }

        let mut globals = self.globals.clone();
        globals.width = Some(width);
        globals.height = Some(height);
        globals.fit = fit;

        Self { globals, document }
    }

    /// Serialize the full document back to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(&self.document)?)
    }
}
