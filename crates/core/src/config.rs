//! Configuration file loading.
//!
//! Format is picked from the file extension: `.toml`, `.yaml`/`.yml` or `.json`.

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// Supported configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    /// Detect the format from a path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unknown or missing extensions.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

/// Parse configuration text in the given format.
///
/// # Errors
///
/// Returns the parse error for the chosen format.
pub fn parse<T: DeserializeOwned>(text: &str, format: Format) -> Result<T> {
    match format {
        Format::Toml => toml::from_str(text).map_err(|e| Error::toml_parse_failed(e.to_string())),
        Format::Yaml => {
            serde_yaml::from_str(text).map_err(|e| Error::yaml_parse_failed(e.to_string()))
        }
        Format::Json => {
            serde_json::from_str(text).map_err(|e| Error::json_parse_failed(e.to_string()))
        }
    }
}

/// Load and parse a configuration file.
///
/// # Errors
///
/// Returns [`Error::FileReadFailed`] when the file cannot be read, or the
/// parse error for its format.
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    debug!(path = %path.display(), ?format, "Loading configuration");
    parse(&text, format)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        retries: u32,
    }

    #[test]
    fn should_detect_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(Format::from_path(Path::new("a.YML")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a.json")).unwrap(), Format::Json);
        assert!(Format::from_path(Path::new("a.ini")).is_err());
        assert!(Format::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn should_parse_each_format() {
        let expected = Sample {
            name: "detect".to_string(),
            retries: 2,
        };
        let toml: Sample = parse("name = \"detect\"\nretries = 2\n", Format::Toml).unwrap();
        let yaml: Sample = parse("name: detect\nretries: 2\n", Format::Yaml).unwrap();
        let json: Sample = parse(r#"{"name":"detect","retries":2}"#, Format::Json).unwrap();
        assert_eq!(toml, expected);
        assert_eq!(yaml, expected);
        assert_eq!(json, expected);
    }

    #[test]
    fn should_load_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "name = \"disk\"\nretries = 5").unwrap();
        let loaded: Sample = load(file.path()).unwrap();
        assert_eq!(loaded.retries, 5);
    }

    #[test]
    fn should_report_missing_file() {
        let err = load::<Sample>("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }
}
