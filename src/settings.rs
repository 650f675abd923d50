use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use stimline_extract::{AnnotationHandling, BatchConfig, ServiceCredentials};

use crate::export::ExportFormat;

const PROJECT_CONFIG_NAME: &str = "stimline.toml";
const DEFAULT_MISSING_MARKER: &str = "n/a";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    batch_size: Option<usize>,
    num_retries: Option<u32>,
    annotation_handling: Option<String>,
    annotation_label: Option<String>,
    credentials: Option<String>,
    channel_capacity: Option<usize>,
    export: Option<ExportFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct ExportFileConfig {
    format: Option<String>,
    path: Option<String>,
    pretty: Option<bool>,
    missing_marker: Option<String>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub batch: BatchConfig,
    /// Credential material for bulk services, threaded into transformer
    /// constructors by the caller. Absence surfaces there as a typed
    /// configuration error, never as an implicit lookup at call time.
    pub credentials: Option<ServiceCredentials>,
    pub channel_capacity: Option<usize>,
    pub export: ExportSettings,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub format: ExportFormat,
    pub path: Option<PathBuf>,
    pub pretty: bool,
    pub missing_marker: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Tsv,
            path: None,
            pretty: true,
            missing_marker: DEFAULT_MISSING_MARKER.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

/// Resolve driver settings from a TOML file.
///
/// With an explicit path the file must exist; otherwise `stimline.toml` in
/// the working directory is used when present, and built-in defaults apply
/// when it is not.
pub fn resolve_settings(path_override: Option<&Path>) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(path_override)?;
    merge(file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    if let Some(project_path) = project_config_path() {
        if project_path.exists() {
            let config = read_config(&project_path)?;
            return Ok((config, Some(project_path)));
        }
    }

    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(PROJECT_CONFIG_NAME))
}

fn merge(
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let FileConfig {
        batch_size: file_batch_size,
        num_retries: file_num_retries,
        annotation_handling: file_handling,
        annotation_label: file_label,
        credentials: file_credentials,
        channel_capacity: file_channel_capacity,
        export: file_export,
    } = file;

    let mut batch = BatchConfig::default();

    if let Some(value) = file_batch_size {
        if value < 1 {
            return Err(ConfigError::InvalidValue {
                path: config_path,
                field: "batch_size",
                value: value.to_string(),
            });
        }
        batch.batch_size = value;
    }

    if let Some(value) = file_num_retries {
        batch.num_retries = value;
    }

    if let Some(value) = normalize_string(file_handling) {
        batch.handling = AnnotationHandling::from_str(&value).map_err(|_| {
            ConfigError::InvalidValue {
                path: config_path.clone(),
                field: "annotation_handling",
                value,
            }
        })?;
    }

    if let Some(value) = normalize_string(file_label) {
        batch.annotation_label = value;
    }

    let credentials = normalize_string(file_credentials).map(ServiceCredentials::new);

    let channel_capacity = match file_channel_capacity {
        Some(0) => {
            return Err(ConfigError::InvalidValue {
                path: config_path,
                field: "channel_capacity",
                value: "0".to_string(),
            });
        }
        other => other,
    };

    let mut export = ExportSettings::default();
    if let Some(section) = file_export {
        if let Some(value) = normalize_string(section.format) {
            export.format = ExportFormat::from_str(&value).map_err(|_| {
                ConfigError::InvalidValue {
                    path: config_path.clone(),
                    field: "export.format",
                    value,
                }
            })?;
        }
        if let Some(path) = normalize_string(section.path) {
            export.path = Some(resolve_path_from_config(
                path,
                config_path.as_deref().and_then(Path::parent),
            ));
        }
        if let Some(pretty) = section.pretty {
            export.pretty = pretty;
        }
        if let Some(marker) = section.missing_marker {
            export.missing_marker = marker;
        }
    }

    Ok(EffectiveSettings {
        batch,
        credentials,
        channel_capacity,
        export,
    })
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(value);
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stimline_extract::{DEFAULT_BATCH_SIZE, DEFAULT_NUM_RETRIES};

    fn parse(contents: &str) -> Result<EffectiveSettings, ConfigError> {
        let file: FileConfig = toml::from_str(contents).unwrap();
        merge(file, Some(PathBuf::from("stimline.toml")))
    }

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let settings = parse("").unwrap();
        assert_eq!(settings.batch.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(settings.batch.num_retries, DEFAULT_NUM_RETRIES);
        assert!(settings.credentials.is_none());
        assert_eq!(settings.export.format, ExportFormat::Tsv);
        assert_eq!(settings.export.missing_marker, "n/a");
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = parse(
            r#"
            batch_size = 5
            num_retries = 1
            annotation_handling = "first"
            credentials = "svc-token"

            [export]
            format = "json"
            pretty = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.batch.batch_size, 5);
        assert_eq!(settings.batch.num_retries, 1);
        assert_eq!(settings.batch.handling, AnnotationHandling::First);
        assert_eq!(settings.credentials.unwrap().token(), "svc-token");
        assert_eq!(settings.export.format, ExportFormat::Json);
        assert!(!settings.export.pretty);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = parse("batch_size = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "batch_size",
                ..
            }
        ));
    }

    #[test]
    fn unknown_handling_is_rejected() {
        let err = parse(r#"annotation_handling = "verbatim""#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "annotation_handling",
                ..
            }
        ));
    }

    #[test]
    fn relative_export_paths_resolve_against_the_config_dir() {
        let file: FileConfig = toml::from_str(
            r#"
            [export]
            path = "out/features.tsv"
            "#,
        )
        .unwrap();
        let settings = merge(file, Some(PathBuf::from("/etc/stimline/stimline.toml"))).unwrap();
        assert_eq!(
            settings.export.path,
            Some(PathBuf::from("/etc/stimline/out/features.tsv"))
        );
    }

    #[test]
    fn missing_override_path_is_an_error() {
        let err = resolve_settings(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
