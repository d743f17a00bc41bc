use crate::error::{CompilerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Optional project settings; command-line flags take precedence.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub root: Option<String>,
    pub entry: Option<String>,
    pub outdir: Option<String>,
    pub write_assets: Option<bool>,
    pub library: Option<bool>,
    /// Platform names for `#ifdef` blocks, replacing the default `H5`
    pub conditions: Option<Vec<String>>,
}

pub fn load(config_path: &str) -> Result<ConfigFile> {
    let content = fs::read_to_string(config_path)
        .map_err(|e| CompilerError::config(config_path, format!("cannot read config: {}", e)))?;
    let config = parse(config_path, &content)?;
    log::info!("Loaded configuration from {}", config_path);
    Ok(config)
}

fn parse(config_path: &str, content: &str) -> Result<ConfigFile> {
    if config_path.ends_with(".json") {
        serde_json::from_str(content)
            .map_err(|e| CompilerError::config(config_path, format!("invalid JSON config: {}", e)))
    } else if config_path.ends_with(".toml") {
        toml::from_str(content)
            .map_err(|e| CompilerError::config(config_path, format!("invalid TOML config: {}", e)))
    } else {
        Err(CompilerError::config(
            config_path,
            "config file must be .json or .toml",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_formats() {
        let json = parse("matrix.json", r#"{ "entry": "app", "writeAssets": false }"#).unwrap();
        assert_eq!(json.entry.as_deref(), Some("app"));
        assert_eq!(json.write_assets, Some(false));

        let toml = parse("matrix.toml", "outdir = \"build\"\nlibrary = true\nconditions = [\"H5\", \"WEB\"]\n").unwrap();
        assert_eq!(toml.outdir.as_deref(), Some("build"));
        assert_eq!(toml.library, Some(true));
        assert_eq!(toml.conditions, Some(vec!["H5".to_string(), "WEB".to_string()]));
        assert_eq!(toml.entry, None);
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let err = parse("matrix.yaml", "entry: app").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
