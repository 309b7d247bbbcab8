//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use super::schema::{DeployConfig, ServiceSettings};

/// Parse fabdeploy.toml with detailed error messages
pub fn parse_config(path: &Path) -> Result<DeployConfig> {
    let content = read(path)?;
    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse fabdeploy.toml content from string
pub fn parse_config_str(content: &str) -> Result<DeployConfig> {
    let config: DeployConfig = from_toml(content)?;
    config.validate()?;
    Ok(config)
}

/// Parse only the service client sections of a config file.
pub fn parse_settings(path: &Path) -> Result<ServiceSettings> {
    let content = read(path)?;
    parse_settings_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_settings_str(content: &str) -> Result<ServiceSettings> {
    let settings: ServiceSettings = from_toml(content)?;
    settings.validate()?;
    Ok(settings)
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &DeployConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))
}

fn from_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| enhance_toml_error(e, content))
}

/// Enhance TOML parsing errors with the offending lines
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.to_string();

    let line_hint = error
        .span()
        .map(|span| {
            let offset = span.start.min(content.len());
            content.as_bytes()[..offset].iter().filter(|b| **b == b'\n').count() + 1
        })
        .or_else(|| {
            error_msg
                .lines()
                .find(|line| line.contains("line "))
                .and_then(|line| line.split("line ").nth(1))
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<usize>().ok())
        });

    match line_hint {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            get_line_context(content, line_num),
            error_msg
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", error_msg),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2).min(lines.len());
    let end = (line_num + 2).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::git::GitProvider;
    use crate::types::{ItemKind, PrincipalRole, Stage};

    const FULL: &str = r#"
[workspace]
name = "Sales Analytics"
description = "Sales team workspace"
capacity = "F64"
domain = "Finance"

[[folders]]
name = "Bronze"

[[items]]
kind = "lakehouse"
name = "raw"
folder = "Bronze"

[[items]]
kind = "notebook"
name = "clean"

[[principals]]
id = "user@contoso.com"
role = "Admin"

[git]
provider = "azure-devops"
owner = "contoso"
project = "analytics"
repository = "fabric"

[pipeline]
name = "Sales Pipeline"
stage = "Development"

[retry]
max_retries = 5
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config_str(FULL).unwrap();
        assert_eq!(config.workspace.name, "Sales Analytics");
        assert_eq!(config.workspace.capacity.as_deref(), Some("F64"));
        assert_eq!(config.items.len(), 2);
        assert_eq!(config.items[0].kind, ItemKind::Lakehouse);
        assert_eq!(config.principals[0].role, PrincipalRole::Admin);
        let git = config.git.as_ref().unwrap();
        assert_eq!(git.provider, GitProvider::AzureDevops);
        assert_eq!(git.branch, "main");
        assert_eq!(config.pipeline.as_ref().unwrap().stage, Stage::Development);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.auth.token_env, "FABRIC_TOKEN");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config_str("[workspace]\nname = \"W\"\n").unwrap();
        assert!(config.folders.is_empty());
        assert_eq!(config.polling.max_attempts, 60);
        assert_eq!(config.api.base_url, "https://api.fabric.microsoft.com/v1/");
    }

    #[test]
    fn test_item_with_undeclared_folder_is_rejected() {
        let toml = r#"
[workspace]
name = "W"

[[items]]
kind = "lakehouse"
name = "raw"
folder = "Silver"
"#;
        let err = parse_config_str(toml).unwrap_err();
        assert!(err.to_string().contains("undeclared folder 'Silver'"));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let toml = r#"
[workspace]
name = "W"

[[principals]]
id = "a@b.c"
role = "Owner"
"#;
        assert!(parse_config_str(toml).is_err());
    }

    #[test]
    fn test_empty_workspace_name_is_rejected() {
        let err = parse_config_str("[workspace]\nname = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("workspace.name"));
    }

    #[test]
    fn test_parse_error_shows_line_context() {
        let toml = "[workspace]\nname = \"W\"\n[[folders]\nname = \"x\"\n";
        let err = parse_config_str(toml).unwrap_err().to_string();
        assert!(err.contains("TOML parsing error"));
        assert!(err.contains(">>>"));
    }

    #[test]
    fn test_settings_ignore_provisioning_sections() {
        let settings = parse_settings_str("[polling]\nmax_attempts = 5\n").unwrap();
        assert_eq!(settings.polling.max_attempts, 5);
        let settings = parse_settings_str(FULL).unwrap();
        assert_eq!(settings.retry.max_retries, 5);
    }

    #[test]
    fn test_retry_jitter_flows_into_policy() {
        let settings = parse_settings_str("").unwrap();
        assert!((settings.retry.policy().jitter - 0.25).abs() < f64::EPSILON);
        let settings = parse_settings_str("[retry]\njitter_percent = 0\n").unwrap();
        assert_eq!(settings.retry.policy().jitter, 0.0);
    }

    #[test]
    fn test_jitter_over_one_hundred_percent_is_rejected() {
        let err = parse_settings_str("[retry]\njitter_percent = 150\n").unwrap_err();
        assert!(format!("{err:#}").contains("jitter_percent"));
    }

    #[test]
    fn test_parse_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[workspace]\nname = \"W\"\n").unwrap();
        let config = parse_config(file.path()).unwrap();
        assert_eq!(config.workspace.name, "W");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = parse_config_str(FULL).unwrap();
        let rendered = to_toml(&config).unwrap();
        assert_eq!(parse_config_str(&rendered).unwrap(), config);
    }
}
