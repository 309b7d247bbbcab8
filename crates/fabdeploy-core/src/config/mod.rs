//! fabdeploy.toml: what to provision and how to talk to the service.

pub mod parser;
pub mod paths;
pub mod schema;

pub use parser::{parse_config, parse_config_str, parse_settings, parse_settings_str, to_toml};
pub use paths::{CONFIG_FILE_NAME, checkpoint_dir, default_config_path};
pub use schema::{
    ApiSection, AuthSection, CheckpointSection, DEFAULT_BASE_URL, DEFAULT_TOKEN_ENV,
    DeployConfig, FolderEntry, ItemEntry, PipelineSection, PollingSection, PrincipalEntry,
    RetrySection, ServiceSettings, WorkspaceSection,
};
