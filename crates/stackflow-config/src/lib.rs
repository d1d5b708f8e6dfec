pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{
    RetrySettings, SETTINGS_ENV, Settings, StabilizeSettings, load_settings,
};

use std::path::{Path, PathBuf};

/// Environment variable naming the stack template
pub const TEMPLATE_ENV: &str = "STACK_TEMPLATE_PATH";

const TEMPLATE_CANDIDATES: [&str; 4] = ["stack.local.yaml", "stack.yaml", "stack.yml", "stack.json"];

/// StackFlow's configuration directory (`~/.config/stackflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the stack template
///
/// Search order:
/// 1. `explicit` (must exist)
/// 2. environment variable `STACK_TEMPLATE_PATH`
/// 3. current directory: stack.local.yaml, stack.yaml, stack.yml, stack.json
/// 4. `./.stackflow/`: same order
pub fn find_template_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::MissingTemplate(path.to_path_buf()));
    }

    if let Ok(template_path) = std::env::var(TEMPLATE_ENV) {
        let path = PathBuf::from(template_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", TEMPLATE_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &TEMPLATE_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let stack_dir = current_dir.join(".stackflow");
    if stack_dir.is_dir() {
        for filename in &TEMPLATE_CANDIDATES {
            let path = stack_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(ConfigError::TemplateNotFound)
}
