use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "No stack template found. Looked for:\n\
        - current directory: stack.local.yaml, stack.yaml, stack.yml, stack.json\n\
        - the same names inside ./.stackflow/\n\
        A template can also be passed explicitly or through STACK_TEMPLATE_PATH"
    )]
    TemplateNotFound,

    #[error("Template does not exist: {0}")]
    MissingTemplate(PathBuf),

    #[error("Settings file does not exist: {0}")]
    MissingSettings(PathBuf),

    #[error("Invalid settings in {path}: {message}")]
    InvalidSettings { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
