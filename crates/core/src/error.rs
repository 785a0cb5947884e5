use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
