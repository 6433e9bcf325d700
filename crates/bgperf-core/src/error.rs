use thiserror::Error;

#[derive(Debug, Error)]
pub enum BgperfError {
    #[error("unrecognized action type '{kind}' at script entry {index}")]
    UnknownAction { index: usize, kind: String },

    #[error("invalid '{kind}' action at script entry {index}: {reason}")]
    InvalidAction {
        index: usize,
        kind: String,
        reason: String,
    },

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid cpuset '{0}'")]
    InvalidCpuset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, BgperfError>;
