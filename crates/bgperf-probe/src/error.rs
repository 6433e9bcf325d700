use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with code {code}{}", stderr_suffix(.stderr))]
    Exit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("'{program}' was terminated by a signal")]
    Signalled { program: String },

    #[error("unexpected {what} output: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BGP session '{protocol}' not established after {seconds}s (last state: {last})")]
    NotEstablished {
        protocol: String,
        seconds: u64,
        last: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {stderr}")
    }
}

impl ProbeError {
    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        ProbeError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
