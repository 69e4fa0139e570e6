use thiserror::Error;

/// Errors raised by the I/O back-ends (HTTP services, radio commands,
/// positioning stream, output sink). Components never propagate these
/// to their callers: they are logged and turned into absent values.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport or status error
    #[error("http error: {0}")]
    Http(String),

    /// Operation exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// External command exited with a failure status
    #[error("command \"{0}\" failed: {1}")]
    Command(String, String),

    /// Streaming peer closed the connection
    #[error("end of stream")]
    EndOfStream,

    /// Remote answered, but with nothing usable
    #[error("empty response")]
    EmptyResponse,

    /// Payload was received but could not be interpreted
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => Self::Http(format!("status {}", code)),
            ureq::Error::Transport(t) => Self::Http(t.to_string()),
        }
    }
}
