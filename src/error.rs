use thiserror::Error;

#[derive(Debug, Error)]
pub enum HornetError {
    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown value: {0}")]
    UnknownValue(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("unknown decoder: {0}")]
    UnknownDecoder(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HornetError>;
