use rdt_lab_abstract::{ConfigError, Direction};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RdtError>;

#[derive(Debug, Error)]
pub enum RdtError {
    /// The retransmission timer fired before a reply arrived.
    #[error("timed out waiting for a reply")]
    TimedOut,

    #[error("{0} channel closed")]
    ChannelClosed(Direction),

    /// The application has no more lines to send.
    #[error("application input exhausted")]
    InputClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
