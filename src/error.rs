/// Errors that end [`run`](crate::run).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to set up inventory transport: {0}")]
    Transport(#[from] crate::transport::Error),
    #[error("discovery stopped: {0}")]
    Discovery(#[from] crate::discovery::Error),
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
    #[error("{task} task failed: {source}")]
    Join {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }
}
