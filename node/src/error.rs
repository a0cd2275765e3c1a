use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] meridian_store::StoreError),

    #[error("message error: {0}")]
    Message(#[from] meridian_messages::MessageError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue closed: {0}")]
    QueueClosed(&'static str),

    #[error("dispatch loop fault: {0}")]
    DispatchFault(String),

    #[error("RPC server error: {0}")]
    Rpc(String),

    #[error("node already started")]
    AlreadyStarted,
}
