use thiserror::Error;

use crate::MessageType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message is already signed")]
    AlreadySigned,

    #[error("{0} messages have a dedicated structure and cannot be sent as opaque payloads")]
    ReservedType(MessageType),

    #[error("minute {0} is out of range")]
    MinuteOutOfRange(u8),
}
