use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockstepError {
    #[error("segment address is not a legal name: {0}")]
    InvalidAddress(String),

    #[error("segment address of {0} bytes exceeds the {1} byte limit")]
    AddressTooLong(usize, usize),

    #[error("insufficient shared memory for a segment of {0} bytes")]
    InsufficientMemory(usize),

    #[error("segment is smaller than the requested layout")]
    SizeMismatch,

    #[error("a sink is already bound to this address")]
    AlreadyBound,

    #[error("segment not found: {0}")]
    SegmentNotFound(String),

    #[error("too many consumers attached (limit {0})")]
    TooManyConsumers(usize),

    #[error("read attempted while no sink is bound")]
    ReadWithoutBoundSink,

    #[error("post called outside a wait/post cycle")]
    PostWithoutWait,

    #[error("wait interrupted by shutdown request")]
    Interrupted,

    #[error("node control block is unresponsive")]
    NodeUnresponsive,

    #[error("semaphore failure: {0}")]
    Sem(#[from] nix::errno::Errno),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        let err = LockstepError::SegmentNotFound("pos1".to_string());
        assert_eq!(err.to_string(), "segment not found: pos1");

        let err = LockstepError::TooManyConsumers(10);
        assert_eq!(err.to_string(), "too many consumers attached (limit 10)");

        let err = LockstepError::AddressTooLong(300, 200);
        assert_eq!(
            err.to_string(),
            "segment address of 300 bytes exceeds the 200 byte limit"
        );
    }

    #[test]
    fn io_errors_convert_via_from() {
        fn fails() -> Result<(), io::Error> {
            Err(io::Error::other("disk on fire"))
        }

        fn propagates() -> Result<(), LockstepError> {
            fails()?;
            Ok(())
        }

        match propagates().unwrap_err() {
            LockstepError::Io(e) => assert_eq!(e.to_string(), "disk on fire"),
            other => panic!("expected Io variant, got {other:?}"),
        }
    }
}
