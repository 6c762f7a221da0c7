//! Address validation and host naming.
//!
//! A segment address is a filesystem-legal name; it maps to a single file
//! under `/dev/shm`, which is the only host-visible object backing a
//! stream (the control block and payload live inside it at fixed offsets).

use crate::errors::LockstepError;
use std::path::PathBuf;

/// Upper bound on address length, comfortably below NAME_MAX.
pub const MAX_ADDRESS_LEN: usize = 200;

const SHM_DIR: &str = "/dev/shm";

/// Translate an address into the path of its backing file.
pub fn segment_path(address: &str) -> Result<PathBuf, LockstepError> {
    validate(address)?;
    Ok(PathBuf::from(SHM_DIR).join(address))
}

fn validate(address: &str) -> Result<(), LockstepError> {
    if address.is_empty() {
        return Err(LockstepError::InvalidAddress("empty address".to_string()));
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(LockstepError::AddressTooLong(
            address.len(),
            MAX_ADDRESS_LEN,
        ));
    }
    if address.bytes().any(|b| b == b'/' || b == 0) || address == "." || address == ".." {
        return Err(LockstepError::InvalidAddress(address.to_string()));
    }
    Ok(())
}
