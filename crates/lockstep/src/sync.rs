//! Unnamed process-shared POSIX semaphores embedded in a segment.
//!
//! The cells live inside the mapped Node, so they are visible to every
//! attached process and disappear with the segment file. One process
//! initializes each cell (`pshared = 1`) while holding the Node's
//! construct latch; everyone else wraps the already-initialized cell.

use crate::errors::LockstepError;
use nix::errno::Errno;
use std::time::Duration;

pub(crate) struct SharedSemaphore {
    sem: *mut libc::sem_t,
}

unsafe impl Send for SharedSemaphore {}

impl SharedSemaphore {
    /// Initialize `cell` in place as a process-shared semaphore.
    ///
    /// # Safety
    /// `cell` must point into a live shared mapping and must not already
    /// hold an initialized semaphore.
    pub(crate) unsafe fn init(cell: *mut libc::sem_t, value: u32) -> Result<Self, LockstepError> {
        let ret = unsafe { libc::sem_init(cell, 1, value) };
        if ret != 0 {
            return Err(LockstepError::Sem(Errno::last()));
        }
        Ok(Self { sem: cell })
    }

    /// Wrap an already-initialized cell.
    ///
    /// # Safety
    /// `cell` must point at a semaphore previously set up with `init` in a
    /// mapping that outlives the returned handle.
    pub(crate) unsafe fn from_cell(cell: *mut libc::sem_t) -> Self {
        Self { sem: cell }
    }

    pub(crate) fn post(&self) -> Result<(), LockstepError> {
        let ret = unsafe { libc::sem_post(self.sem) };
        if ret != 0 {
            return Err(LockstepError::Sem(Errno::last()));
        }
        Ok(())
    }

    /// Wait at most `timeout` for a token.
    ///
    /// Returns `Ok(true)` when a token was consumed, `Ok(false)` on timeout
    /// or signal interruption; callers treat both the same way and re-check
    /// their wake condition.
    pub(crate) fn timed_wait(&self, timeout: Duration) -> Result<bool, LockstepError> {
        let mut deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) };
        if ret != 0 {
            return Err(LockstepError::Sem(Errno::last()));
        }

        deadline.tv_sec += timeout.as_secs() as libc::time_t;
        deadline.tv_nsec += timeout.subsec_nanos() as libc::c_long;
        if deadline.tv_nsec >= 1_000_000_000 {
            deadline.tv_sec += 1;
            deadline.tv_nsec -= 1_000_000_000;
        }

        let ret = unsafe { libc::sem_timedwait(self.sem, &deadline) };
        if ret == 0 {
            return Ok(true);
        }
        match Errno::last() {
            Errno::ETIMEDOUT | Errno::EINTR => Ok(false),
            e => Err(LockstepError::Sem(e)),
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn value(&self) -> Result<i32, LockstepError> {
        let mut val: libc::c_int = 0;
        let ret = unsafe { libc::sem_getvalue(self.sem, &mut val) };
        if ret != 0 {
            return Err(LockstepError::Sem(Errno::last()));
        }
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    #[test]
    fn timed_wait_times_out_then_acquires_after_post() {
        let mut cell = MaybeUninit::<libc::sem_t>::zeroed();
        let sem = unsafe { SharedSemaphore::init(cell.as_mut_ptr(), 0) }.unwrap();

        assert!(!sem.timed_wait(Duration::from_millis(20)).unwrap());

        sem.post().unwrap();
        assert_eq!(sem.value().unwrap(), 1);
        assert!(sem.timed_wait(Duration::from_millis(20)).unwrap());
        assert_eq!(sem.value().unwrap(), 0);
    }

    #[test]
    fn initial_value_is_respected() {
        let mut cell = MaybeUninit::<libc::sem_t>::zeroed();
        let sem = unsafe { SharedSemaphore::init(cell.as_mut_ptr(), 2) }.unwrap();

        assert!(sem.timed_wait(Duration::from_millis(5)).unwrap());
        assert!(sem.timed_wait(Duration::from_millis(5)).unwrap());
        assert!(!sem.timed_wait(Duration::from_millis(5)).unwrap());
    }
}
