use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight token for the cycle. Holding it means a cycle is running;
/// dropping it, on any exit path including unwinding, releases the flag.
#[derive(Debug)]
pub struct CycleRunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleRunGuard<'a> {
    /// `None` when another holder exists.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CycleRunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let flag = AtomicBool::new(false);
        let guard = CycleRunGuard::try_acquire(&flag).unwrap();
        assert!(CycleRunGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(CycleRunGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn released_when_holder_panics() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(|| {
            let _guard = CycleRunGuard::try_acquire(&flag).unwrap();
            panic!("step blew up");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }
}
