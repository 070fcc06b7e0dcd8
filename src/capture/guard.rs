//! Scoped ownership of OS capture handles.
//!
//! Each acquired handle is wrapped in a [`HandleGuard`] that runs its release
//! function on drop, so early returns and `?` release everything acquired so
//! far in reverse order. A process-wide counter tracks guards still alive.

use std::sync::atomic::{AtomicUsize, Ordering};

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);

/// Serializes tests that assert on the global counter.
#[cfg(test)]
pub(crate) static COUNTER_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Number of capture handles acquired and not yet released.
pub fn outstanding_handles() -> usize {
    OUTSTANDING.load(Ordering::SeqCst)
}

pub struct HandleGuard<H: Copy, F: FnMut(H)> {
    handle: H,
    release: F,
    label: &'static str,
}

impl<H: Copy, F: FnMut(H)> HandleGuard<H, F> {
    pub fn new(label: &'static str, handle: H, release: F) -> Self {
        OUTSTANDING.fetch_add(1, Ordering::SeqCst);
        Self {
            handle,
            release,
            label,
        }
    }

    pub fn get(&self) -> H {
        self.handle
    }
}

impl<H: Copy, F: FnMut(H)> Drop for HandleGuard<H, F> {
    fn drop(&mut self) {
        (self.release)(self.handle);
        OUTSTANDING.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!("Released {}", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::error::{RecognitionError, RecognitionResult};

    /// Mirrors the GDI acquisition sequence with a configurable failing step.
    fn fake_capture(fail_at: Option<usize>, log: &RefCell<Vec<String>>) -> RecognitionResult<u32> {
        let step = |i: usize, name: &'static str| -> RecognitionResult<usize> {
            if fail_at == Some(i) {
                Err(RecognitionError::capture(name, "induced"))
            } else {
                Ok(i + 100)
            }
        };
        let release = |h: usize| log.borrow_mut().push(format!("release {h}"));

        let screen_dc = HandleGuard::new("screen dc", step(0, "GetDC")?, release);
        let mem_dc = HandleGuard::new("memory dc", step(1, "CreateCompatibleDC")?, release);
        let bitmap = HandleGuard::new("bitmap", step(2, "CreateCompatibleBitmap")?, release);
        step(3, "BitBlt")?;
        Ok((screen_dc.get() + mem_dc.get() + bitmap.get()) as u32)
    }

    #[test]
    fn test_handles_released_on_every_path() {
        let _lock = COUNTER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for fail_at in [None, Some(0), Some(1), Some(2), Some(3)] {
            let log = RefCell::new(Vec::new());
            for _ in 0..10 {
                let _ = fake_capture(fail_at, &log);
            }
            let acquired = fail_at.unwrap_or(3).min(3);
            assert_eq!(log.borrow().len(), 10 * acquired, "fail_at {fail_at:?}");
        }
    }

    #[test]
    fn test_release_order_is_reversed() {
        let _lock = COUNTER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let log = RefCell::new(Vec::new());
        assert!(fake_capture(Some(3), &log).is_err());
        assert_eq!(
            *log.borrow(),
            vec!["release 102", "release 101", "release 100"]
        );
    }

    #[test]
    fn test_counter_tracks_live_guards() {
        let _lock = COUNTER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = outstanding_handles();
        {
            let _a = HandleGuard::new("a", 1u8, |_| {});
            let _b = HandleGuard::new("b", 2u8, |_| {});
            assert_eq!(outstanding_handles(), before + 2);
        }
        let log = RefCell::new(Vec::new());
        for fail_at in [None, Some(1), Some(3)] {
            let _ = fake_capture(fail_at, &log);
        }
        assert_eq!(outstanding_handles(), before);
    }
}
