//! Admission and serialization gates.
//!
//! Two gates guard the engine. [`Admission`] is the top-level gate: data
//! operations (read/write/info) enter shared, administrative operations
//! (init/destroy/fail/repair) enter exclusive. [`ParityGate`] serializes the
//! multi-disk read-XOR-write sequence of the parity levels against ordinary
//! block I/O on the same array.
//!
//! Both are a mutex-guarded counter plus a condition variable; permits are
//! RAII values whose drop releases the gate and wakes waiters. There is no
//! cancellation and no timeout, operations run to completion.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct AdmissionState {
    shared: usize,
    pending_exclusive: usize,
    exclusive: bool,
}

/// The top-level operation gate.
///
/// Any number of shared holders may run concurrently; an exclusive holder
/// runs alone. A waiting exclusive entrant lets in-flight shared holders
/// drain but queues new shared entrants behind itself.
#[derive(Debug, Default)]
pub(crate) struct Admission {
    state: Mutex<AdmissionState>,
    cond: Condvar,
}

impl Admission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> SharedOp<'_> {
        let mut state = lock(&self.state);
        while state.exclusive || state.pending_exclusive > 0 {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.shared += 1;
        SharedOp { gate: self }
    }

    pub fn exclusive(&self) -> ExclusiveOp<'_> {
        let mut state = lock(&self.state);
        state.pending_exclusive += 1;
        while state.exclusive || state.shared > 0 {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.pending_exclusive -= 1;
        state.exclusive = true;
        ExclusiveOp { gate: self }
    }
}

pub(crate) struct SharedOp<'a> {
    gate: &'a Admission,
}

impl Drop for SharedOp<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.gate.state);
        state.shared -= 1;
        if state.shared == 0 {
            self.gate.cond.notify_all();
        }
    }
}

pub(crate) struct ExclusiveOp<'a> {
    gate: &'a Admission,
}

impl Drop for ExclusiveOp<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.gate.state);
        state.exclusive = false;
        self.gate.cond.notify_all();
    }
}

#[derive(Debug, Default)]
struct ParityState {
    readers: usize,
    locked: bool,
}

/// The parity critical-section gate.
///
/// Ordinary block I/O on the parity levels enters shared; a parity update
/// enters locked and holds the gate across the whole peer-read, XOR, and
/// parity-write sequence, excluding shared holders and other updaters.
#[derive(Debug, Default)]
pub(crate) struct ParityGate {
    state: Mutex<ParityState>,
    cond: Condvar,
}

impl ParityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> ParityShared<'_> {
        let mut state = lock(&self.state);
        while state.locked {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.readers += 1;
        ParityShared { gate: self }
    }

    pub fn locked(&self) -> ParityLocked<'_> {
        let mut state = lock(&self.state);
        while state.locked || state.readers > 0 {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.locked = true;
        ParityLocked { gate: self }
    }
}

pub(crate) struct ParityShared<'a> {
    gate: &'a ParityGate,
}

impl Drop for ParityShared<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.gate.state);
        state.readers -= 1;
        if state.readers == 0 {
            self.gate.cond.notify_all();
        }
    }
}

pub(crate) struct ParityLocked<'a> {
    gate: &'a ParityGate,
}

impl Drop for ParityLocked<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.gate.state);
        state.locked = false;
        self.gate.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn shared_holders_overlap() {
        let gate = Admission::new();
        let a = gate.shared();
        let b = gate.shared();
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_holders_never_overlap_anything() {
        let gate = Arc::new(Admission::new());
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        let _op = gate.shared();
                        active.fetch_add(1, Ordering::SeqCst);
                        thread::yield_now();
                        active.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _op = gate.exclusive();
                        assert_eq!(active.load(Ordering::SeqCst), 0);
                        thread::yield_now();
                        assert_eq!(active.load(Ordering::SeqCst), 0);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn parity_lock_excludes_readers() {
        let gate = Arc::new(ParityGate::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let lock = gate.locked();
        let reader = {
            let gate = Arc::clone(&gate);
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                let _shared = gate.shared();
                inside.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(inside.load(Ordering::SeqCst), 0);
        drop(lock);
        reader.join().unwrap();
        assert_eq!(inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parity_lock_waits_for_readers_to_drain() {
        let gate = Arc::new(ParityGate::new());
        let reader = gate.shared();

        let locked = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _lock = gate.locked();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!locked.is_finished());
        drop(reader);
        locked.join().unwrap();
    }
}
