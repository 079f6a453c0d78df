/// Helper macro for locking items
///
/// Evaluates to the guard, or returns [`crate::Error::LockError`] from the enclosing function
/// if the mutex was poisoned.
///
/// ```rust, ignore
///  let mut queue = lock!(self.revocations);
///  queue.push(object);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| $crate::Error::LockError)?
    };
}
