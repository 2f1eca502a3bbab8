//! Optimistic compare-and-swap protocol
//!
//! A [`CasOperation`] is handed to `put_with`. The engine reads the current
//! value, asks the operation for a replacement, and swaps only if nothing
//! else wrote the key in between. It retries at most `max_tries` times.

use crate::error::Result;

/// Read-compute-swap update passed to CAS `put` variants
pub trait CasOperation<V>: Send + Sync {
    /// Maximum number of swap attempts, at least one is always made
    fn max_tries(&self) -> u32;

    /// Compute the replacement for the value currently stored
    fn compute_new_value(&self, current: &V) -> Result<V>;
}

/// Outcome of a CAS attempt or of a whole CAS run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<V> {
    /// The swap went through and stored this value
    Success(V),
    /// Another writer changed the key since it was read
    Conflict,
    /// Every allowed attempt conflicted
    Exhausted {
        /// Attempts made
        tries: u32,
    },
}

impl<V> CasOutcome<V> {
    /// True for [`CasOutcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, CasOutcome::Success(_))
    }
}

/// [`CasOperation`] backed by a closure
///
/// ```
/// use layercache::{CasFn, CasOperation};
///
/// let bump: &dyn CasOperation<i64> = &CasFn::new(3, |v: &i64| Ok(v + 1));
/// assert_eq!(bump.max_tries(), 3);
/// assert_eq!(bump.compute_new_value(&41).unwrap(), 42);
/// ```
pub struct CasFn<F> {
    max_tries: u32,
    compute: F,
}

impl<F> CasFn<F> {
    /// Wrap `compute` with a retry budget
    pub fn new(max_tries: u32, compute: F) -> Self {
        Self { max_tries, compute }
    }
}

impl<V, F> CasOperation<V> for CasFn<F>
where
    F: Fn(&V) -> Result<V> + Send + Sync,
{
    fn max_tries(&self) -> u32 {
        self.max_tries
    }

    fn compute_new_value(&self, current: &V) -> Result<V> {
        (self.compute)(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_cas_fn_propagates_errors() {
        let op: &dyn CasOperation<String> =
            &CasFn::new(1, |_: &String| Err(Error::InvalidArgument("nope".into())));
        assert!(op.compute_new_value(&"x".to_string()).is_err());
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(CasOutcome::Success(1).is_success());
        assert!(!CasOutcome::<i32>::Conflict.is_success());
        assert!(!CasOutcome::<i32>::Exhausted { tries: 2 }.is_success());
    }
}
