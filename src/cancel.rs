//! # Cooperative Cancellation
//!
//! Long mutations check a shared flag at natural boundaries: between file
//! ingestions, and before the index commit. Cancellation after the index
//! commit has no effect; the snapshot exists.

use crate::error::{DraftError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag shared between the caller and a running
/// operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The operation stops at its next check point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Err(Cancelled)` once `cancel` has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DraftError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Check point helper for an optional token.
pub fn check(token: Option<&CancelToken>) -> Result<()> {
    match token {
        Some(token) => token.check(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancels_once_set() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(DraftError::Cancelled)));

        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn absent_token_never_cancels() {
        assert!(check(None).is_ok());
    }
}
