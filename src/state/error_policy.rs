//! Consecutive-failure policy
//!
//! Every counted failure bumps the product's error counter; once the counter
//! reaches `max_errors` the product is hidden. A single success clears the
//! counter and restores a hidden product.

/// Which admin notice a state change calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Failed, still below the threshold
    ApproachingThreshold,

    /// Failed and hidden from the catalog
    Hidden,

    /// Hidden product synced successfully again
    Restored,
}

/// Outcome of applying a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDecision {
    pub new_error_count: u32,
    pub should_hide: bool,
    pub notice: NoticeKind,
}

/// Outcome of applying a success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessDecision {
    pub new_error_count: u32,
    pub restore: bool,
    pub notice: Option<NoticeKind>,
}

/// Maps error counts to visibility decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    max_errors: u32,
}

impl ErrorPolicy {
    /// Creates a policy; `max_errors` is clamped to 1..=99
    pub fn new(max_errors: u32) -> Self {
        Self {
            max_errors: max_errors.clamp(1, 99),
        }
    }

    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }

    /// Applies one counted failure to the current error count
    pub fn apply(&self, current_error_count: u32) -> FailureDecision {
        let new_error_count = current_error_count.saturating_add(1);
        let should_hide = new_error_count >= self.max_errors;

        FailureDecision {
            new_error_count,
            should_hide,
            notice: if should_hide {
                NoticeKind::Hidden
            } else {
                NoticeKind::ApproachingThreshold
            },
        }
    }

    /// Applies a success. Only a restoration out of the hidden state produces a notice.
    pub fn on_success(&self, was_hidden: bool) -> SuccessDecision {
        SuccessDecision {
            new_error_count: 0,
            restore: was_hidden,
            notice: was_hidden.then_some(NoticeKind::Restored),
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hides_on_first_failure() {
        let decision = ErrorPolicy::default().apply(0);
        assert_eq!(decision.new_error_count, 1);
        assert!(decision.should_hide);
        assert_eq!(decision.notice, NoticeKind::Hidden);
    }

    #[test]
    fn test_counter_increases_until_threshold() {
        let policy = ErrorPolicy::new(3);
        let mut count = 0;
        let mut hides = Vec::new();

        for _ in 0..5 {
            let decision = policy.apply(count);
            assert_eq!(decision.new_error_count, count + 1);
            count = decision.new_error_count;
            hides.push(decision.should_hide);
        }

        assert_eq!(hides, vec![false, false, true, true, true]);
    }

    #[test]
    fn test_crossing_point_first_true() {
        let policy = ErrorPolicy::new(2);
        assert_eq!(policy.apply(0).notice, NoticeKind::ApproachingThreshold);
        assert_eq!(policy.apply(1).notice, NoticeKind::Hidden);
    }

    #[test]
    fn test_success_always_resets() {
        let policy = ErrorPolicy::new(5);
        assert_eq!(policy.on_success(false).new_error_count, 0);
        assert_eq!(policy.on_success(true).new_error_count, 0);
    }

    #[test]
    fn test_success_notifies_only_on_restore() {
        let policy = ErrorPolicy::new(1);
        assert_eq!(policy.on_success(false).notice, None);
        assert!(!policy.on_success(false).restore);

        let restored = policy.on_success(true);
        assert!(restored.restore);
        assert_eq!(restored.notice, Some(NoticeKind::Restored));
    }

    #[test]
    fn test_max_errors_clamped() {
        assert_eq!(ErrorPolicy::new(0).max_errors(), 1);
        assert_eq!(ErrorPolicy::new(500).max_errors(), 99);
    }
}
