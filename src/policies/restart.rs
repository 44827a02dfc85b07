//! # Automatic restart policy.
//!
//! [`RestartPolicy`] caps how many times a worker slot is restarted after an
//! unexpected exit (non-zero code, no terminating signal).
//!
//! - [`RestartPolicy::Disabled`] never restart (default).
//! - [`RestartPolicy::Limited`] restart up to `n` times over the slot's lifetime.
//! - [`RestartPolicy::Unbounded`] always restart.
//!
//! The automatic counter is never reset: the cap is a lifetime cap.
//!
//! ```text
//! exit(code=1) ──► allows(automatic)? ──yes──► wait restart_delay ──► automatic += 1 ──► start
//!                                     └─no───► stopped
//! ```

/// Cap on automatic restarts following unexpected exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart automatically.
    #[default]
    Disabled,
    /// Restart at most this many times.
    Limited(u32),
    /// Restart without limit.
    Unbounded,
}

impl RestartPolicy {
    /// Builds a policy from a plain count: negative means unbounded, `0` disabled.
    ///
    /// ```
    /// use procvisor::RestartPolicy;
    ///
    /// assert_eq!(RestartPolicy::from_count(-1), RestartPolicy::Unbounded);
    /// assert_eq!(RestartPolicy::from_count(0), RestartPolicy::Disabled);
    /// assert_eq!(RestartPolicy::from_count(3), RestartPolicy::Limited(3));
    /// ```
    pub fn from_count(count: i64) -> Self {
        match count {
            n if n < 0 => RestartPolicy::Unbounded,
            0 => RestartPolicy::Disabled,
            n => RestartPolicy::Limited(u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }

    /// Whether another automatic restart is allowed after `automatic` have already happened.
    #[inline]
    pub fn allows(&self, automatic: u32) -> bool {
        match self {
            RestartPolicy::Disabled => false,
            RestartPolicy::Limited(max) => automatic < *max,
            RestartPolicy::Unbounded => true,
        }
    }

    /// Configured cap, `None` when unbounded.
    pub fn limit(&self) -> Option<u32> {
        match self {
            RestartPolicy::Disabled => Some(0),
            RestartPolicy::Limited(max) => Some(*max),
            RestartPolicy::Unbounded => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_allows() {
        assert!(!RestartPolicy::Disabled.allows(0));
        assert_eq!(RestartPolicy::default(), RestartPolicy::Disabled);
    }

    #[test]
    fn limited_stops_at_cap() {
        let policy = RestartPolicy::Limited(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn unbounded_always_allows() {
        assert!(RestartPolicy::Unbounded.allows(u32::MAX));
        assert_eq!(RestartPolicy::Unbounded.limit(), None);
    }

    #[test]
    fn huge_counts_saturate() {
        assert_eq!(
            RestartPolicy::from_count(i64::MAX),
            RestartPolicy::Limited(u32::MAX)
        );
    }
}
