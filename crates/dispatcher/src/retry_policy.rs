use std::fmt;

use feeder_domain::DeliveryAttempt;
use feeder_errors::FeederError;

/// How a command delivery was settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Acknowledged: delivered, or failed permanently and dropped.
    Acked,
    /// Rejected into the waiting queue for another attempt after the TTL.
    Retrying,
    /// Dropped for good: undecodable payload or retry budget exhausted.
    Discarded,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Acked => "acked",
            DeliveryOutcome::Retrying => "retrying",
            DeliveryOutcome::Discarded => "discarded",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded redelivery through the waiting queue.
///
/// `max_retry_count` is the number of retries after the first delivery: a
/// delivery with death count `d` is retried while `d < max_retry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retry_count: u32,
}

impl RetryPolicy {
    pub fn new(max_retry_count: u32) -> Self {
        Self { max_retry_count }
    }

    pub fn should_retry(&self, attempt: &DeliveryAttempt) -> bool {
        attempt.attempt_count < self.max_retry_count
    }

    /// Outcome for a delivery that failed with `error`.
    pub fn outcome_for(&self, error: &FeederError, attempt: &DeliveryAttempt) -> DeliveryOutcome {
        if !error.is_retryable() {
            DeliveryOutcome::Acked
        } else if self.should_retry(attempt) {
            DeliveryOutcome::Retrying
        } else {
            DeliveryOutcome::Discarded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(death_count: Option<u32>) -> DeliveryAttempt {
        DeliveryAttempt::new(death_count, Some("acme.uk-sa2024-hnode-v1-0a3f".to_string()))
    }

    fn device_503() -> FeederError {
        FeederError::Device5xx {
            status: 503,
            url: "http://10.0.0.5/v1/reboot".to_string(),
        }
    }

    #[test]
    fn test_retries_until_budget_spent() {
        let policy = RetryPolicy::new(2);

        let outcomes: Vec<DeliveryOutcome> = [None, Some(1), Some(2), Some(3)]
            .into_iter()
            .map(|count| policy.outcome_for(&device_503(), &attempt(count)))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                DeliveryOutcome::Retrying,
                DeliveryOutcome::Retrying,
                DeliveryOutcome::Discarded,
                DeliveryOutcome::Discarded,
            ]
        );
    }

    #[test]
    fn test_permanent_errors_are_acked() {
        let policy = RetryPolicy::new(5);
        let errors = [
            FeederError::invalid_target("acme"),
            FeederError::NodeNotFound("uk-sa2024-hnode-v1-0a3f".to_string()),
            FeederError::Device4xx {
                status: 404,
                url: "http://10.0.0.5/x".to_string(),
            },
        ];

        for error in errors {
            assert_eq!(policy.outcome_for(&error, &attempt(None)), DeliveryOutcome::Acked);
        }
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::new(0);
        assert!(!policy.should_retry(&attempt(None)));
        assert_eq!(
            policy.outcome_for(&FeederError::Transport("refused".into()), &attempt(None)),
            DeliveryOutcome::Discarded
        );
    }
}
