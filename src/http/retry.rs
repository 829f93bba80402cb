//! Retry policies for GraphQL requests.
//!
//! Which policy applies follows from the operation kind: queries and
//! subscriptions are safe to re-issue, mutations are not. `for_document`
//! inspects the operation text, so a mutation routed through a query call
//! is still never retried.

use std::time::Duration;

/// Retry policy for one request.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// No retries — mutations always use this.
    #[default]
    None,
    /// Retry on transport failures + 502/503/504, with backoff on 429.
    Idempotent,
    /// User-provided retry logic.
    Custom(RetryConfig),
}

impl RetryPolicy {
    /// Choose a policy from the operation document itself.
    ///
    /// A document whose first operation is a mutation gets `None`; anything
    /// else — named or shorthand queries, subscriptions, even the empty
    /// coalesced document — is idempotent.
    pub fn for_document(document: &str) -> Self {
        if is_mutation_document(document) {
            RetryPolicy::None
        } else {
            RetryPolicy::Idempotent
        }
    }
}

fn is_mutation_document(document: &str) -> bool {
    match document.trim_start().strip_prefix("mutation") {
        // The keyword must end the word: "mutation {", "mutation Transfer(",
        // but not a field named e.g. "mutationRate".
        Some(rest) => {
            rest.is_empty()
                || rest.starts_with(|c: char| c.is_whitespace() || matches!(c, '{' | '(' | '@'))
        }
        None => false,
    }
}

/// Configuration for retry behavior.
///
/// Delays double from `initial_delay` up to `max_delay`, with ±25% jitter
/// unless disabled.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the doubling delay.
    pub max_delay: Duration,
    /// Whether to spread delays by ±25%.
    pub jitter: bool,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            jitter: true,
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// The config behind `RetryPolicy::Idempotent`: also backs off on 429.
    pub fn idempotent() -> Self {
        Self {
            retryable_statuses: vec![429, 502, 503, 504],
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as u64;
        let cap_ms = self.max_delay.as_millis() as u64;
        let scaled = base_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(cap_ms);

        let final_ms = if self.jitter && scaled > 0 {
            let spread = scaled / 4;
            scaled - spread + rand::random::<u64>() % (2 * spread + 1)
        } else {
            scaled
        };

        Duration::from_millis(final_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_documents_are_never_retried() {
        for doc in [
            "mutation { transfer(to: \"bob\", amount: 10) }",
            "mutation Transfer($to: String!) { transfer(to: $to) }",
            "  \n mutation{ bump }",
            "mutation",
        ] {
            assert!(
                matches!(RetryPolicy::for_document(doc), RetryPolicy::None),
                "expected no retries for {doc:?}"
            );
        }
    }

    #[test]
    fn test_reads_are_idempotent() {
        for doc in [
            "{ accounts { owner } }",
            "query Accounts { accounts }",
            "subscription { notifications }",
            // The coalesced empty document: harmless to re-issue.
            "",
        ] {
            assert!(
                matches!(RetryPolicy::for_document(doc), RetryPolicy::Idempotent),
                "expected idempotent policy for {doc:?}"
            );
        }
    }

    #[test]
    fn test_mutation_keyword_must_end_the_word() {
        // A shorthand query selecting a field that merely starts with the
        // keyword is still a read.
        assert!(matches!(
            RetryPolicy::for_document("mutationRate { value }"),
            RetryPolicy::Idempotent
        ));
    }

    #[test]
    fn test_idempotent_config_backs_off_on_rate_limits() {
        let config = RetryConfig::idempotent();
        assert!(config.retryable_statuses.contains(&429));
        assert!(config.retryable_statuses.contains(&503));
        // Mutation-grade defaults do not touch 429.
        assert!(!RetryConfig::default().retryable_statuses.contains(&429));
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_attempt(0).as_millis(), 250);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 500);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 1000);
        // Far past the cap, the delay pins to max_delay.
        assert_eq!(config.delay_for_attempt(12).as_millis(), 8000);
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1000),
            ..RetryConfig::default()
        };
        for _ in 0..32 {
            let ms = config.delay_for_attempt(0).as_millis() as u64;
            assert!((750..=1250).contains(&ms), "jittered delay out of range: {ms}");
        }
    }
}
