//! Bounded retries for content generation.
//!
//! Transient failures are retried in a plain loop. Authentication failures
//! stop the loop immediately and hand control to the user, whose choices are
//! tracked by [`AuthRecovery`] so the number of credential attempts stays bounded.

use tracing::warn;

use crate::generator::GeneratorError;
use crate::generator::provider::ProviderSettings;

#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Succeeded(T),
    ExhaustedRetries { attempts: u32, last_error: GeneratorError },
    /// The provider refused the credential; the user decides what happens next.
    AuthRejected(GeneratorError),
}

/// Run `op` up to `max_attempts` times, retrying only transient errors.
pub fn with_retries<T>(
    max_attempts: u32,
    mut op: impl FnMut(u32) -> Result<T, GeneratorError>,
) -> RetryOutcome<T> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(e) if e.is_auth() => return RetryOutcome::AuthRejected(e),
            Err(e) if !e.is_transient() || attempt >= max_attempts => {
                return RetryOutcome::ExhaustedRetries {
                    attempts: attempt,
                    last_error: e,
                };
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "generation attempt failed, retrying");
                attempt += 1;
            }
        }
    }
}

/// What the user picked after an authentication failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthChoice {
    NewCredential(String),
    SwitchProvider,
    Cancel,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStep {
    /// Dispatch the request again with these settings.
    Retry(ProviderSettings),
    Exhausted,
    Cancelled,
}

/// Counts credential attempts across user decisions.
#[derive(Clone, Debug)]
pub struct AuthRecovery {
    attempts: u32,
    max_attempts: u32,
}

impl AuthRecovery {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Turn the user's choice into the next step. Switching goes to
    /// `fallback` when it names a different provider, otherwise to the
    /// other built-in provider.
    pub fn decide(
        &mut self,
        current: &ProviderSettings,
        fallback: Option<&ProviderSettings>,
        choice: AuthChoice,
    ) -> AuthStep {
        if choice == AuthChoice::Cancel {
            return AuthStep::Cancelled;
        }
        if !self.can_retry() {
            return AuthStep::Exhausted;
        }
        self.attempts += 1;
        match choice {
            AuthChoice::NewCredential(key) => {
                let key = key.trim().to_string();
                let mut settings = current.clone();
                settings.api_key = if key.is_empty() { None } else { Some(key) };
                AuthStep::Retry(settings)
            }
            AuthChoice::SwitchProvider => match fallback {
                Some(fallback) if fallback.kind != current.kind => AuthStep::Retry(fallback.clone()),
                _ => AuthStep::Retry(current.switched()),
            },
            AuthChoice::Cancel => AuthStep::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::generator::provider::ProviderKind;

    #[test]
    fn test_succeeds_after_transient_failures() {
        let outcome = with_retries(3, |attempt| {
            if attempt < 3 {
                Err(GeneratorError::Network("reset".to_string()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(outcome, RetryOutcome::Succeeded(3));
    }

    #[test]
    fn test_exhausts_after_max_attempts() {
        let mut calls = 0;
        let outcome: RetryOutcome<()> = with_retries(2, |_| {
            calls += 1;
            Err(GeneratorError::Malformed("nope".to_string()))
        });
        assert_eq!(calls, 2);
        assert!(matches!(
            outcome,
            RetryOutcome::ExhaustedRetries { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_auth_error_stops_immediately() {
        let mut calls = 0;
        let outcome: RetryOutcome<()> = with_retries(5, |_| {
            calls += 1;
            Err(GeneratorError::Auth { status: 401 })
        });
        assert_eq!(calls, 1);
        assert_eq!(outcome, RetryOutcome::AuthRejected(GeneratorError::Auth { status: 401 }));
    }

    #[test]
    fn test_non_transient_http_error_not_retried() {
        let mut calls = 0;
        let outcome: RetryOutcome<()> = with_retries(5, |_| {
            calls += 1;
            Err(GeneratorError::Http { status: 400, body: String::new() })
        });
        assert_eq!(calls, 1);
        assert!(matches!(outcome, RetryOutcome::ExhaustedRetries { attempts: 1, .. }));
    }

    #[test]
    fn test_auth_recovery_is_bounded() {
        let settings = ProviderSettings::defaults_for(ProviderKind::OpenAi, Duration::from_secs(5));
        let mut recovery = AuthRecovery::new(2);

        let AuthStep::Retry(next) = recovery.decide(&settings, None, AuthChoice::NewCredential("sk-new".into())) else {
            panic!("expected retry");
        };
        assert_eq!(next.api_key.as_deref(), Some("sk-new"));

        let AuthStep::Retry(next) = recovery.decide(&next, None, AuthChoice::SwitchProvider) else {
            panic!("expected retry");
        };
        assert_eq!(next.kind, ProviderKind::Anthropic);

        assert_eq!(recovery.decide(&next, None, AuthChoice::SwitchProvider), AuthStep::Exhausted);
        assert_eq!(recovery.decide(&next, None, AuthChoice::Cancel), AuthStep::Cancelled);
    }

    #[test]
    fn test_switch_prefers_configured_fallback() {
        let current = ProviderSettings::defaults_for(ProviderKind::OpenAi, Duration::from_secs(5));
        let mut fallback = ProviderSettings::defaults_for(ProviderKind::Anthropic, Duration::from_secs(5));
        fallback.model = "custom-model".to_string();
        let mut recovery = AuthRecovery::new(3);
        assert_eq!(
            recovery.decide(&current, Some(&fallback), AuthChoice::SwitchProvider),
            AuthStep::Retry(fallback.clone())
        );
        // A fallback naming the current provider is ignored.
        let step = recovery.decide(&fallback, Some(&fallback), AuthChoice::SwitchProvider);
        let AuthStep::Retry(next) = step else {
            panic!("expected retry");
        };
        assert_eq!(next.kind, ProviderKind::OpenAi);
        assert_eq!(recovery.attempts(), 2);
    }
}
