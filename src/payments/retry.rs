use metrics::counter;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::GatewayError;
use crate::config::PaymentConfig;
use crate::entities::payment::PaymentProvider;

/// Bounded exponential backoff for outbound gateway calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &PaymentConfig) -> Self {
        Self {
            max_attempts: cfg.max_retries.max(1),
            base_delay: cfg.retry_backoff(),
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2x, 4x, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Runs `send` until it succeeds, fails permanently, or attempts run out.
/// Transport errors, 429 and 5xx are retried; other statuses are returned.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    provider: PaymentProvider,
    mut send: F,
) -> Result<Response, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        let last = attempt >= policy.max_attempts;
        match send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) if is_retryable(response.status()) && !last => {
                warn!(
                    provider = provider.as_ref(),
                    status = response.status().as_u16(),
                    attempt,
                    "Gateway call failed, retrying"
                );
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Status { status, body });
            }
            Err(e) if !last => {
                warn!(provider = provider.as_ref(), error = %e, attempt, "Gateway unreachable, retrying");
            }
            Err(e) => return Err(GatewayError::Transport(e)),
        }

        counter!("courseware.gateway.retry", 1, "provider" => provider.as_ref().to_string());
        tokio::time::sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn only_throttling_and_server_errors_retry() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }
}
