//! HTTP plumbing for the feed source: client construction, request pacing,
//! block detection and the patient retry loop around blocked requests.

use std::future::Future;

use rand::Rng;
use reqwest::header;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::{FeedError, FetchConfig};
use crate::TARGET_WEB_REQUEST;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client, routing through the configured SOCKS proxy when
/// one is set.
pub fn create_http_client(config: &FetchConfig) -> Result<reqwest::Client, FeedError> {
    let mut builder = reqwest::Client::builder()
        .cookie_store(true)
        .gzip(true)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT);

    if let Some(proxy_url) = &config.proxy {
        debug!(target: TARGET_WEB_REQUEST, "Routing requests through proxy {}", proxy_url);
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    Ok(builder.build()?)
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    let extra = rand::rng().random_range(0.0..1.0) * jitter.as_secs_f64();
    base + Duration::from_secs_f64(extra)
}

/// Pause before a request so the polling pass never hammers the source.
pub async fn pace(config: &FetchConfig) {
    let (base, jitter) = config.pace();
    let pause = jittered(base, jitter);
    debug!(target: TARGET_WEB_REQUEST, "Pacing for {:?}", pause);
    sleep(pause).await;
}

/// Paced GET returning the body, with the bot-check marker turned into
/// [`FeedError::Blocked`].
pub async fn fetch_text(
    client: &reqwest::Client,
    config: &FetchConfig,
    url: &str,
) -> Result<String, FeedError> {
    pace(config).await;
    debug!(target: TARGET_WEB_REQUEST, "GET {}", url);

    let response = client
        .get(url)
        .header(
            header::ACCEPT,
            "application/rss+xml, application/atom+xml, application/xml, text/xml, text/html, */*;q=0.9",
        )
        .send()
        .await?
        .error_for_status()?;
    let body = response.text().await?;

    if let Some(marker) = &config.block_marker {
        if body.contains(marker.as_str()) {
            return Err(FeedError::Blocked);
        }
    }
    Ok(body)
}

/// Run `op` until it returns anything other than [`FeedError::Blocked`],
/// sleeping a long jittered backoff between attempts. Attempts are
/// unbounded: the sources lift their blocks eventually and a polling pass
/// has nowhere better to be.
pub async fn retry_on_block<T, F, Fut>(config: &FetchConfig, mut op: F) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    loop {
        match op().await {
            Err(FeedError::Blocked) => {
                let (base, jitter) = config.block_backoff();
                let pause = jittered(base, jitter);
                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Blocked by the source, backing off for {:?}", pause
                );
                sleep(pause).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_secs(5);
        let jitter = Duration::from_secs(10);
        for _ in 0..100 {
            let d = jittered(base, jitter);
            assert!(d >= base);
            assert!(d <= base + jitter);
        }
    }

    #[tokio::test]
    async fn retry_passes_through_success_and_other_errors() {
        let config = FetchConfig {
            block_backoff_mins: 0,
            block_jitter_mins: 0,
            ..FetchConfig::default()
        };

        let ok: Result<i32, FeedError> = retry_on_block(&config, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let mut attempts = 0;
        let result = retry_on_block(&config, || {
            attempts += 1;
            let blocked = attempts < 3;
            async move {
                if blocked {
                    Err(FeedError::Blocked)
                } else {
                    Ok("through")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "through");
        assert_eq!(attempts, 3);
    }
}
