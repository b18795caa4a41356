//! Post-action health verification: bounded polling, never waits forever.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::VerifyConfig;

/// Poll the health endpoint up to `retries` times, sleeping `delay_secs`
/// before each attempt. True on the first 2xx response; false when the
/// budget is exhausted. Transport errors count as failed attempts.
pub async fn verify_health(config: &VerifyConfig) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!("Health client build failed: {:#}", e);
            return false;
        }
    };

    for attempt in 1..=config.retries {
        info!(
            "Health check {}/{} - waiting {}s",
            attempt, config.retries, config.delay_secs
        );
        tokio::time::sleep(Duration::from_secs(config.delay_secs)).await;

        match client.get(&config.health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Health passed on attempt {}", attempt);
                return true;
            }
            Ok(resp) => warn!("Health attempt {} -> HTTP {}", attempt, resp.status()),
            Err(e) => warn!("Health attempt {} failed: {}", attempt, e),
        }
    }

    error!("All {} health-check attempts failed", config.retries);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn verify_config(url: String, retries: u32) -> VerifyConfig {
        VerifyConfig {
            health_url: url,
            retries,
            delay_secs: 0,
            timeout_secs: 1,
        }
    }

    async fn serve_once(listener: TcpListener, response: &'static str) {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            use tokio::io::AsyncReadExt;
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
        }
    }

    #[tokio::test]
    async fn test_healthy_endpoint_passes_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok",
        ));

        let config = verify_config(format!("http://{addr}/health"), 3);
        assert!(verify_health(&config).await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_budget() {
        // Bind then drop so the port is very likely refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = verify_config(format!("http://{addr}/health"), 2);
        assert!(!verify_health(&config).await);
    }

    #[tokio::test]
    async fn test_error_status_is_a_failed_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n",
        ));

        let config = verify_config(format!("http://{addr}/health"), 1);
        assert!(!verify_health(&config).await);
    }
}
