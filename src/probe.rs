//! Network reachability checks
//!
//! A probe answers one question: can we reach the internet right now? Every
//! transport failure (timeout, DNS, refused connection, non-success status)
//! counts as offline. Probes may take up to their timeout, so they are only
//! awaited from worker tasks and the retry scheduler, never from the consumer.

use crate::config::ConnectivityConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for on-demand connectivity checks
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the network is reachable
    async fn is_online(&self) -> bool;

    /// Get the name of this probe implementation
    fn name(&self) -> &'static str;
}

/// Probe that issues an HTTP GET against a well-known endpoint
///
/// # Examples
///
/// ```no_run
/// use media_dl::probe::{ConnectivityProbe, HttpProbe};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let probe = HttpProbe::new("http://www.google.com", Duration::from_secs(3))?;
/// if !probe.is_online().await {
///     println!("offline");
/// }
/// # Ok(())
/// # }
/// ```
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe for `url` whose requests give up after `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Create a probe from the connectivity section of the configuration
    pub fn from_config(config: &ConnectivityConfig) -> Result<Self> {
        Self::new(config.probe_url.clone(), config.probe_timeout)
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let online = response.status().is_success();
                if !online {
                    tracing::debug!(
                        url = %self.url,
                        status = %response.status(),
                        "Connectivity probe got non-success status"
                    );
                }
                online
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
