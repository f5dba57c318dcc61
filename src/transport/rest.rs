use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderValue};

use crate::error::{Error, Result};
use crate::protocol::models::{SessionConfig, SessionKind};

pub const BASE_URL: &str = "https://api.openai.com/v1/realtime";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// REST control plane for SIP calls (`/calls/{id}/accept`).
#[derive(Clone, Debug)]
pub struct CallsClient {
    client: Client,
    auth_header: HeaderValue,
    base_url: String,
}

impl CallsClient {
    /// # Errors
    /// Returns an error if the API key results in an invalid header or the
    /// HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(api_key: &str) -> Result<Self> {
        Self::new_with_timeouts(api_key, DEFAULT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    /// # Errors
    /// Returns an error if the API key results in an invalid header or the
    /// HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new_with_timeouts(
        api_key: &str,
        timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .build()?;
        let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

        Ok(Self {
            client,
            auth_header,
            base_url: BASE_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn call_url(&self, call_id: &str, action: &str) -> String {
        format!("{}/calls/{call_id}/{action}", self.base_url.trim_end_matches('/'))
    }

    /// Accept an incoming SIP call with the given session configuration.
    ///
    /// # Errors
    /// Returns an error for non-realtime sessions, or if the request fails or
    /// returns a non-success status.
    pub async fn sip_accept(&self, call_id: &str, session: &SessionConfig) -> Result<()> {
        if session.kind != SessionKind::Realtime {
            return Err(Error::InvalidClientEvent(
                "sip accept only supports realtime sessions".to_string(),
            ));
        }

        self.client
            .post(self.call_url(call_id, "accept"))
            .header(AUTHORIZATION, &self.auth_header)
            .json(session)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(call_id, "Accepted SIP call");
        Ok(())
    }
}
