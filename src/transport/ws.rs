use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::Result;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WS_BASE_URL: &str = "wss://api.openai.com/v1/realtime";

/// Realtime endpoint that attaches to an already accepted SIP call.
///
/// # Errors
/// Returns an error if `base` is not a valid URL.
#[allow(clippy::result_large_err)]
pub fn call_url(base: &str, call_id: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("call_id", call_id);
    Ok(url)
}

/// Open the realtime WebSocket for `call_id`.
///
/// # Errors
/// Returns an error if the API key is not a valid header value or the
/// handshake fails.
pub async fn connect(api_key: &str, call_id: &str) -> Result<WsStream> {
    connect_to(WS_BASE_URL, api_key, call_id).await
}

/// Like [`connect`], against a custom base URL.
///
/// # Errors
/// Returns an error if the URL or key is invalid or the handshake fails.
pub async fn connect_to(base: &str, api_key: &str, call_id: &str) -> Result<WsStream> {
    let url = call_url(base, call_id)?;
    let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

    let mut req = url.as_str().into_client_request()?;
    req.headers_mut().insert(AUTHORIZATION, auth_header);
    let (ws_stream, _) = connect_async(req).await?;

    tracing::info!(call_id, "Connected to OpenAI Realtime");
    Ok(ws_stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_url_encodes_call_id() {
        let url = call_url(WS_BASE_URL, "rtc_abc 1").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.openai.com/v1/realtime?call_id=rtc_abc+1"
        );
    }
}
