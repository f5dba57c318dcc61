//! Caller number extraction for incoming call webhooks.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::http::HeaderMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const HEADER_KEYS: [&str; 3] = ["X-Phone-Number", "X-Caller-Number", "From"];
const PARAM_KEYS: [&str; 4] = ["phone", "phone_number", "from", "From"];
const CALL_SID_HEADERS: [&str; 2] = ["x-twilio-callsid", "twilio-callsid"];

static SIP_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+?\d+").unwrap());

/// One SIP header forwarded with the incoming-call event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipHeader {
    #[serde(default)]
    pub name: String,
    /// Empty when the trunk forwarded the header without a value.
    #[serde(default)]
    pub value: String,
}

/// Reduce a raw number to domestic Japanese digits.
///
/// `+81` numbers get their trunk `0` back; anything else keeps only its
/// digits. Returns `None` when no digits remain.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = kept.strip_prefix("+81") {
        let rest: String = rest.chars().filter(char::is_ascii_digit).collect();
        return match rest.chars().next() {
            None => None,
            Some('0') => Some(rest),
            Some(_) => Some(format!("0{rest}")),
        };
    }

    let digits: String = kept.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Where the caller number may be found, in search order.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerSources<'a> {
    pub headers: Option<&'a HeaderMap>,
    pub query: Option<&'a HashMap<String, String>>,
    pub body: Option<&'a Value>,
    pub sip_headers: &'a [SipHeader],
    pub fallback: Option<&'a str>,
}

/// First candidate that normalizes to a number.
///
/// Order: HTTP headers, query parameters, JSON body fields, the SIP `From`
/// header, then the configured fallback.
#[must_use]
pub fn resolve(sources: &CallerSources<'_>) -> Option<String> {
    let from_headers = sources.headers.into_iter().flat_map(|headers| {
        HEADER_KEYS
            .iter()
            .filter_map(move |key| headers.get(*key).and_then(|v| v.to_str().ok()))
    });
    let from_query = sources
        .query
        .into_iter()
        .flat_map(|query| PARAM_KEYS.iter().filter_map(move |key| query.get(*key).map(String::as_str)));
    let from_body = sources
        .body
        .into_iter()
        .flat_map(|body| PARAM_KEYS.iter().filter_map(move |key| body.get(*key).and_then(Value::as_str)));
    let from_sip = sip_header(sources.sip_headers, "from")
        .and_then(|value| SIP_NUMBER.find(value))
        .map(|m| m.as_str());

    from_headers
        .chain(from_query)
        .chain(from_body)
        .chain(from_sip)
        .chain(sources.fallback)
        .filter(|raw| !raw.trim().is_empty())
        .find_map(normalize)
}

/// Value of the first SIP header named `name`, compared case-insensitively.
#[must_use]
pub fn sip_header<'a>(headers: &'a [SipHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name) && !h.value.trim().is_empty())
        .map(|h| h.value.as_str())
}

/// Twilio call SID, when the trunk forwards one.
#[must_use]
pub fn twilio_call_sid(headers: &[SipHeader]) -> Option<String> {
    CALL_SID_HEADERS
        .iter()
        .find_map(|name| sip_header(headers, name))
        .map(|value| value.trim().to_string())
}
