use std::collections::HashMap;

use oai_rt_phone::phone::{CallerSources, SipHeader, normalize, resolve};
use serde_json::json;

#[test]
fn test_normalize_table() {
    let cases = [
        ("+81-90-1234-5678", Some("09012345678")),
        ("+81 3 1234 5678", Some("0312345678")),
        ("090 1234 5678", Some("09012345678")),
        ("tel:0120-111-222", Some("0120111222")),
        ("+81-", None),
        ("", None),
    ];
    for (raw, expected) in cases {
        assert_eq!(normalize(raw).as_deref(), expected, "{raw:?}");
    }
}

#[test]
fn test_query_beats_body_and_sip() {
    let query = HashMap::from([("phone_number".to_string(), "0311112222".to_string())]);
    let body = json!({"from": "0699998888"});
    let sip = [SipHeader {
        name: "from".to_string(),
        value: "<sip:+819000000000@example>".to_string(),
    }];
    let sources = CallerSources {
        query: Some(&query),
        body: Some(&body),
        sip_headers: &sip,
        ..CallerSources::default()
    };
    assert_eq!(resolve(&sources).as_deref(), Some("0311112222"));
}

#[test]
fn test_sip_from_without_digits_falls_back() {
    let sip = [SipHeader {
        name: "From".to_string(),
        value: "<sip:anonymous@example>".to_string(),
    }];
    let sources = CallerSources {
        sip_headers: &sip,
        fallback: Some("0120-000-000"),
        ..CallerSources::default()
    };
    assert_eq!(resolve(&sources).as_deref(), Some("0120000000"));
}
