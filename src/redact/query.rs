//! Query parameter redaction.

use std::collections::BTreeMap;
use url::{form_urlencoded, ParseError, Position, Url};

use super::MASK;

/// Base used to resolve relative references such as `/cb?code=x`.
/// Only the path onwards is kept from the result.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Mask skip-listed query parameters in `raw`.
///
/// Parameters are re-serialized sorted by name, so their order may change.
/// Every value of a skip-listed parameter collapses into a single `***`;
/// other parameters keep their original encoding.
/// Relative references are accepted and stay relative.
///
/// Returns `None` if `raw` is not a parseable URL.
pub fn redact_query_params(raw: &str, skip_params: &[String]) -> Option<String> {
    match Url::parse(raw) {
        Ok(mut url) => {
            apply_mask(&mut url, skip_params);
            Some(url.to_string())
        }
        Err(ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(RELATIVE_BASE).ok()?;
            let mut url = base.join(raw).ok()?;
            apply_mask(&mut url, skip_params);
            Some(url[Position::BeforePath..].to_string())
        }
        Err(_) => None,
    }
}

/// Build the absolute URL of an inbound request with its query redacted.
///
/// `request_uri` is the origin-form request target (`/path?query`). It is
/// redacted on its own and appended to `scheme://host` verbatim, so the
/// target can never replace the host. A target that is not origin-form
/// yields `scheme://host` followed by `path`, with no query at all.
pub fn redact_request_url(
    scheme: &str,
    host: &str,
    path: &str,
    request_uri: &str,
    skip_params: &[String],
) -> String {
    match redact_origin_form(request_uri, skip_params) {
        Some(target) => format!("{}://{}{}", scheme, host, target),
        None => format!("{}://{}{}", scheme, host, path),
    }
}

fn redact_origin_form(request_uri: &str, skip_params: &[String]) -> Option<String> {
    if !request_uri.starts_with('/') {
        return None;
    }
    let (path, query) = match request_uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (request_uri, None),
    };

    let mut url = Url::parse(RELATIVE_BASE).ok()?;
    url.set_path(path);
    let masked = query.and_then(|query| mask_query(query, skip_params));
    url.set_query(masked.as_deref());
    Some(url[Position::BeforePath..].to_string())
}

fn apply_mask(url: &mut Url, skip_params: &[String]) {
    let masked = url.query().and_then(|query| mask_query(query, skip_params));
    url.set_query(masked.as_deref());
}

/// Names are matched decoded; untouched pairs are emitted as they arrived.
/// Returns `None` when the query holds no pairs.
fn mask_query(query: &str, skip_params: &[String]) -> Option<String> {
    let mut params: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        if let Some((key, _)) = form_urlencoded::parse(pair.as_bytes()).next() {
            params.entry(key.into_owned()).or_default().push(pair);
        }
    }

    if params.is_empty() {
        return None;
    }

    let mut pairs = Vec::new();
    for (key, raw) in &params {
        if skip_params.iter().any(|skip| skip == key) {
            let raw_key = raw[0].split_once('=').map_or(raw[0], |(name, _)| name);
            pairs.push(format!("{}={}", raw_key, MASK));
        } else {
            pairs.extend(raw.iter().map(|pair| pair.to_string()));
        }
    }
    Some(pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        let url = Url::parse(url).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_request_url_masks_skipped_param() {
        let url = redact_request_url(
            "https",
            "api.example.com",
            "/users",
            "/users?token=abc123&page=2",
            &skip(&["token"]),
        );
        assert!(url.starts_with("https://api.example.com/users?page=2&token="));
        assert_eq!(query_value(&url, "token").as_deref(), Some("***"));
        assert_eq!(query_value(&url, "page").as_deref(), Some("2"));
        assert!(!url.contains("abc123"));
    }

    #[test]
    fn test_skip_list_is_case_sensitive() {
        let url = redact_request_url(
            "http",
            "localhost",
            "/",
            "/?Token=abc",
            &skip(&["token"]),
        );
        assert_eq!(query_value(&url, "Token").as_deref(), Some("abc"));
    }

    #[test]
    fn test_repeated_param_collapses_to_single_mask() {
        let url = redact_request_url(
            "http",
            "localhost",
            "/a",
            "/a?key=1&key=2&other=x&other=y",
            &skip(&["key"]),
        );
        assert_eq!(url, "http://localhost/a?key=***&other=x&other=y");
    }

    #[test]
    fn test_request_url_without_query() {
        let url = redact_request_url("http", "localhost:8080", "/health", "/health", &[]);
        assert_eq!(url, "http://localhost:8080/health");
    }

    #[test]
    fn test_request_url_fails_closed() {
        let url = redact_request_url("https", "api.example.com", "*", "*", &skip(&["token"]));
        assert_eq!(url, "https://api.example.com*");
    }

    #[test]
    fn test_request_url_keeps_host_for_double_slash_path() {
        let url = redact_request_url(
            "http",
            "real.example.com",
            "//evil.com/x",
            "//evil.com/x?a=1",
            &[],
        );
        assert_eq!(url, "http://real.example.com//evil.com/x?a=1");
    }

    #[test]
    fn test_request_url_without_host_keeps_query() {
        let url = redact_request_url(
            "http",
            "",
            "/users",
            "/users?token=abc&page=2",
            &skip(&["token"]),
        );
        assert_eq!(url, "http:///users?page=2&token=***");
    }

    #[test]
    fn test_other_params_keep_their_encoding() {
        let redacted =
            redact_query_params("/x?blob=%FF%FE&token=t&q=a+b", &skip(&["token"])).unwrap();
        assert_eq!(redacted, "/x?blob=%FF%FE&q=a+b&token=***");

        let url = redact_request_url(
            "http",
            "localhost",
            "/x",
            "/x?blob=%FF%FE&token=t",
            &skip(&["token"]),
        );
        assert_eq!(url, "http://localhost/x?blob=%FF%FE&token=***");
    }

    #[test]
    fn test_encoded_param_name_is_matched_decoded() {
        let redacted = redact_query_params("/x?to%6Ben=t&a=1", &skip(&["token"])).unwrap();
        assert_eq!(redacted, "/x?a=1&to%6Ben=***");
    }

    #[test]
    fn test_empty_query_is_dropped() {
        let url = redact_request_url("http", "localhost", "/a", "/a?&", &[]);
        assert_eq!(url, "http://localhost/a");
    }

    #[test]
    fn test_redact_absolute_location() {
        let redacted = redact_query_params(
            "https://idp.example.com/callback?code=secret&state=xyz",
            &skip(&["code"]),
        )
        .unwrap();
        assert_eq!(query_value(&redacted, "code").as_deref(), Some("***"));
        assert_eq!(query_value(&redacted, "state").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_redact_relative_location_stays_relative() {
        let redacted =
            redact_query_params("/login?next=%2Fhome&token=t", &skip(&["token"])).unwrap();
        assert_eq!(redacted, "/login?next=%2Fhome&token=***");
    }

    #[test]
    fn test_redact_unparseable_returns_none() {
        assert!(redact_query_params("http://[::1", &skip(&["a"])).is_none());
    }
}
