//! Header redaction.
//!
//! # Rules (applied in order)
//! - Header names are lowercased; headers without values are omitted
//! - One value is logged as is, several as `[v1], [v2]`
//! - `authorization`, `cookie` and `set-cookie` are always masked
//! - `location` has skip-listed query parameters masked, or is masked
//!   entirely when it does not parse as a URL
//! - Names in the skip list are masked last, overriding the rules above

use axum::http::HeaderMap;
use std::collections::BTreeMap;

use super::query::redact_query_params;
use super::MASK;

/// Headers whose values are never logged.
const ALWAYS_MASKED: [&str; 3] = ["authorization", "cookie", "set-cookie"];

/// Render `headers` as a name → value map suitable for logging.
///
/// `skip_headers` is matched against the lowercased header name.
pub fn redact_headers(
    headers: &HeaderMap,
    skip_headers: &[String],
    skip_url_params: &[String],
) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for name in headers.keys() {
        let key = name.as_str().to_ascii_lowercase();
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();

        let mut value = match values.as_slice() {
            [] => continue,
            [single] => single.clone(),
            many => format!("[{}]", many.join("], [")),
        };

        if ALWAYS_MASKED.contains(&key.as_str()) {
            value = MASK.to_string();
        }

        if key == "location" {
            // Redirects (OIDC in particular) carry codes and tokens in the query.
            value = redact_query_params(&value, skip_url_params)
                .unwrap_or_else(|| MASK.to_string());
        }

        if skip_headers.iter().any(|skip| *skip == key) {
            value = MASK.to_string();
        }

        fields.insert(key, value);
    }

    fields
}
