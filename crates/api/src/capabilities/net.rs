//! `net.fetch`: synchronous (from the script's view) outbound HTTP.

use std::sync::Arc;
use std::time::Duration;

use rhai::Dynamic;
use taskforge_core::script::host::{arg_map, arg_to_string, HostFunc};
use taskforge_core::CoreError;
use tokio::runtime::Handle;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: i64 = 30;

struct RequestOptions {
    method: String,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Body>,
    timeout: Duration,
}

enum Body {
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

fn string_pairs(options: &rhai::Map, key: &str) -> Vec<(String, String)> {
    options
        .get(key)
        .and_then(|value| value.clone().try_cast::<rhai::Map>())
        .map(|map| {
            map.into_iter()
                .map(|(name, value)| (name.to_string(), arg_to_string(&value)))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_options(options: Option<rhai::Map>) -> RequestOptions {
    let mut parsed = RequestOptions {
        method: "GET".to_string(),
        params: Vec::new(),
        headers: Vec::new(),
        body: None,
        timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64),
    };
    let Some(options) = options else {
        return parsed;
    };

    if let Some(method) = options.get("method") {
        if !method.is_unit() {
            parsed.method = arg_to_string(method);
        }
    }
    parsed.params = string_pairs(&options, "params");
    parsed.headers = string_pairs(&options, "headers");

    if let Some(body) = options.get("body") {
        if body.is_string() {
            parsed.body = Some(Body::Text(arg_to_string(body)));
        } else if let Some(blob) = body.clone().try_cast::<rhai::Blob>() {
            parsed.body = Some(Body::Bytes(blob));
        } else if !body.is_unit() {
            if let Ok(json) = rhai::serde::from_dynamic::<serde_json::Value>(body) {
                parsed.body = Some(Body::Json(json));
            }
        }
    }

    if let Some(timeout) = options.get("timeout") {
        let seconds = timeout.as_int().unwrap_or(DEFAULT_TIMEOUT_SECS);
        // Non-positive timeouts coerce to the default.
        let seconds = if seconds <= 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            seconds
        };
        parsed.timeout = Duration::from_secs(seconds as u64);
    }

    parsed
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
}

/// Shape an outcome into the `{status, headers, data, error, json?}` object
/// scripts receive.
fn response_map(
    status: i64,
    headers: Vec<(String, String)>,
    data: String,
    error: Option<String>,
) -> Dynamic {
    let content_type = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    let mut header_map = rhai::Map::new();
    for (key, value) in headers {
        header_map.insert(key.into(), Dynamic::from(value));
    }

    let mut map = rhai::Map::new();
    map.insert("status".into(), Dynamic::from(status));
    map.insert("headers".into(), Dynamic::from_map(header_map));
    map.insert(
        "error".into(),
        error.map(Dynamic::from).unwrap_or(Dynamic::UNIT),
    );

    // `json` is populated only for JSON content types that actually parse.
    if content_type == "application/json" || content_type == "application/json; charset=utf-8" {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&data) {
            if let Ok(dynamic) = rhai::serde::to_dynamic(&json) {
                map.insert("json".into(), dynamic);
            }
        }
    }
    map.insert("data".into(), Dynamic::from(data));

    Dynamic::from_map(map)
}

/// `net.fetch(url, {method, params, headers, body, timeout})`.
///
/// Transport failures are reported inside the response object (`status` 0,
/// `error` set) rather than thrown, so scripts can inspect them.
pub fn fetch(http: reqwest::Client, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        if args.is_empty() {
            return Err(CoreError::InvalidArgument(
                "net.fetch requires at least a URL argument".to_string(),
            ));
        }
        let url = arg_to_string(args[0]);
        let options = parse_options(arg_map(args, 1));

        let mut request = if options.method.eq_ignore_ascii_case("POST") {
            let mut request = http.post(&url);
            match &options.body {
                Some(Body::Text(text)) => {
                    request = request.body(text.clone());
                    if !has_header(&options.headers, "content-type") {
                        request = request.header("Content-Type", "text/plain");
                    }
                }
                Some(Body::Bytes(bytes)) => {
                    request = request.body(bytes.clone());
                    if !has_header(&options.headers, "content-type") {
                        request = request.header("Content-Type", "application/octet-stream");
                    }
                }
                Some(Body::Json(json)) => {
                    request = request.body(serde_json::to_vec(json).unwrap_or_default());
                    if !has_header(&options.headers, "content-type") {
                        request = request.header("Content-Type", "application/json");
                    }
                }
                None => {}
            }
            request
        } else {
            http.get(&url).query(&options.params)
        };

        for (key, value) in &options.headers {
            request = request.header(key, value);
        }
        request = request.timeout(options.timeout);

        let outcome = handle.block_on(async {
            let response = request.send().await?;
            let status = response.status().as_u16() as i64;
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            let data = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, data))
        });

        match outcome {
            Ok((status, headers, data)) => Ok(response_map(status, headers, data, None)),
            Err(err) => Ok(response_map(
                0,
                Vec::new(),
                String::new(),
                Some(err.to_string()),
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_get_with_default_timeout() {
        let parsed = parse_options(None);
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.timeout, Duration::from_secs(30));
        assert!(parsed.params.is_empty());
        assert!(parsed.body.is_none());
    }

    #[test]
    fn non_positive_timeout_coerces_to_default() {
        let mut options = rhai::Map::new();
        options.insert("method".into(), Dynamic::from("POST"));
        options.insert("timeout".into(), Dynamic::from(-5_i64));
        let parsed = parse_options(Some(options));
        assert_eq!(parsed.method, "POST");
        assert_eq!(parsed.timeout, Duration::from_secs(30));

        let mut options = rhai::Map::new();
        options.insert("timeout".into(), Dynamic::from(7_i64));
        let parsed = parse_options(Some(options));
        assert_eq!(parsed.timeout, Duration::from_secs(7));
    }

    #[test]
    fn params_and_headers_are_stringified() {
        let mut params = rhai::Map::new();
        params.insert("page".into(), Dynamic::from(2_i64));
        let mut options = rhai::Map::new();
        options.insert("params".into(), Dynamic::from_map(params));

        let parsed = parse_options(Some(options));
        assert_eq!(parsed.params, vec![("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn json_field_requires_json_content_type() {
        let with_json = response_map(
            200,
            vec![("content-type".to_string(), "application/json".to_string())],
            r#"{"a":1}"#.to_string(),
            None,
        );
        let value = rhai::serde::from_dynamic::<serde_json::Value>(&with_json).unwrap();
        assert_eq!(value["status"], serde_json::json!(200));
        assert_eq!(value["json"]["a"], serde_json::json!(1));

        let plain = response_map(
            200,
            vec![("content-type".to_string(), "text/html".to_string())],
            r#"{"a":1}"#.to_string(),
            None,
        );
        let value = rhai::serde::from_dynamic::<serde_json::Value>(&plain).unwrap();
        assert!(value.get("json").is_none());
        assert_eq!(value["data"], serde_json::json!(r#"{"a":1}"#));
    }

    #[test]
    fn transport_failure_shape() {
        let failed = response_map(0, Vec::new(), String::new(), Some("refused".to_string()));
        let value = rhai::serde::from_dynamic::<serde_json::Value>(&failed).unwrap();
        assert_eq!(value["status"], serde_json::json!(0));
        assert_eq!(value["error"], serde_json::json!("refused"));
    }
}
