//! Query-string expansion.
//!
//! Both entry points parse the caller's URL, reject malformed
//! percent-escapes in the path and any pre-existing query, fold in the new
//! pairs, and re-serialize the query sorted by key so the output is
//! deterministic and the whole operation is idempotent.

use std::collections::HashMap;

use url::form_urlencoded;
use url::Url;

use crate::errors::HttpError;

/// Merges `params` into `url`'s query. Each param key replaces every
/// existing pair with that key.
pub(crate) fn build_url_params(
    url: &str,
    params: &HashMap<String, String>,
) -> Result<Url, HttpError> {
    let parsed = Url::parse(url)?;
    let mut pairs = existing_pairs(&parsed)?;

    pairs.retain(|(key, _)| !params.contains_key(key));
    for (key, value) in params {
        pairs.push((key.clone(), value.clone()));
    }

    Ok(assemble(parsed, pairs))
}

/// Appends pairs derived from a struct-shaped query. `query` must have
/// serialized to a JSON object; scalar fields contribute one pair and
/// array fields repeat the key once per element.
pub(crate) fn build_url_struct(url: &str, query: &serde_json::Value) -> Result<Url, HttpError> {
    let fields = match query {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(HttpError::MalformedQuery(
                "query struct must serialize to an object".to_string(),
            ))
        }
    };

    let parsed = Url::parse(url)?;
    let mut pairs = existing_pairs(&parsed)?;

    for (key, value) in fields {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_text(key, item)?));
                }
            }
            other => pairs.push((key.clone(), scalar_text(key, other)?)),
        }
    }

    Ok(assemble(parsed, pairs))
}

fn scalar_text(key: &str, value: &serde_json::Value) -> Result<String, HttpError> {
    match value {
        serde_json::Value::String(text) => Ok(text.clone()),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(HttpError::MalformedQuery(format!(
            "query struct field `{key}` is not a scalar or an array of scalars"
        ))),
    }
}

fn existing_pairs(parsed: &Url) -> Result<Vec<(String, String)>, HttpError> {
    validate_escapes(parsed.path())?;
    validate_escapes(parsed.query().unwrap_or(""))?;
    Ok(parsed
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect())
}

/// The url crate tolerates a stray `%` in paths and queries; both components
/// have to be well-formed before the query is rewritten.
fn validate_escapes(component: &str) -> Result<(), HttpError> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !valid {
                return Err(HttpError::MalformedQuery(format!(
                    "invalid percent escape in `{component}`"
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn assemble(mut parsed: Url, mut pairs: Vec<(String, String)>) -> Url {
    if pairs.is_empty() {
        parsed.set_query(None);
        return parsed;
    }
    // Stable sort: repeated keys keep their relative value order.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
    let encoded = serializer.finish();
    parsed.set_query(Some(&encoded));
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn params_are_sorted_deterministically() {
        let url = build_url_params("https://www.google.com/", &params(&[("1", "2"), ("3", "4")]))
            .unwrap();
        assert_eq!(url.as_str(), "https://www.google.com/?1=2&3=4");
    }

    #[test]
    fn existing_query_pairs_survive() {
        let url = build_url_params(
            "https://www.google.com/?5=6",
            &params(&[("1", "2"), ("3", "4")]),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://www.google.com/?1=2&3=4&5=6");
    }

    #[test]
    fn params_override_existing_keys() {
        let url =
            build_url_params("http://example.test/?a=old&a=older", &params(&[("a", "new")]))
                .unwrap();
        assert_eq!(url.as_str(), "http://example.test/?a=new");
    }

    #[test]
    fn repeated_existing_keys_not_in_params_are_kept() {
        let url = build_url_params("http://example.test/?b=1&b=2", &params(&[("a", "x")])).unwrap();
        assert_eq!(url.as_str(), "http://example.test/?a=x&b=1&b=2");
    }

    #[test]
    fn building_twice_is_idempotent() {
        let p = params(&[("q", "hello world")]);
        let once = build_url_params("http://example.test/search", &p).unwrap();
        let twice = build_url_params(once.as_str(), &p).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.as_str(), "http://example.test/search?q=hello+world");
    }

    #[test]
    fn struct_arrays_repeat_the_key() {
        let query = serde_json::json!({"a": 1, "b": [2, 3]});
        let url = build_url_struct("http://example.test", &query).unwrap();
        assert_eq!(url.as_str(), "http://example.test/?a=1&b=2&b=3");
    }

    #[test]
    fn struct_pairs_append_to_existing_query() {
        let query = serde_json::json!({"b": "2"});
        let url = build_url_struct("http://example.test/?a=1", &query).unwrap();
        assert_eq!(url.as_str(), "http://example.test/?a=1&b=2");
    }

    #[test]
    fn non_object_struct_is_rejected() {
        let err = build_url_struct("http://example.test", &serde_json::json!(5)).unwrap_err();
        assert!(matches!(err, HttpError::MalformedQuery(_)));
    }

    #[test]
    fn nested_struct_values_are_rejected() {
        let query = serde_json::json!({"a": {"nested": true}});
        let err = build_url_struct("http://example.test", &query).unwrap_err();
        assert!(matches!(err, HttpError::MalformedQuery(_)));
    }

    #[test]
    fn malformed_percent_escape_is_rejected() {
        let err = build_url_params("http://example.test/?Goodbye=%zzz", &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, HttpError::MalformedQuery(_)));
    }

    #[test]
    fn malformed_escape_in_the_path_is_rejected() {
        let err = build_url_params("http://example.test/%zz/x", &HashMap::new()).unwrap_err();
        assert!(matches!(err, HttpError::MalformedQuery(_)));

        let query = serde_json::json!({"a": 1});
        let err = build_url_struct("http://example.test/%4", &query).unwrap_err();
        assert!(matches!(err, HttpError::MalformedQuery(_)));
    }

    #[test]
    fn valid_path_escapes_pass_through() {
        let url = build_url_params("http://example.test/a%20b", &params(&[("q", "1")])).unwrap();
        assert_eq!(url.as_str(), "http://example.test/a%20b?q=1");
    }

    #[test]
    fn relative_url_without_base_fails_to_parse() {
        let err = build_url_params("%../dir/", &HashMap::new()).unwrap_err();
        assert!(matches!(err, HttpError::UrlParse(_)));
    }

    #[test]
    fn no_pairs_leaves_the_url_without_a_query() {
        let url = build_url_params("http://example.test/path", &HashMap::new()).unwrap();
        assert_eq!(url.as_str(), "http://example.test/path");
    }
}
