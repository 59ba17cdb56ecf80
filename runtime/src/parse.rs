//! Built-in body parsers, selected by MIME type.
//!
//! Explicit `parse` hooks run first; these built-ins are the fallback. An
//! unrecognized content type with a non-empty body is a PARSE failure —
//! that decision lives in the pipeline, this module only classifies.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use weave_core::error::Failure;

/// Outcome of built-in parser selection.
#[derive(Debug)]
pub(crate) enum Builtin {
    /// A recognized type that produced a value.
    Parsed(Value),
    /// A recognized type whose payload stays as raw bytes
    /// (`application/octet-stream`).
    Raw,
    /// Nothing recognized the content type.
    Unknown,
}

/// Run the built-in parser for the given content type.
pub(crate) fn builtin_parse(content_type: &str, body: &Bytes) -> Result<Builtin, Failure> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/json" => serde_json::from_slice(body)
            .map(Builtin::Parsed)
            .map_err(|e| Failure::parse(format!("malformed JSON body: {e}"))),
        "application/x-www-form-urlencoded" => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
                .map_err(|e| Failure::parse(format!("malformed form body: {e}")))?;
            let mut object = Map::new();
            for (key, value) in pairs {
                object.insert(key, Value::String(value));
            }
            Ok(Builtin::Parsed(Value::Object(object)))
        }
        "application/octet-stream" => Ok(Builtin::Raw),
        _ if essence.starts_with("text/") => String::from_utf8(body.to_vec())
            .map(|text| Builtin::Parsed(Value::String(text)))
            .map_err(|_| Failure::parse("text body is not valid UTF-8")),
        _ => Ok(Builtin::Unknown),
    }
}

/// Parse a query string into a map. Malformed input degrades to an empty
/// map rather than failing the request.
pub(crate) fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let Some(query) = query else {
        return HashMap::new();
    };
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_bodies_parse() {
        let body = Bytes::from_static(br#"{"name":"ada"}"#);
        let Builtin::Parsed(value) = builtin_parse("application/json; charset=utf-8", &body).unwrap()
        else {
            panic!("expected a parsed value");
        };
        assert_eq!(value, json!({"name": "ada"}));
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let body = Bytes::from_static(b"{not json");
        let failure = builtin_parse("application/json", &body).unwrap_err();
        assert_eq!(failure.code, weave_core::ErrorCode::Parse);
    }

    #[test]
    fn form_bodies_become_string_objects() {
        let body = Bytes::from_static(b"name=ada&role=admin");
        let Builtin::Parsed(value) =
            builtin_parse("application/x-www-form-urlencoded", &body).unwrap()
        else {
            panic!("expected a parsed value");
        };
        assert_eq!(value, json!({"name": "ada", "role": "admin"}));
    }

    #[test]
    fn text_bodies_pass_through() {
        let body = Bytes::from_static(b"hello");
        let Builtin::Parsed(value) = builtin_parse("text/plain", &body).unwrap() else {
            panic!("expected a parsed value");
        };
        assert_eq!(value, Value::String("hello".into()));
    }

    #[test]
    fn octet_stream_is_recognized_but_raw() {
        let body = Bytes::from_static(&[0xde, 0xad]);
        assert!(matches!(
            builtin_parse("application/octet-stream", &body).unwrap(),
            Builtin::Raw
        ));
    }

    #[test]
    fn unknown_types_are_flagged() {
        let body = Bytes::from_static(b"<xml/>");
        assert!(matches!(
            builtin_parse("application/xml", &body).unwrap(),
            Builtin::Unknown
        ));
    }

    #[test]
    fn query_strings_decode() {
        let query = parse_query(Some("name=ada%20l&x=1"));
        assert_eq!(query.get("name").map(String::as_str), Some("ada l"));
        assert_eq!(query.get("x").map(String::as_str), Some("1"));
        assert!(parse_query(None).is_empty());
    }
}
