//! Normalized request signatures used as cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use url::{form_urlencoded, Url};

use crate::FetchError;

/// Parameter names that carry credentials. They are sent upstream but never
/// become part of a cache key.
pub const CREDENTIAL_PARAMS: &[&str] = &["token", "apikey", "api_key", "key"];

fn is_credential(name: &str) -> bool {
    CREDENTIAL_PARAMS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(name))
}

/// Method, URL and canonicalized parameters of an outbound request.
///
/// Two logically identical requests produce the same signature regardless of
/// parameter order, JSON key order or URL casing of scheme and host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub method: String,
    /// URL without query string or fragment
    pub url: String,
    /// Query parameters, sorted; credentials removed
    pub params: BTreeMap<String, Vec<String>>,
    /// Canonical JSON body text
    pub body: Option<String>,
}

impl RequestSignature {
    /// Signature for a GET. Parameters already in the URL's query string are
    /// merged with `params`.
    pub fn get<K, V>(url: &str, params: &[(K, V)]) -> Result<Self, FetchError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::build("GET", url, params, None)
    }

    /// Signature for a POST with a JSON body.
    pub fn post_json(url: &str, body: &Value) -> Result<Self, FetchError> {
        Self::build::<&str, &str>("POST", url, &[], Some(body))
    }

    fn build<K, V>(method: &str, url: &str, params: &[(K, V)], body: Option<&Value>) -> Result<Self, FetchError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let query_pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let extra = params
            .iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()));
        for (k, v) in query_pairs.into_iter().chain(extra) {
            if !is_credential(&k) {
                map.entry(k).or_default().push(v);
            }
        }
        for values in map.values_mut() {
            values.sort();
        }

        parsed.set_query(None);
        parsed.set_fragment(None);

        Ok(Self {
            method: method.to_ascii_uppercase(),
            url: parsed.to_string(),
            params: map,
            body: body.map(|b| canonical_json(b).to_string()),
        })
    }

    /// Stable text form hashed into the key. Keys and values are
    /// form-encoded so `&` and `=` inside a value cannot forge a parameter.
    pub fn canonical(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(
                self.params
                    .iter()
                    .flat_map(|(k, vs)| vs.iter().map(move |v| (k, v))),
            )
            .finish();
        let mut text = format!("{} {}?{}", self.method, self.url, query);
        if let Some(body) = &self.body {
            text.push('\n');
            text.push_str(body);
        }
        text
    }

    /// Hex SHA-256 of the canonical form.
    pub fn key(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Copy of a JSON value with object keys sorted at every level and
/// credential fields removed.
fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().filter(|k| !is_credential(k)).collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonical_json(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_order_does_not_matter() {
        let a = RequestSignature::get("https://gis.example.com/query", &[("f", "json"), ("where", "1=1")]).unwrap();
        let b = RequestSignature::get("https://GIS.example.com/query?where=1%3D1", &[("f", "json")]).unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_different_values_differ() {
        let a = RequestSignature::get("https://gis.example.com/query", &[("f", "json")]).unwrap();
        let b = RequestSignature::get("https://gis.example.com/query", &[("f", "geojson")]).unwrap();
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_separators_inside_values_do_not_collide() {
        let one = RequestSignature::get("https://x.example/q", &[("a", "1&b=2")]).unwrap();
        let two = RequestSignature::get("https://x.example/q", &[("a", "1"), ("b", "2")]).unwrap();
        assert_ne!(one.canonical(), two.canonical());
        assert_ne!(one.key(), two.key());

        let address = RequestSignature::get(
            "https://gis.example.com/query",
            &[("where", "SITE_ADDR = 'A & B ST'")],
        )
        .unwrap();
        assert!(address.canonical().ends_with("?where=SITE_ADDR+%3D+%27A+%26+B+ST%27"));
    }

    #[test]
    fn test_credentials_are_not_keyed() {
        let a = RequestSignature::get("https://gis.example.com/q", &[("token", "abc"), ("f", "json")]).unwrap();
        let b = RequestSignature::get("https://gis.example.com/q?TOKEN=zzz", &[("f", "json")]).unwrap();
        assert_eq!(a.key(), b.key());
        assert!(!a.canonical().contains("abc"));
    }

    #[test]
    fn test_json_body_is_canonical() {
        let a = RequestSignature::post_json("https://api.example.com/geocode", &json!({"address": "1 Main", "limit": 1})).unwrap();
        let b = RequestSignature::post_json("https://api.example.com/geocode", &json!({"limit": 1, "address": "1 Main"})).unwrap();
        assert_eq!(a.key(), b.key());

        let get = RequestSignature::get("https://api.example.com/geocode", &[("address", "1 Main")]).unwrap();
        assert_ne!(a.key(), get.key());
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = RequestSignature::get("https://a.example/", &[("x", "1")]).unwrap().key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_invalid_url() {
        let params: [(&str, &str); 0] = [];
        assert!(matches!(
            RequestSignature::get("not a url", &params),
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
