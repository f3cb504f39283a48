//! # Request Signatures
//!
//! Derives the stable identity key every other component uses to recognize
//! "the same logical operation". Two requests share a signature when they target
//! the same service and their method, normalized path and canonicalized body
//! agree. Object key order, whitespace and query-parameter order never matter.

use crate::constants::system::DEFAULT_SERVICE;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Request method of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Safe reads whose single outcome may be shared between callers
    pub fn is_shareable(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported request method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for Method {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

/// Description of one remote call, used only to derive its signature and to
/// pick the circuit breaker of the target service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Remote service endpoint name; selects the circuit breaker
    pub service: String,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Explicit override of whether the outcome may be shared between callers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareable: Option<bool>,
}

impl RequestDescriptor {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            method,
            path: path.into(),
            body: None,
            shareable: None,
        }
    }

    pub fn get<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post<P: Into<String>>(path: P, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put<P: Into<String>>(path: P, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn patch<P: Into<String>>(path: P, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a body given as JSON text; formatting of the text is irrelevant
    pub fn with_raw_body(self, body: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        Ok(self.with_body(value))
    }

    pub fn for_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = service.into();
        self
    }

    /// Declare whether the outcome may be shared; defaults to the method's safety
    pub fn shareable(mut self, shareable: bool) -> Self {
        self.shareable = Some(shareable);
        self
    }

    pub fn is_shareable(&self) -> bool {
        self.shareable.unwrap_or_else(|| self.method.is_shareable())
    }

    pub fn signature(&self) -> RequestSignature {
        RequestSignature::build(&self.service, self.method, &self.path, self.body.as_ref())
    }
}

/// Identity key of a logical operation, scoped to the target service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestSignature {
    service: String,
    method: Method,
    path: String,
    body_hash: String,
}

impl RequestSignature {
    pub fn build(service: &str, method: Method, path: &str, body: Option<&Value>) -> Self {
        let body_hash = body
            .map(|value| hash_canonical(&canonicalize(value)))
            .unwrap_or_default();

        Self {
            service: service.to_string(),
            method,
            path: normalize_path(path),
            body_hash,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Hex hash of the canonical body; empty when the request has no body
    pub fn body_hash(&self) -> &str {
        &self.body_hash
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}@{}",
            self.method, self.path, self.body_hash, self.service
        )
    }
}

/// Normalize a request path: surrounding whitespace and trailing slashes are
/// dropped (the root stays `/`) and query parameters are sorted by key.
/// Values of a repeated key keep their relative order.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let (base, query) = match trimmed.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (trimmed, None),
    };

    let mut base = base.trim_end_matches('/').to_string();
    if base.is_empty() {
        base.push('/');
    }

    let mut params: Vec<&str> = query
        .map(|q| q.split('&').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    if params.is_empty() {
        return base;
    }
    params.sort_by_key(|param| param.split_once('=').map_or(*param, |(key, _)| key));

    format!("{}?{}", base, params.join("&"))
}

/// Canonical JSON text: object keys sorted at every depth, no insignificant
/// whitespace and one spelling per number (`100`, `100.0` and `1e2` agree).
/// Structurally equal values always yield identical text.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, out);
                }
            }
            out.push('}');
        }
        Value::Number(number) => write_number(number, out),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_number(number: &Number, out: &mut String) {
    if let Some(int) = number.as_i64() {
        out.push_str(&int.to_string());
    } else if let Some(uint) = number.as_u64() {
        out.push_str(&uint.to_string());
    } else if let Some(float) = number.as_f64() {
        // f64 Display is the shortest round-trip form and prints integral values without a fraction
        if float == 0.0 {
            out.push('0');
        } else {
            out.push_str(&float.to_string());
        }
    }
}

fn hash_canonical(canonical: &str) -> String {
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalization_ignores_key_order() {
        let a = json!({"pipeline_id": 7, "filters": {"stage": "new", "owner": "ana"}});
        let b = json!({"filters": {"owner": "ana", "stage": "new"}, "pipeline_id": 7});

        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(
            canonicalize(&a),
            r#"{"filters":{"owner":"ana","stage":"new"},"pipeline_id":7}"#
        );
    }

    #[test]
    fn test_raw_body_whitespace_is_irrelevant() {
        let compact = RequestDescriptor::new(Method::Post, "/leads")
            .with_raw_body(r#"{"a":1,"b":[1,2]}"#)
            .unwrap();
        let spaced = RequestDescriptor::new(Method::Post, "/leads")
            .with_raw_body("{\n  \"b\": [1, 2],\n  \"a\": 1\n}")
            .unwrap();

        assert_eq!(compact.signature(), spaced.signature());
    }

    #[test]
    fn test_array_order_matters() {
        let a = RequestSignature::build("api", Method::Post, "/x", Some(&json!([1, 2])));
        let b = RequestSignature::build("api", Method::Post, "/x", Some(&json!([2, 1])));
        assert_ne!(a, b);
    }

    #[test]
    fn test_signature_components() {
        let get = RequestDescriptor::get("/api/leads/");
        let sig = get.signature();
        assert_eq!(sig.method(), Method::Get);
        assert_eq!(sig.path(), "/api/leads");
        assert_eq!(sig.body_hash(), "");
        assert_eq!(sig.service(), "default");
        assert_eq!(sig.to_string(), "GET:/api/leads:@default");

        let post = RequestDescriptor::post("/api/leads", json!({"name": "x"})).signature();
        assert_eq!(post.body_hash().len(), 16);
        assert_ne!(post, RequestDescriptor::put("/api/leads", json!({"name": "x"})).signature());
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("  /a/b//  "), "/a/b");
        assert_eq!(normalize_path("/a?z=1&b=2"), "/a?b=2&z=1");
        assert_eq!(normalize_path("/a/?"), "/a");
        assert_eq!(
            RequestDescriptor::get("/a?y=2&x=1").signature(),
            RequestDescriptor::get("/a/?x=1&y=2").signature()
        );
    }

    #[test]
    fn test_method_parsing_and_shareability() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(" Delete ".parse::<Method>().unwrap(), Method::Delete);
        assert!("TRACE".parse::<Method>().is_err());

        assert!(RequestDescriptor::get("/x").is_shareable());
        assert!(!RequestDescriptor::post("/x", json!({})).is_shareable());
        assert!(RequestDescriptor::post("/search", json!({}))
            .shareable(true)
            .is_shareable());
        assert!(!RequestDescriptor::get("/x").shareable(false).is_shareable());
    }

    #[test]
    fn test_signature_is_scoped_by_service() {
        let a = RequestDescriptor::get("/health").for_service("backend");
        let b = RequestDescriptor::get("/health").for_service("datastore");
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.signature().to_string(), "GET:/health:@backend");
    }

    #[test]
    fn test_number_spelling_is_irrelevant() {
        let plain = RequestDescriptor::new(Method::Post, "/leads")
            .with_raw_body(r#"{"limit":100,"ratio":1.5}"#)
            .unwrap();
        let exponent = RequestDescriptor::new(Method::Post, "/leads")
            .with_raw_body(r#"{"limit":1e2,"ratio":15e-1}"#)
            .unwrap();
        let fraction = RequestDescriptor::new(Method::Post, "/leads")
            .with_raw_body(r#"{"limit":100.0,"ratio":1.50}"#)
            .unwrap();

        assert_eq!(plain.signature(), exponent.signature());
        assert_eq!(plain.signature(), fraction.signature());
        assert_eq!(canonicalize(&json!([-0.0, 0, 2.5e1])), "[0,0,25]");
        assert_ne!(
            canonicalize(&json!({ "limit": 100 })),
            canonicalize(&json!({ "limit": 100.5 }))
        );
    }

    #[test]
    fn test_repeated_query_keys_keep_value_order() {
        assert_eq!(normalize_path("/a?id=2&b=1&id=1"), "/a?b=1&id=2&id=1");
        assert_ne!(
            RequestDescriptor::get("/a?id=1&id=2").signature(),
            RequestDescriptor::get("/a?id=2&id=1").signature()
        );
        assert_eq!(
            RequestDescriptor::get("/a?id=1&b=0&id=2").signature(),
            RequestDescriptor::get("/a?b=0&id=1&id=2").signature()
        );
    }
}
