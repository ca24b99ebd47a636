//! The immutable per-request value.
//!
//! Built once per connection after routing resolves, read-only afterwards,
//! and discarded when the response has been written. Query parameters keep
//! every occurrence of a key (repeated keys are meaningful to the binder);
//! header keys are lowercase with last-write-wins semantics.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::constants::headers;
use super::transport::RequestHead;

/// A fully parsed HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: String,
    path: String,
    raw_query: String,
    query: Vec<(String, String)>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    path_params: HashMap<String, String>,
    body: Vec<u8>,
    client: Option<SocketAddr>,
}

impl HttpRequest {
    /// Assemble a request from the parsed head, the path parameters captured
    /// by the router, and the fully read body.
    pub fn new(head: &RequestHead, path_params: HashMap<String, String>, body: Vec<u8>) -> Self {
        let mut headers = HashMap::new();
        for (name, value) in &head.headers {
            headers.insert(name.clone(), value.clone());
        }

        let cookies = parse_cookies(headers.get(headers::COOKIE).map(String::as_str));
        let query = parse_query(&head.raw_query);

        Self {
            method: head.method.to_ascii_uppercase(),
            path: head.path.clone(),
            raw_query: head.raw_query.clone(),
            query,
            headers,
            cookies,
            path_params,
            body,
            client: head.client,
        }
    }

    /// Uppercase HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Undecoded query string (no leading `?`).
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Whether the query string carries the given key at all.
    pub fn has_query(&self, name: &str) -> bool {
        self.query.iter().any(|(k, _)| k == name)
    }

    /// Every value for a query key, in order of appearance.
    pub fn query_all(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for a query key.
    pub fn query_first(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// All headers (lowercase keys).
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Cookie value parsed from the Cookie header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Path parameter captured by the router.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// All path parameters.
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Remote peer address, if known.
    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Client IP as a string, `"unknown"` when the peer address is missing.
    /// This is the key used by the security middleware state.
    pub fn client_ip(&self) -> String {
        match self.client {
            Some(addr) => addr.ip().to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Parse a raw query string into ordered (key, value) pairs.
///
/// Keys and values are percent-decoded; `+` decodes to a space. A key with no
/// `=` becomes a key with an empty value.
pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    if raw.is_empty() {
        return Vec::new();
    }

    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = url_decode(parts.next().unwrap_or(""));
            let value = url_decode(parts.next().unwrap_or(""));
            (key, value)
        })
        .collect()
}

/// Parse the Cookie header into a name -> value map.
pub fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    header
        .map(|raw| {
            raw.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim();
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn url_decode(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}
