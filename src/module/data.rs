//! Work items carried between pipeline stages.

use crate::error::Result;
use bytes::{Buf, Bytes};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

/// A crawl request and the depth at which it was discovered.
#[derive(Debug, Clone)]
pub struct Request {
    url: Url,
    method: Method,
    headers: HeaderMap,
    depth: u32,
}

impl Request {
    /// A `GET` request for `url`.
    pub fn new(url: Url, depth: u32) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            depth,
        }
    }

    /// Parses `url` and builds a `GET` request for it.
    pub fn parse(url: &str, depth: u32) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?, depth))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// A request for `url` one level deeper than this one.
    pub fn child(&self, url: Url) -> Self {
        Self::new(url, self.depth.saturating_add(1))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }
}

/// A fetched response.
///
/// The body is held in memory once; every call to [`reader`](Response::reader)
/// yields an independent reader over it, so several parsers can consume the
/// same body.
#[derive(Debug, Clone)]
pub struct Response {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    depth: u32,
}

impl Response {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes, depth: u32) -> Self {
        Self {
            url,
            status,
            headers,
            body,
            depth,
        }
    }

    /// A `200 OK` response to `request` with the given body.
    pub fn for_request(request: &Request, body: impl Into<Bytes>) -> Self {
        Self::new(
            request.url().clone(),
            StatusCode::OK,
            HeaderMap::new(),
            body.into(),
            request.depth(),
        )
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// A fresh reader positioned at the start of the body.
    pub fn reader(&self) -> bytes::buf::Reader<Bytes> {
        self.body.clone().reader()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// A request for `url` one level deeper than this response.
    pub fn follow(&self, url: Url) -> Request {
        Request::new(url, self.depth.saturating_add(1))
    }
}

/// Ordered key/value record produced by extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Item {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A value produced by an extractor.
#[derive(Debug, Clone)]
pub enum Data {
    /// A follow-up request to feed back through admission control.
    Request(Request),
    /// A record for the processors.
    Item(Item),
}

impl From<Request> for Data {
    fn from(request: Request) -> Self {
        Data::Request(request)
    }
}

impl From<Item> for Data {
    fn from(item: Item) -> Self {
        Data::Item(item)
    }
}
