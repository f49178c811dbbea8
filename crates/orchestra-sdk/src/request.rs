// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbound request construction with replayable bodies.
//!
//! An [`ApiRequest`] is a description of a call, not a live HTTP request: the
//! dispatcher turns it into a `reqwest::Request` for every attempt, so a
//! retry resubmits exactly the same method, headers and body bytes.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client as HttpClient, Method};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::sync::Mutex;
use url::Url;

use crate::error::{Result, SdkError};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

/// A body source that can be read and rewound.
pub trait SeekableSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableSource for T {}

/// Body of an [`ApiRequest`].
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// In-memory bytes; sent with an explicit `Content-Length`.
    Buffered(Bytes),
    /// `multipart/form-data` parts; the boundary header is set per attempt.
    Multipart(MultipartBody),
    /// A seekable source streamed without a known length.
    Reader(ReaderBody),
}

/// A seekable body source shared by every attempt of a request.
///
/// The source is dropped (closing files and other handles) by
/// [`ReaderBody::close`], which the dispatcher calls once the final response
/// has been consumed.
#[derive(Clone)]
pub struct ReaderBody {
    source: Arc<Mutex<Option<Box<dyn SeekableSource>>>>,
}

impl fmt::Debug for ReaderBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderBody").finish_non_exhaustive()
    }
}

impl ReaderBody {
    pub fn new<R: SeekableSource + 'static>(source: R) -> Self {
        Self {
            source: Arc::new(Mutex::new(Some(Box::new(source)))),
        }
    }

    /// Seek back to the start so the next attempt sends the full body.
    pub async fn rewind(&self) -> Result<()> {
        if let Some(source) = self.source.lock().await.as_mut() {
            source.seek(SeekFrom::Start(0)).await?;
        }
        Ok(())
    }

    /// Drop the underlying source. Further reads fail.
    pub async fn close(&self) {
        self.source.lock().await.take();
    }

    pub async fn is_closed(&self) -> bool {
        self.source.lock().await.is_none()
    }

    /// True when both bodies share one source.
    pub fn same_source(&self, other: &ReaderBody) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }

    /// Read everything from the current position to the end.
    async fn read_remaining(&self) -> Result<Bytes> {
        let mut guard = self.source.lock().await;
        let source = guard.as_mut().ok_or_else(|| {
            SdkError::Io(std::io::Error::other("request body already closed"))
        })?;
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// A replayable `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone)]
struct MultipartPart {
    name: String,
    file_name: Option<String>,
    mime: Option<String>,
    content: Bytes,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            file_name: None,
            mime: None,
            content: Bytes::from(value.into()),
        });
        self
    }

    /// Add a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            file_name: Some(file_name.into()),
            mime: Some("application/octet-stream".to_string()),
            content: content.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            let mut field = Part::bytes(part.content.to_vec());
            if let Some(file_name) = &part.file_name {
                field = field.file_name(file_name.clone());
            }
            if let Some(mime) = &part.mime {
                field = field
                    .mime_str(mime)
                    .map_err(|e| SdkError::Config(format!("invalid mime type {}: {}", mime, e)))?;
            }
            form = form.part(part.name.clone(), field);
        }
        Ok(form)
    }
}

/// Description of one API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
}

impl ApiRequest {
    /// Create a request for `path`, relative to the client's base URL.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers,
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Use the JSON encoding of `value` as the body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = RequestBody::Buffered(Bytes::from(serde_json::to_vec(value)?));
        Ok(self)
    }

    /// Use a URL-encoded form as the body.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM));
        self.body = RequestBody::Buffered(Bytes::from(encoded));
        self
    }

    /// Set the body. A multipart body drops the default content type, since
    /// the boundary header is generated when the request is built.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        if matches!(body, RequestBody::Multipart(_)) {
            self.headers.remove(CONTENT_TYPE);
        }
        self.body = body;
        self
    }

    /// Set (or override) a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Rewind a reader body; other bodies are replayed from memory.
    pub async fn rewind(&self) -> Result<()> {
        match &self.body {
            RequestBody::Reader(reader) => reader.rewind().await,
            _ => Ok(()),
        }
    }

    /// Close a reader body. No-op for other bodies.
    pub async fn close_body(&self) {
        if let RequestBody::Reader(reader) = &self.body {
            reader.close().await;
        }
    }

    /// True when both requests stream from the same reader source.
    pub(crate) fn shares_body_with(&self, other: &ApiRequest) -> bool {
        match (&self.body, &other.body) {
            (RequestBody::Reader(a), RequestBody::Reader(b)) => a.same_source(b),
            _ => false,
        }
    }

    /// Absolute URL of this request under `base_url`.
    pub fn url(&self, base_url: &Url) -> Url {
        let mut url = base_url.clone();
        let path = format!(
            "{}/{}",
            base_url.path().trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        url
    }

    /// Build the HTTP request for one attempt.
    pub(crate) async fn build(&self, http: &HttpClient, base_url: &Url) -> Result<reqwest::Request> {
        let builder = http
            .request(self.method.clone(), self.url(base_url))
            .headers(self.headers.clone());

        let builder = match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Buffered(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(multipart) => builder.multipart(multipart.to_form()?),
            RequestBody::Reader(reader) => {
                let content = reader.read_remaining().await?;
                let stream = futures::stream::iter([Ok::<_, std::io::Error>(content)]);
                builder.body(Body::wrap_stream(stream))
            }
        };

        Ok(builder.build()?)
    }
}
