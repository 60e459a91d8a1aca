use crate::codec::Codec;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{HttpResponse, RawBody, ResponseBody};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Body payload for the request builder.
///
/// Closed set of shapes the client knows how to send. Streams are drained
/// into memory before dispatch so the body can be compressed and replayed
/// across redirect hops.
enum BodyKind {
    /// Empty body
    Empty,
    /// UTF-8 text body
    Text(String),
    /// Raw bytes body
    Bytes(Bytes),
    /// Streaming body, collected at send time
    Stream(ByteStream),
    /// JSON-serialized body (stored as bytes after serialization)
    Json(Bytes),
    /// Form URL-encoded body (stored as bytes after serialization)
    Form(Bytes),
}

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::get`], [`HttpClient::post`], etc.
/// Supports chaining headers, query parameters, body, compression and
/// redirect/timeout settings before sending with
/// [`send()`](RequestBuilder::send).
///
/// # Example
///
/// ```ignore
/// use courier_http::{Codec, HttpClient};
///
/// let client = HttpClient::builder().build()?;
///
/// // Simple GET with query parameters
/// let resp = client
///     .get("https://api.example.com/users")
///     .query(&[("page", "1"), ("limit", "10")])
///     .send()
///     .await?;
///
/// // POST with a compressed JSON body and a deadline
/// let resp = client
///     .post("https://api.example.com/users")
///     .codec(Codec::Gzip)
///     .timeout(std::time::Duration::from_secs(5))
///     .json(&NewUser { name: "Alice" })?
///     .send()
///     .await?;
/// ```
///
/// [`HttpClient::get`]: crate::HttpClient::get
/// [`HttpClient::post`]: crate::HttpClient::post
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: crate::HttpClient,
    method: Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    /// Pre-encoded query fragments, joined with '&' at send time
    query: Vec<String>,
    body: BodyKind,
    codec: Option<Codec>,
    content_type: Option<HeaderValue>,
    accept: Option<HeaderValue>,
    host: Option<HeaderValue>,
    user_agent: Option<HeaderValue>,
    basic_auth: Option<(String, String)>,
    timeout: Option<Duration>,
    max_redirects: Option<usize>,
    forward_redirect_headers: Option<bool>,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    /// Create a new request builder (internal use only)
    pub(crate) fn new(client: crate::HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            body: BodyKind::Empty,
            codec: None,
            content_type: None,
            accept: None,
            host: None,
            user_agent: None,
            basic_auth: None,
            timeout: None,
            max_redirects: None,
            forward_redirect_headers: None,
            error: None,
        }
    }

    fn defer(&mut self, err: HttpError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn header_value(&mut self, value: &str) -> Option<HeaderValue> {
        match HeaderValue::try_from(value) {
            Ok(v) => Some(v),
            Err(e) => {
                self.defer(HttpError::InvalidHeaderValue(e));
                None
            }
        }
    }

    /// Add a single header to the request
    ///
    /// Headers are additive: adding the same name twice sends both values.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.push((name, value));
            }
            (Err(e), _) => {
                self.error = Some(HttpError::InvalidHeaderName(e));
            }
            (_, Err(e)) => {
                self.error = Some(HttpError::InvalidHeaderValue(e));
            }
        }
        self
    }

    /// Add multiple headers to the request
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        for (name, value) in headers {
            self = self.header(&name, &value);
        }
        self
    }

    /// Set the Content-Type header
    ///
    /// Takes precedence over the defaults implied by [`json()`](Self::json)
    /// and [`form()`](Self::form).
    pub fn content_type(mut self, value: &str) -> Self {
        self.content_type = self.header_value(value);
        self
    }

    /// Set the Accept header
    pub fn accept(mut self, value: &str) -> Self {
        self.accept = self.header_value(value);
        self
    }

    /// Override the Host header
    pub fn host(mut self, value: &str) -> Self {
        self.host = self.header_value(value);
        self
    }

    /// Set the User-Agent for this request
    ///
    /// Appends rather than replaces: a User-Agent added via
    /// [`header()`](Self::header) is kept alongside this one, so both values
    /// go on the wire. Without either, the client's configured User-Agent is
    /// used.
    pub fn user_agent(mut self, value: &str) -> Self {
        self.user_agent = self.header_value(value);
        self
    }

    /// Append query parameters to the request URL
    ///
    /// Accepts anything `serde_urlencoded` can serialize: slices of pairs,
    /// maps, or structs. Repeated calls accumulate. Parameters are appended
    /// to any query string already present in the URL.
    ///
    /// ```ignore
    /// client.get("https://api.example.com/search")
    ///     .query(&[("q", "rust http"), ("page", "2")])
    ///     .send()
    ///     .await?;
    /// ```
    pub fn query<T: Serialize>(mut self, params: &T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_urlencoded::to_string(params) {
            Ok(encoded) if encoded.is_empty() => {}
            Ok(encoded) => self.query.push(encoded),
            Err(e) => self.defer(HttpError::FormEncode(e)),
        }
        self
    }

    /// Set request body as JSON
    ///
    /// Serializes the value using `serde_json` and sets Content-Type to
    /// application/json unless one was already provided.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::Json)` if serialization fails.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let json_bytes = serde_json::to_vec(body)?;
        self.body = BodyKind::Json(Bytes::from(json_bytes));
        Ok(self)
    }

    /// Set request body as form URL-encoded
    ///
    /// Serializes the fields and sets Content-Type to
    /// application/x-www-form-urlencoded unless one was already provided.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::FormEncode)` if encoding fails.
    pub fn form<T: Serialize>(mut self, fields: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let form_string = serde_urlencoded::to_string(fields)?;
        self.body = BodyKind::Form(Bytes::from(form_string));
        Ok(self)
    }

    /// Set request body as raw bytes
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyKind::Bytes(body.into());
        self
    }

    /// Set request body as a string
    pub fn body_string(mut self, body: impl Into<String>) -> Self {
        self.body = BodyKind::Text(body.into());
        self
    }

    /// Set request body from a stream of byte chunks
    ///
    /// The stream is drained into memory at send time so the body can be
    /// compressed and replayed across redirect hops. A failing stream item
    /// aborts the request with `HttpError::Transport`.
    pub fn body_stream<S, B, E>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<BoxError>,
    {
        self.body = BodyKind::Stream(Box::pin(
            stream.map(|item| item.map(Into::into).map_err(Into::into)),
        ));
        self
    }

    /// Compress the request body with `codec`
    ///
    /// Sets `Content-Encoding` on the request and advertises the same coding
    /// in `Accept-Encoding`; a response answering with that coding is
    /// decompressed transparently as it is read.
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Authenticate with HTTP Basic credentials
    ///
    /// Ignored when `username` is empty.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Set a deadline for the whole exchange, redirect hops included
    ///
    /// When the deadline fires the in-flight request is cancelled and
    /// `send()` returns `HttpError::Timeout`. Overrides the client's default
    /// timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the client's redirect ceiling for this request
    ///
    /// `0` disables redirect following; the 3xx response is returned as-is.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Carry this request's headers onto redirect hops
    ///
    /// By default each hop is issued with a fresh header set containing only
    /// the client's User-Agent, plus the codec's encoding headers when a
    /// compressed body is replayed on a 307/308 hop. Enabling this replays
    /// the original headers, including any Authorization header, on every
    /// hop.
    pub fn forward_redirect_headers(mut self, forward: bool) -> Self {
        self.forward_redirect_headers = Some(forward);
        self
    }

    /// Send the request and return the response
    ///
    /// Redirects are followed up to the configured ceiling; exceeding it
    /// returns `HttpError::RedirectLimit` carrying the last 3xx response.
    /// Any HTTP status on the final hop is returned as `Ok` - use
    /// [`HttpResponse::error_for_status`] to turn non-2xx into errors.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - Request building failed (invalid headers, URL, etc.)
    /// - URL scheme is invalid for the transport security mode
    /// - Body compression failed
    /// - Network/transport error
    /// - The timeout expired
    /// - The redirect ceiling was exceeded
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        // Return any deferred error
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let timeout = self.timeout.or(self.client.default_timeout);
        let max_redirects = self
            .max_redirects
            .unwrap_or(self.client.redirect.max_redirects);
        let forward_headers = self
            .forward_redirect_headers
            .unwrap_or(self.client.redirect.forward_headers);

        let default_content_type = match (&self.content_type, self.body_default_content_type()) {
            (None, Some(ct)) => Some(HeaderValue::from_static(ct)),
            _ => None,
        };

        // Materialize the body; streams are drained here.
        let mut body = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Text(s) => Bytes::from(s),
            BodyKind::Bytes(b) | BodyKind::Json(b) | BodyKind::Form(b) => b,
            BodyKind::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk.map_err(HttpError::Transport)?);
                }
                buf.freeze()
            }
        };

        // Assemble the query string before validation so bad fragments
        // surface as URL errors.
        let mut url = self.url;
        if !self.query.is_empty() {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(&self.query.join("&"));
        }

        // A bodiless request stays bodiless on the wire; the encoding
        // headers are still advertised below.
        if let Some(codec) = self.codec {
            if !body.is_empty() {
                body = Bytes::from(codec.compress(&body).map_err(HttpError::Compression)?);
            }
        }

        let uri = validate_url(&url, self.client.transport_security)?;

        let mut headers = HeaderMap::new();
        if let Some(ct) = self.content_type.or(default_content_type) {
            headers.append(http::header::CONTENT_TYPE, ct);
        }
        if let Some(accept) = self.accept {
            headers.append(http::header::ACCEPT, accept);
        }
        if let Some(host) = self.host {
            headers.append(http::header::HOST, host);
        }

        let has_explicit_ua = self
            .headers
            .iter()
            .any(|(name, _)| name == http::header::USER_AGENT);
        match self.user_agent {
            Some(ua) => {
                headers.append(http::header::USER_AGENT, ua);
            }
            None if !has_explicit_ua => {
                headers.append(http::header::USER_AGENT, self.client.user_agent.clone());
            }
            None => {}
        }

        if let Some(codec) = self.codec {
            let coding = HeaderValue::from_static(codec.content_encoding());
            headers.insert(http::header::CONTENT_ENCODING, coding.clone());
            headers.insert(http::header::ACCEPT_ENCODING, coding);
        }

        // Explicit headers are appended, never replacing earlier values.
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        if let Some((username, password)) = self.basic_auth {
            if !username.is_empty() {
                headers.insert(http::header::AUTHORIZATION, basic_credentials(&username, &password)?);
            }
        }

        let exchange = Exchange {
            client: self.client,
            codec: self.codec,
            max_redirects,
            forward_headers,
        };
        let fut = exchange.run(self.method, uri, headers, body);

        match timeout {
            Some(d) => match tokio::time::timeout(d, fut).await {
                Ok(result) => result,
                Err(_) => Err(HttpError::Timeout(d)),
            },
            None => fut.await,
        }
    }

    fn body_default_content_type(&self) -> Option<&'static str> {
        match self.body {
            BodyKind::Json(_) => Some("application/json"),
            BodyKind::Form(_) => Some("application/x-www-form-urlencoded"),
            BodyKind::Empty | BodyKind::Text(_) | BodyKind::Bytes(_) | BodyKind::Stream(_) => None,
        }
    }
}

/// One full request/response exchange, including redirect hops.
struct Exchange {
    client: crate::HttpClient,
    codec: Option<Codec>,
    max_redirects: usize,
    forward_headers: bool,
}

impl Exchange {
    async fn run(
        self,
        mut method: Method,
        mut uri: Uri,
        mut headers: HeaderMap,
        mut body: Bytes,
    ) -> Result<HttpResponse, HttpError> {
        let mut hops = 0usize;

        loop {
            let mut request = Request::builder()
                .method(method.clone())
                .uri(uri.clone())
                .body(Full::new(body.clone()))?;
            *request.headers_mut() = headers.clone();

            // Plain-http proxying: the proxy sees the request head, so the
            // credential travels as a header on each hop.
            if uri.scheme_str() == Some("http") {
                if let Some(auth) = &self.client.proxy_auth {
                    request
                        .headers_mut()
                        .entry(http::header::PROXY_AUTHORIZATION)
                        .or_insert_with(|| auth.clone());
                }
            }

            tracing::debug!(method = %request.method(), uri = %request.uri(), hop = hops, "sending request");
            let response = self.client.inner.request(request).await?;
            let status = response.status();

            if !is_redirect(status) {
                return Ok(self.decorate(response));
            }
            let Some(location) = response.headers().get(http::header::LOCATION) else {
                // 3xx without Location is terminal
                return Ok(self.decorate(response));
            };

            hops += 1;
            if hops > self.max_redirects {
                tracing::debug!(max = self.max_redirects, %status, "redirect ceiling reached");
                return Err(HttpError::RedirectLimit {
                    max: self.max_redirects,
                    response: Box::new(self.decorate(response)),
                });
            }

            let next = resolve_location(&uri, location)?;
            check_scheme(&next, self.client.transport_security)?;
            tracing::debug!(from = %uri, to = %next, hop = hops, "following redirect");

            // 301/302/303 convert to GET and drop the body; 307/308 replay
            // the original method and body.
            if matches!(status.as_u16(), 301 | 302 | 303)
                && method != Method::GET
                && method != Method::HEAD
            {
                method = Method::GET;
                body = Bytes::new();
                headers.remove(http::header::CONTENT_TYPE);
                headers.remove(http::header::CONTENT_ENCODING);
                headers.remove(http::header::CONTENT_LENGTH);
            }

            if !self.forward_headers {
                let mut fresh = HeaderMap::new();
                fresh.insert(http::header::USER_AGENT, self.client.user_agent.clone());
                // A replayed compressed body must stay identifiable on the
                // next hop even though the other headers are dropped.
                if let Some(codec) = self.codec {
                    if !body.is_empty() {
                        let coding = HeaderValue::from_static(codec.content_encoding());
                        fresh.insert(http::header::CONTENT_ENCODING, coding.clone());
                        fresh.insert(http::header::ACCEPT_ENCODING, coding);
                    }
                }
                headers = fresh;
            }

            uri = next;
        }
    }

    /// Wrap a transport response, arming decompression when the server
    /// answered in the request's coding.
    fn decorate(&self, response: Response<Incoming>) -> HttpResponse {
        let (parts, body) = response.into_parts();

        let decode = self.codec.filter(|codec| {
            parts
                .headers
                .get(http::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains(codec.content_encoding()))
        });

        let raw: RawBody = body.map_err(|e| Box::new(e) as BoxError).boxed();
        HttpResponse {
            inner: Response::from_parts(parts, ResponseBody::new(raw, decode)),
            max_body_size: self.client.max_body_size,
        }
    }
}

fn is_redirect(status: http::StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Encode HTTP Basic credentials as an Authorization header value.
fn basic_credentials(username: &str, password: &str) -> Result<HeaderValue, HttpError> {
    use base64::Engine as _;
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    Ok(HeaderValue::try_from(format!("Basic {encoded}"))?)
}

/// Validate URL and scheme against transport security configuration.
///
/// Uses proper `http::Uri` parsing instead of string prefix matching.
/// Returns the parsed URI on success for use in request building.
fn validate_url(url: &str, transport: TransportSecurity) -> Result<Uri, HttpError> {
    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    if uri.scheme_str().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        });
    }

    check_scheme(&uri, transport)?;
    Ok(uri)
}

fn check_scheme(uri: &Uri, transport: TransportSecurity) -> Result<(), HttpError> {
    match uri.scheme_str() {
        Some("https") => Ok(()),
        Some("http") => match transport {
            TransportSecurity::AllowInsecureHttp => Ok(()),
            TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
        },
        Some(scheme) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        None => Err(HttpError::InvalidScheme {
            scheme: String::new(),
            reason: "missing scheme".to_owned(),
        }),
    }
}

/// Resolve a Location header against the URI it was served from.
///
/// Handles absolute URLs, absolute paths, and relative paths. Fragments are
/// kept out; `http::Uri` drops them during parsing.
fn resolve_location(base: &Uri, location: &HeaderValue) -> Result<Uri, HttpError> {
    let loc = location
        .to_str()
        .map_err(|e| HttpError::InvalidUri {
            url: String::from_utf8_lossy(location.as_bytes()).into_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?
        .trim();

    let parse_err = |reason: String| HttpError::InvalidUri {
        url: loc.to_owned(),
        kind: InvalidUriKind::ParseError,
        reason,
    };

    // Absolute URL: take it as-is.
    if loc.starts_with("http://") || loc.starts_with("https://") {
        return loc.parse().map_err(|e: http::uri::InvalidUri| parse_err(e.to_string()));
    }

    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base
        .authority()
        .map(http::uri::Authority::as_str)
        .unwrap_or_default();

    let path_and_query = if loc.starts_with('/') {
        loc.to_owned()
    } else {
        // Relative path: resolve against the directory of the base path.
        let base_path = base.path();
        let dir = match base_path.rfind('/') {
            Some(idx) => &base_path[..=idx],
            None => "/",
        };
        format!("{dir}{loc}")
    };

    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| parse_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn loc(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn test_validate_url_https_ok() {
        let result = validate_url("https://example.com/path", TransportSecurity::TlsOnly);
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_url_http_requires_allowance() {
        let err = validate_url("http://example.com", TransportSecurity::TlsOnly).unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));

        let ok = validate_url("http://example.com", TransportSecurity::AllowInsecureHttp);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_validate_url_rejects_missing_scheme() {
        let err = validate_url("example.com/path", TransportSecurity::TlsOnly).unwrap_err();
        assert!(matches!(err, HttpError::InvalidUri { .. }));
    }

    #[test]
    fn test_validate_url_rejects_other_schemes() {
        let err = validate_url("ftp://example.com", TransportSecurity::AllowInsecureHttp)
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));
    }

    #[test]
    fn test_resolve_location_absolute() {
        let next = resolve_location(
            &uri("https://a.example/start"),
            &loc("https://b.example/target?x=1"),
        )
        .unwrap();
        assert_eq!(next.to_string(), "https://b.example/target?x=1");
    }

    #[test]
    fn test_resolve_location_absolute_path() {
        let next = resolve_location(&uri("https://a.example/one/two"), &loc("/three")).unwrap();
        assert_eq!(next.to_string(), "https://a.example/three");
    }

    #[test]
    fn test_resolve_location_relative_path() {
        let next = resolve_location(&uri("https://a.example/one/two"), &loc("three")).unwrap();
        assert_eq!(next.to_string(), "https://a.example/one/three");
    }

    #[test]
    fn test_resolve_location_keeps_port() {
        let next = resolve_location(&uri("http://127.0.0.1:8080/a"), &loc("/b")).unwrap();
        assert_eq!(next.to_string(), "http://127.0.0.1:8080/b");
    }

    #[test]
    fn test_is_redirect_statuses() {
        for code in [301u16, 302, 303, 307, 308] {
            assert!(is_redirect(http::StatusCode::from_u16(code).unwrap()));
        }
        for code in [200u16, 204, 304, 400, 500] {
            assert!(!is_redirect(http::StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn test_basic_credentials_encoding() {
        let value = basic_credentials("user", "passwd").unwrap();
        // base64("user:passwd")
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjpwYXNzd2Q=");
    }
}
