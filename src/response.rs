use crate::codec::{Codec, Inflater};
use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Maximum number of body bytes included in `HttpStatus` error previews.
const ERROR_BODY_PREVIEW_LIMIT: usize = 2048;

/// Type alias for the type-erased body handed over by the transport.
pub type RawBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

pin_project! {
    /// Response body that decompresses on the fly when the request carried a
    /// codec and the server answered in kind.
    ///
    /// Without a codec this is a transparent pass-through. With one, each
    /// data frame is pushed through the decompressor as it arrives, so large
    /// bodies never need to be buffered whole. The decompressor is finalized
    /// when the underlying stream ends; a truncated or corrupt stream
    /// surfaces as [`HttpError::Compression`] on the final read.
    pub struct ResponseBody {
        #[pin]
        raw: RawBody,
        inflater: Option<Inflater>,
        // Trailers held back while the decoder tail is emitted first.
        pending: Option<Frame<Bytes>>,
        done: bool,
    }
}

impl ResponseBody {
    pub(crate) fn new(raw: RawBody, codec: Option<Codec>) -> Self {
        Self {
            raw,
            inflater: codec.map(|c| c.inflater()),
            pending: None,
            done: false,
        }
    }

    /// Whether this body is being decompressed as it is read.
    #[must_use]
    pub fn is_decoded(&self) -> bool {
        self.inflater.is_some()
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("inflater", &self.inflater)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl http_body::Body for ResponseBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = this.pending.take() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            let Some(inflater) = this.inflater.as_mut() else {
                return match this.raw.as_mut().poll_frame(cx) {
                    Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(frame))),
                    Poll::Ready(Some(Err(e))) => {
                        *this.done = true;
                        Poll::Ready(Some(Err(HttpError::Transport(e))))
                    }
                    Poll::Ready(None) => {
                        *this.done = true;
                        Poll::Ready(None)
                    }
                    Poll::Pending => Poll::Pending,
                };
            };

            match this.raw.as_mut().poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let Some(data) = frame.data_ref() else {
                        // Trailers end the compressed stream; flush the
                        // decoder tail first so no data frame follows them.
                        return match inflater.finish() {
                            Ok(tail) if tail.is_empty() => Poll::Ready(Some(Ok(frame))),
                            Ok(tail) => {
                                *this.pending = Some(frame);
                                Poll::Ready(Some(Ok(Frame::data(Bytes::from(tail)))))
                            }
                            Err(e) => {
                                *this.done = true;
                                Poll::Ready(Some(Err(HttpError::Compression(e))))
                            }
                        };
                    };
                    match inflater.push(data) {
                        // This chunk produced no plaintext yet; poll for more.
                        Ok(out) if out.is_empty() => continue,
                        Ok(out) => return Poll::Ready(Some(Ok(Frame::data(Bytes::from(out))))),
                        Err(e) => {
                            *this.done = true;
                            return Poll::Ready(Some(Err(HttpError::Compression(e))));
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(HttpError::Transport(e))));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    return match inflater.finish() {
                        Ok(tail) if tail.is_empty() => Poll::Ready(None),
                        Ok(tail) => Poll::Ready(Some(Ok(Frame::data(Bytes::from(tail))))),
                        Err(e) => Poll::Ready(Some(Err(HttpError::Compression(e)))),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// HTTP response wrapper with body-reading helpers
///
/// Provides a reqwest-like API for reading response bodies:
/// - `resp.error_for_status()?` - Check status without reading body
/// - `resp.bytes().await?` - Read raw bytes
/// - `resp.checked_bytes().await?` - Read bytes with status check
/// - `resp.json::<T>().await?` - Parse as JSON with status check
///
/// All body reads enforce the configured `max_body_size` limit, measured on
/// decompressed bytes when the body is being decoded.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Declared length of the body on the wire, if the server sent one.
    ///
    /// This is the `Content-Length` of the raw (possibly compressed) body;
    /// the decoded body may be longer.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.inner
            .headers()
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Consume the wrapper and return the inner response.
    ///
    /// Useful for advanced callers who need direct access to the response.
    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Check status and return error for non-2xx responses
    ///
    /// Does NOT read the response body. For non-2xx status, returns
    /// `HttpError::HttpStatus` with an empty body preview.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` if the response status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }

        let content_type = self
            .inner
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            content_type,
        })
    }

    /// Read response body as bytes without status check
    ///
    /// Enforces `max_body_size` limit.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited_impl(self.inner, self.max_body_size).await
    }

    /// Read response body as bytes with status check
    ///
    /// Returns `HttpError::HttpStatus` for non-2xx responses (with body preview).
    /// Enforces `max_body_size` limit for successful responses.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        checked_body_impl(self.inner, self.max_body_size).await
    }

    /// Parse response body as JSON with status check
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    /// Returns `HttpError::Json` if parsing fails.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body_bytes = checked_body_impl(self.inner, self.max_body_size).await?;
        let value = serde_json::from_slice(&body_bytes)?;
        Ok(value)
    }

    /// Read response body as text (UTF-8) with status check
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement character.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    pub async fn text(self) -> Result<String, HttpError> {
        let body_bytes = checked_body_impl(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Returns the response body as a stream for incremental processing.
    ///
    /// Unlike `bytes()`, `json()`, or `text()`, this method does NOT:
    /// - Check the HTTP status code (use `error_for_status()` first if needed)
    /// - Enforce the `max_body_size` limit (caller is responsible for limiting)
    /// - Buffer the entire body in memory
    ///
    /// Decompression still applies frame by frame when the request selected a
    /// codec and the server compressed the response.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    /// Returns the configured max body size for this response.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

/// Internal implementation of `checked_bytes` that doesn't capture `&self`
async fn checked_body_impl(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Bytes, HttpError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if !status.is_success() {
        // Read a limited preview for the error message without letting
        // BodyTooLarge hide the status error.
        let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
        let body_preview = match read_body_limited_impl(response, preview_limit).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(e) => return Err(e),
        };

        return Err(HttpError::HttpStatus {
            status,
            body_preview,
            content_type,
        });
    }

    read_body_limited_impl(response, max_body_size).await
}

/// Collect the (possibly decoded) body, enforcing the byte limit on what is
/// actually accumulated. This protects against decompression bombs where a
/// small compressed payload expands to gigabytes.
async fn read_body_limited_impl(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let (_parts, body) = response.into_parts();

    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn raw_body(data: Vec<u8>) -> RawBody {
        Full::new(Bytes::from(data))
            .map_err(|never| match never {})
            .boxed()
    }

    fn make_response(data: Vec<u8>, codec: Option<Codec>, max: usize) -> HttpResponse {
        let inner = Response::builder()
            .status(StatusCode::OK)
            .body(ResponseBody::new(raw_body(data), codec))
            .unwrap();
        HttpResponse {
            inner,
            max_body_size: max,
        }
    }

    #[tokio::test]
    async fn test_plain_body_pass_through() {
        let resp = make_response(b"hello world".to_vec(), None, 1024);
        assert!(!resp.inner.body().is_decoded());
        let bytes = resp.bytes().await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn test_decoded_body_inflates() {
        let plain = b"decompress me on the way out".repeat(30);
        let compressed = Codec::Gzip.compress(&plain).unwrap();
        let resp = make_response(compressed, Some(Codec::Gzip), 1 << 20);
        assert!(resp.inner.body().is_decoded());
        let bytes = resp.bytes().await.unwrap();
        assert_eq!(&bytes[..], &plain[..]);
    }

    #[tokio::test]
    async fn test_corrupt_compressed_body_errors() {
        let resp = make_response(b"\x1f\x8bnot really gzip".to_vec(), Some(Codec::Gzip), 1024);
        let err = resp.bytes().await.unwrap_err();
        assert!(matches!(err, HttpError::Compression(_)), "got {err:?}");
    }

    /// The decoder tail is emitted before trailers so frame order holds.
    #[tokio::test]
    async fn test_trailers_follow_decoded_tail() {
        use http_body_util::StreamBody;

        let plain = b"tail ordering matters".repeat(100);
        let compressed = Codec::Gzip.compress(&plain).unwrap();

        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", http::HeaderValue::from_static("abc123"));

        let frames: Vec<Result<Frame<Bytes>, Box<dyn std::error::Error + Send + Sync>>> = vec![
            Ok(Frame::data(Bytes::from(compressed))),
            Ok(Frame::trailers(trailers)),
        ];
        let raw: RawBody = StreamBody::new(futures::stream::iter(frames)).boxed();

        let mut body = std::pin::pin!(ResponseBody::new(raw, Some(Codec::Gzip)));
        let mut decoded = Vec::new();
        let mut seen_trailers = false;
        while let Some(frame) = body.frame().await {
            let frame = frame.unwrap();
            if let Some(data) = frame.data_ref() {
                assert!(!seen_trailers, "data frame after trailers");
                decoded.extend_from_slice(data);
            } else if let Some(t) = frame.trailers_ref() {
                assert_eq!(t.get("x-checksum").unwrap(), "abc123");
                seen_trailers = true;
            }
        }

        assert!(seen_trailers, "trailers frame was dropped");
        assert_eq!(decoded, plain);
    }

    #[tokio::test]
    async fn test_limit_applies_to_decoded_bytes() {
        // Small on the wire, large decoded: the limit must catch it.
        let plain = vec![0u8; 64 * 1024];
        let compressed = Codec::Deflate.compress(&plain).unwrap();
        assert!(compressed.len() < 1024);

        let resp = make_response(compressed, Some(Codec::Deflate), 4096);
        let err = resp.bytes().await.unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 4096, .. }));
    }

    #[tokio::test]
    async fn test_checked_bytes_includes_preview() {
        let inner = Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(ResponseBody::new(raw_body(b"upstream sad".to_vec()), None))
            .unwrap();
        let resp = HttpResponse {
            inner,
            max_body_size: 1024,
        };

        match resp.checked_bytes().await.unwrap_err() {
            HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
            } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body_preview, "upstream sad");
                assert_eq!(content_type.as_deref(), Some("text/plain"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_for_status_does_not_read_body() {
        let inner = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(ResponseBody::new(raw_body(b"gone".to_vec()), None))
            .unwrap();
        let resp = HttpResponse {
            inner,
            max_body_size: 1024,
        };

        match resp.error_for_status().unwrap_err() {
            HttpError::HttpStatus {
                status,
                body_preview,
                ..
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(body_preview.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_content_length_parsed() {
        let inner = Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_LENGTH, "42")
            .body(ResponseBody::new(raw_body(Vec::new()), None))
            .unwrap();
        let resp = HttpResponse {
            inner,
            max_body_size: 1024,
        };
        assert_eq!(resp.content_length(), Some(42));
    }
}
