//! Compression codecs applied symmetrically to request and response bodies.
//!
//! Selecting a codec on a request compresses the outgoing body eagerly and
//! advertises the same encoding on `Accept-Encoding`. The matching response
//! body is inflated incrementally as it is read, never buffered whole.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::Compression;

/// A compression codec for request and response bodies.
///
/// `Deflate` is the raw DEFLATE stream; `Zlib` is DEFLATE wrapped in a zlib
/// container. Both advertise the `deflate` content coding on the wire, which
/// matches the loose way servers historically treat that token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Codec {
    /// RFC 1952 gzip
    Gzip,
    /// Raw RFC 1951 DEFLATE
    Deflate,
    /// RFC 1950 zlib-wrapped DEFLATE
    Zlib,
}

impl Codec {
    /// The content coding token sent in `Content-Encoding` and
    /// `Accept-Encoding`.
    #[must_use]
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate | Codec::Zlib => "deflate",
        }
    }

    /// Compressing reader over `input`, default compression level.
    pub(crate) fn encoder<'a>(&self, input: &'a [u8]) -> Box<dyn Read + Send + 'a> {
        let level = Compression::default();
        match self {
            Codec::Gzip => Box::new(GzEncoder::new(input, level)),
            Codec::Deflate => Box::new(DeflateEncoder::new(input, level)),
            Codec::Zlib => Box::new(ZlibEncoder::new(input, level)),
        }
    }

    /// Compress `input` in one shot.
    pub(crate) fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        self.encoder(input).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Streaming decompressor for a response body in this encoding.
    pub(crate) fn inflater(&self) -> Inflater {
        match self {
            Codec::Gzip => Inflater::Gzip(Some(GzDecoder::new(Vec::new()))),
            Codec::Deflate => Inflater::Deflate(Some(DeflateDecoder::new(Vec::new()))),
            Codec::Zlib => Inflater::Zlib(Some(ZlibDecoder::new(Vec::new()))),
        }
    }
}

/// Push-style streaming decompressor.
///
/// Compressed chunks go in via [`push`](Inflater::push); whatever plaintext
/// they produced so far comes back out. [`finish`](Inflater::finish) flushes
/// the trailing window and validates checksums where the format has them.
///
/// The decoder is held in an `Option` because `finish` consumes it by value.
pub(crate) enum Inflater {
    Gzip(Option<GzDecoder<Vec<u8>>>),
    Deflate(Option<DeflateDecoder<Vec<u8>>>),
    Zlib(Option<ZlibDecoder<Vec<u8>>>),
}

impl Inflater {
    /// Feed a compressed chunk, returning the plaintext produced so far.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Inflater::Gzip(Some(dec)) => {
                dec.write_all(chunk)?;
                Ok(std::mem::take(dec.get_mut()))
            }
            Inflater::Deflate(Some(dec)) => {
                dec.write_all(chunk)?;
                Ok(std::mem::take(dec.get_mut()))
            }
            Inflater::Zlib(Some(dec)) => {
                dec.write_all(chunk)?;
                Ok(std::mem::take(dec.get_mut()))
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "decompressor already finished",
            )),
        }
    }

    /// Finalize the stream and return any remaining plaintext.
    pub(crate) fn finish(&mut self) -> std::io::Result<Vec<u8>> {
        match self {
            Inflater::Gzip(dec) => match dec.take() {
                Some(d) => d.finish(),
                None => Ok(Vec::new()),
            },
            Inflater::Deflate(dec) => match dec.take() {
                Some(d) => d.finish(),
                None => Ok(Vec::new()),
            },
            Inflater::Zlib(dec) => match dec.take() {
                Some(d) => d.finish(),
                None => Ok(Vec::new()),
            },
        }
    }
}

impl fmt::Debug for Inflater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Inflater::Gzip(_) => "Inflater::Gzip",
            Inflater::Deflate(_) => "Inflater::Deflate",
            Inflater::Zlib(_) => "Inflater::Zlib",
        };
        f.write_str(name)
    }
}
