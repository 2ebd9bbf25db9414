//! Response compression negotiated through `Accept-Encoding`.

use crate::config::CompressionConfig;
use crate::error::{ServerError, ServerResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const MAX_DECOMPRESSED: usize = 256 * 1024 * 1024;

/// A supported content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// RFC 1952 gzip.
    Gzip,
    /// Zstandard.
    Zstd,
}

impl Encoding {
    /// Token used in `Content-Encoding`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Zstd => "zstd",
        }
    }

    /// Parses a `Content-Encoding` token; `identity` gives `None`.
    ///
    /// # Errors
    ///
    /// Unsupported codings are invalid requests.
    pub fn from_header(value: &str) -> ServerResult<Option<Self>> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(None),
            "gzip" | "x-gzip" => Ok(Some(Encoding::Gzip)),
            "zstd" => Ok(Some(Encoding::Zstd)),
            other => Err(ServerError::invalid_request(format!(
                "unsupported content encoding {other:?}"
            ))),
        }
    }
}

/// Picks the best coding the client accepts.
///
/// Highest q-value wins, zstd before gzip on a tie, and `*` stands for any
/// coding not listed explicitly. `q=0` refuses a coding.
#[must_use]
pub fn negotiate(accept_encoding: Option<&str>) -> Option<Encoding> {
    let header = accept_encoding?;
    let mut gzip = None;
    let mut zstd = None;
    let mut any = None;
    for item in header.split(',') {
        let mut parts = item.split(';');
        let coding = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let mut q = 1.0_f32;
        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("q") {
                    q = value.trim().parse().unwrap_or(0.0);
                }
            }
        }
        match coding.as_str() {
            "gzip" | "x-gzip" => gzip = Some(q),
            "zstd" => zstd = Some(q),
            "*" => any = Some(q),
            _ => {}
        }
    }
    let zstd_q = zstd.or(any).unwrap_or(0.0);
    let gzip_q = gzip.or(any).unwrap_or(0.0);
    if zstd_q <= 0.0 && gzip_q <= 0.0 {
        None
    } else if zstd_q >= gzip_q {
        Some(Encoding::Zstd)
    } else {
        Some(Encoding::Gzip)
    }
}

/// Compresses `body`, or returns `None` when it should go out as is.
///
/// # Errors
///
/// Returns an internal error if the encoder fails.
pub fn compress(
    body: &[u8],
    encoding: Option<Encoding>,
    config: &CompressionConfig,
) -> ServerResult<Option<(Encoding, Vec<u8>)>> {
    let Some(encoding) = encoding else {
        return Ok(None);
    };
    if !config.enabled || body.len() < config.min_size {
        return Ok(None);
    }
    let compressed = match encoding {
        Encoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(config.gzip_level));
            encoder
                .write_all(body)
                .and_then(|()| encoder.finish())
                .map_err(|e| ServerError::internal(format!("gzip failed: {e}")))?
        }
        Encoding::Zstd => zstd::bulk::compress(body, config.zstd_level)
            .map_err(|e| ServerError::internal(format!("zstd failed: {e}")))?,
    };
    Ok(Some((encoding, compressed)))
}

/// Reverses [`compress`]; used for compressed request bodies.
///
/// # Errors
///
/// Corrupt input is an invalid request.
pub fn decompress(body: &[u8], encoding: Encoding) -> ServerResult<Vec<u8>> {
    match encoding {
        Encoding::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(body)
                .take(MAX_DECOMPRESSED as u64)
                .read_to_end(&mut out)
                .map_err(|e| ServerError::invalid_request(format!("bad gzip body: {e}")))?;
            Ok(out)
        }
        Encoding::Zstd => zstd::bulk::decompress(body, MAX_DECOMPRESSED)
            .map_err(|e| ServerError::invalid_request(format!("bad zstd body: {e}"))),
    }
}
