//! Response body decoding: content-encoding then charset.
//!
//! Decompression is delegated to `flate2` and charset conversion to
//! `encoding_rs`. When neither an explicit charset nor a `Content-Type`
//! charset parameter is available the body is read as UTF-8.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Raised by `error_for_status` for status >= 300.
    #[error("Unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("Content decoding failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extract the `charset` parameter of a Content-Type value.
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Undo every coding listed in a Content-Encoding value.
///
/// Codings are applied by the server in listed order, so they are removed
/// last-first. `identity` and empty entries are skipped.
pub fn decompress(body: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, DecodeError> {
    let codings: Vec<String> = content_encoding
        .unwrap_or_default()
        .split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty() && c != "identity")
        .collect();

    let mut data = body.to_vec();
    for coding in codings.iter().rev() {
        data = match coding.as_str() {
            "gzip" | "x-gzip" => read_all(GzDecoder::new(data.as_slice()))?,
            "deflate" => inflate(&data)?,
            other => return Err(DecodeError::UnsupportedEncoding(other.to_string())),
        };
    }
    Ok(data)
}

/// HTTP "deflate" is zlib-wrapped, but some servers send raw deflate.
fn inflate(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    match read_all(ZlibDecoder::new(data)) {
        Ok(out) => Ok(out),
        Err(_) => read_all(DeflateDecoder::new(data)),
    }
}

fn read_all<R: Read>(mut reader: R) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// Convert bytes to text using `charset`, UTF-8 when `None`.
///
/// Malformed sequences are replaced with U+FFFD rather than rejected.
pub fn decode_charset(body: &[u8], charset: Option<&str>) -> Result<String, DecodeError> {
    let encoding = match charset {
        Some(label) => encoding_rs::Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| DecodeError::UnsupportedCharset(label.to_string()))?,
        None => encoding_rs::UTF_8,
    };
    let (text, _, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!(charset = encoding.name(), "body contained malformed sequences");
    }
    Ok(text.into_owned())
}

/// Decompress then decode to text.
pub fn decode_text(
    body: &[u8],
    content_encoding: Option<&str>,
    charset: Option<&str>,
) -> Result<String, DecodeError> {
    let raw = decompress(body, content_encoding)?;
    decode_charset(&raw, charset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_plain_utf8_default() {
        let text = decode_text("héllo".as_bytes(), None, None).unwrap();
        assert_eq!(text, "héllo");
    }

    #[test]
    fn test_gzip_case_insensitive() {
        let body = gzip(b"jquery");
        assert_eq!(decode_text(&body, Some("GZIP"), None).unwrap(), "jquery");
    }

    #[test]
    fn test_deflate_zlib() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"deflated").unwrap();
        let body = encoder.finish().unwrap();
        assert_eq!(decode_text(&body, Some("deflate"), None).unwrap(), "deflated");
    }

    #[test]
    fn test_explicit_charset() {
        // "中文" in GBK
        let body = [0xD6, 0xD0, 0xCE, 0xC4];
        assert_eq!(decode_text(&body, None, Some("GBK")).unwrap(), "中文");
    }

    #[test]
    fn test_latin1_charset() {
        let body = [b'c', b'a', b'f', 0xE9];
        assert_eq!(decode_text(&body, Some("identity"), Some("ISO-8859-1")).unwrap(), "café");
    }

    #[test]
    fn test_unknown_charset() {
        assert!(matches!(
            decode_text(b"x", None, Some("klingon")),
            Err(DecodeError::UnsupportedCharset(_))
        ));
    }

    #[test]
    fn test_unknown_encoding() {
        assert!(matches!(
            decode_text(b"x", Some("br"), None),
            Err(DecodeError::UnsupportedEncoding(e)) if e == "br"
        ));
    }

    #[test]
    fn test_corrupt_gzip() {
        assert!(matches!(
            decode_text(b"not gzip at all", Some("gzip"), None),
            Err(DecodeError::Decompress(_))
        ));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(charset_from_content_type("text/html; charset=GBK"), Some("GBK"));
        assert_eq!(charset_from_content_type("text/html;Charset=\"utf-8\""), Some("utf-8"));
        assert_eq!(charset_from_content_type("application/json"), None);
        assert_eq!(charset_from_content_type("text/plain; charset="), None);
    }
}
