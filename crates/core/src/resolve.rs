//! Include resolution support: the content-fetch capability, location
//! joining for local paths and URL-style locations, and byte decoding with
//! UTF-16 byte-order-mark detection.
//!
//! The parser owns the recursion and cycle detection; this module only
//! provides the pieces it composes.

use std::io;
use std::path::Path;

// ── Fetch capability ─────────────────────────────────────────────────────

/// Content retrieval for `include` targets.
///
/// The core never opens files or sockets itself; callers inject an
/// implementation. Fetch failures propagate as include errors carrying the
/// directive's source position.
pub trait Resolver {
    /// Fetch the raw bytes of the unit at `location` (already joined
    /// against the including document's base).
    fn fetch(&self, location: &str) -> io::Result<Vec<u8>>;
}

/// Filesystem-backed resolver for local paths.
///
/// URL-style locations are rejected; transports beyond the local
/// filesystem belong to the embedding application.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsResolver;

impl Resolver for FsResolver {
    fn fetch(&self, location: &str) -> io::Result<Vec<u8>> {
        if is_url(location) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("URL locations are not supported by the filesystem resolver: {location}"),
            ));
        }
        std::fs::read(location)
    }
}

// ── Location algebra ─────────────────────────────────────────────────────

/// Whether a location is URL-style (`scheme:...` with a scheme of at least
/// two characters, so Windows drive letters stay paths).
pub fn is_url(location: &str) -> bool {
    location.split_once(':').is_some_and(|(scheme, _)| {
        scheme.len() > 1
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Join a relative include target against a base directory or URL.
///
/// Absolute (URL-style) targets are returned unchanged; otherwise the
/// target is path-joined (local base) or appended after the base's last
/// `/` segment (URL base).
pub fn join_location(base: &str, target: &str) -> String {
    if is_url(target) {
        return target.to_string();
    }
    if is_url(base) {
        let trimmed = base.trim_end_matches('/');
        return format!("{trimmed}/{target}");
    }
    Path::new(base).join(target).to_string_lossy().into_owned()
}

/// The base (directory part) of a resolved location, for resolving the
/// fetched unit's own includes.
pub fn parent_location(location: &str) -> String {
    if is_url(location) {
        match location.rfind('/') {
            Some(i) => location[..i].to_string(),
            None => location.to_string(),
        }
    } else {
        Path::new(location)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| ".".to_string(), |p| p.to_string_lossy().into_owned())
    }
}

/// Normalize a location for cycle detection: separators unified, `.`
/// segments dropped, `..` segments resolved lexically.
///
/// Purely textual on purpose — cached and in-memory resolvers must agree
/// with filesystem ones, so no `canonicalize` here.
pub fn normalize_location(location: &str) -> String {
    let unified = location.replace('\\', "/");
    let mut out: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" if !out.is_empty() => {}
            "." => {}
            ".." if out.last().is_some_and(|s| !s.is_empty() && *s != "..") => {
                out.pop();
            }
            _ => out.push(seg),
        }
    }
    out.join("/")
}

// ── Decoding ─────────────────────────────────────────────────────────────

/// The bytes of a fetched unit could not be decoded as text.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(String);

const BOM_UTF16_BE: [u8; 2] = [0xFE, 0xFF];
const BOM_UTF16_LE: [u8; 2] = [0xFF, 0xFE];
const BOM_UTF8: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Decode fetched bytes into text: UTF-16 when a byte-order mark says so,
/// UTF-8 otherwise (with any UTF-8 BOM stripped).
pub fn decode(bytes: &[u8]) -> Result<String, DecodeError> {
    if bytes.starts_with(&BOM_UTF16_BE) {
        return decode_utf16(&bytes[2..], u16::from_be_bytes);
    }
    if bytes.starts_with(&BOM_UTF16_LE) {
        return decode_utf16(&bytes[2..], u16::from_le_bytes);
    }
    let bytes = bytes.strip_prefix(&BOM_UTF8).unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError(format!("invalid UTF-8: {e}")))
}

fn decode_utf16(bytes: &[u8], combine: fn([u8; 2]) -> u16) -> Result<String, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError("odd byte count in UTF-16 input".into()));
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| combine([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| DecodeError(format!("invalid UTF-16: {e}")))
}
