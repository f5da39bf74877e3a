//! Processing option parsing and merging.
//!
//! Inbound requests carry image processing directives in two places: the
//! URL path (`/w:300/q:75/...`) and the query string (`?w=600&h=400`).
//! This module parses both, merges them with query values taking
//! precedence, and appends a format directive negotiated from the `Accept`
//! header.
//!
//! Only the whitelisted keys `w` (width), `h` (height) and `q` (quality)
//! are recognized. Anything else, including malformed directives like
//! `w:abc` or `w:300:extra`, is silently dropped rather than rejected, so
//! a request never fails because of an unknown option.
//!
//! Merged options serialize in the fixed canonical order `w, h, q` (with
//! `f` appended last) so that the rewritten signable path, and the
//! signature computed over it, is reproducible.

use url::form_urlencoded;

/// Whitelisted directive keys, in canonical serialization order.
pub const OPTION_KEYS: [&str; 3] = ["w", "h", "q"];

/// Accept header substrings and the format directive each negotiates,
/// in priority order (first match wins).
const FORMAT_PREFERENCE: [(&str, &str); 4] = [
    ("image/avif", "avif"),
    ("image/webp", "webp"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
];

// =============================================================================
// Path Options
// =============================================================================

/// Extract whitelisted `key:value` directives from URL path segments.
///
/// A segment survives only if it has exactly one `:`, a whitelisted key
/// and a non-empty integer value. Surviving directives keep their input
/// order and are joined with `/`.
pub fn parse_path_options(segments: &[&str]) -> String {
    let mut options: Vec<&str> = Vec::new();

    for segment in segments {
        let Some((key, value)) = segment.split_once(':') else {
            continue;
        };
        if !OPTION_KEYS.contains(&key) {
            continue;
        }
        if value.is_empty() || value.contains(':') {
            continue;
        }
        if value.parse::<i64>().is_err() {
            continue;
        }
        options.push(segment);
    }

    options.join("/")
}

// =============================================================================
// Query Options
// =============================================================================

/// Processing options supplied via query parameters.
///
/// A field is `None` when the parameter is absent or not an integer.
/// An explicit `0` parses but is treated as "unset" during merging, so it
/// cannot be distinguished from an absent parameter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Requested width
    pub w: Option<i64>,

    /// Requested height
    pub h: Option<i64>,

    /// Requested quality
    pub q: Option<i64>,
}

impl QueryOptions {
    /// Parse `w`, `h` and `q` from a raw query string.
    ///
    /// Only the first occurrence of each parameter is considered;
    /// duplicates are ignored. Unknown parameters pass through unnoticed.
    pub fn from_query(query: &str) -> Self {
        let mut w: Option<String> = None;
        let mut h: Option<String> = None;
        let mut q: Option<String> = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "w" if w.is_none() => w = Some(value.into_owned()),
                "h" if h.is_none() => h = Some(value.into_owned()),
                "q" if q.is_none() => q = Some(value.into_owned()),
                _ => {}
            }
        }

        Self {
            w: w.and_then(|v| v.parse().ok()),
            h: h.and_then(|v| v.parse().ok()),
            q: q.and_then(|v| v.parse().ok()),
        }
    }

    fn get(&self, key: &str) -> Option<i64> {
        match key {
            "w" => self.w,
            "h" => self.h,
            "q" => self.q,
            _ => None,
        }
    }
}

// =============================================================================
// Merging
// =============================================================================

/// Merge path directives with query options, preferring query values.
///
/// Keys present only in the path keep their path value; query values
/// override for identical keys; zero query values count as unset. The
/// result serializes in the canonical key order `w, h, q`.
pub fn merge_options(path_opts: &str, query_opts: QueryOptions) -> String {
    let mut merged: Vec<String> = Vec::new();

    for key in OPTION_KEYS {
        let path_value = path_opts.split('/').find_map(|part| {
            let (k, v) = part.split_once(':')?;
            (k == key && !v.is_empty() && !v.contains(':')).then(|| v.to_string())
        });

        let value = match query_opts.get(key) {
            Some(v) if v != 0 => Some(v.to_string()),
            _ => path_value,
        };

        if let Some(value) = value {
            merged.push(format!("{}:{}", key, value));
        }
    }

    merged.join("/")
}

// =============================================================================
// Format Negotiation
// =============================================================================

/// Negotiate an output format from the `Accept` header value.
///
/// Substring match in priority order avif > webp > jpeg > png; `None`
/// when no image type matches.
pub fn negotiate_format(accept: &str) -> Option<&'static str> {
    FORMAT_PREFERENCE
        .iter()
        .find(|(mime, _)| accept.contains(mime))
        .map(|(_, format)| *format)
}

/// Append the negotiated `f:<fmt>` directive after existing options.
///
/// Returns the options unchanged when negotiation yields nothing.
pub fn append_format(options: &str, accept: &str) -> String {
    match negotiate_format(accept) {
        Some(format) if options.is_empty() => format!("f:{}", format),
        Some(format) => format!("{}/f:{}", options, format),
        None => options.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
