//! Canonical request construction for AWS Signature Version 4.
//!
//! The canonical request is the normalized, byte-exact representation of an
//! HTTP request that both the signer and the verifier must reconstruct
//! identically:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Because esgate is the signing side (not the verifying side), query
//! parameters are decoded and strictly re-encoded here: canonicalization must
//! be idempotent regardless of how the client chose to encode its query. The
//! path is the opposite: it is URI-escaped once more exactly as received,
//! without decoding, so existing percent-escapes are double-encoded. That is
//! the rule for every service except S3, and it is what the upstream
//! reconstructs when verifying.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters that must be percent-encoded in URI path segments and query
/// parts. Everything except the RFC 3986 unreserved set
/// (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) is encoded. Forward slashes in the
/// path are preserved by encoding each segment separately.
const STRICT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the full canonical request string from its components.
///
/// `canonical_headers` must be the newline-joined header block without a
/// trailing newline (the required blank line is inserted here), and
/// `signed_headers` the semicolon-joined lowercase name list, both as
/// produced by [`build_canonical_headers`].
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(path);
    let canonical_query = build_canonical_query_string(query);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers}\n{payload_hash}"
    )
}

/// Build the canonical URI by URI-escaping each segment of the path exactly
/// as received.
///
/// Segments are never decoded: a segment that arrives percent-encoded is
/// escaped once more, turning `%` into `%25`. Empty paths normalize to `/`.
///
/// # Examples
///
/// ```
/// use esgate_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri("/_search"), "/_search");
/// assert_eq!(build_canonical_uri(""), "/");
/// assert_eq!(build_canonical_uri("/hello world"), "/hello%20world");
/// assert_eq!(build_canonical_uri("/hello%20world"), "/hello%2520world");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| utf8_percent_encode(segment, STRICT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string.
///
/// The query is split into `key=value` pairs, each key and value is decoded
/// and strictly re-encoded independently, and the pairs are sorted by key
/// bytes (then by value for duplicate keys). The result is stable under
/// repeated canonicalization.
///
/// # Examples
///
/// ```
/// use esgate_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string(""), "");
/// assert_eq!(build_canonical_query_string("b=2&a=1"), "a=1&b=2");
/// assert_eq!(build_canonical_query_string("q=hello world"), "q=hello%20world");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            (reencode(key), reencode(value))
        })
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical header block and the signed-headers list.
///
/// Header names are lowercased, values trimmed with internal whitespace runs
/// collapsed, and entries sorted by name. Returns the newline-joined header
/// block (no trailing newline) and the semicolon-joined name list, in the
/// same order. Input casing does not affect the output.
///
/// # Examples
///
/// ```
/// use esgate_auth::canonical::build_canonical_headers;
///
/// let (block, list) = build_canonical_headers(&[
///     ("X-Amz-Date", "20150830T123600Z"),
///     ("Host", "example.amazonaws.com"),
/// ]);
/// assert_eq!(block, "host:example.amazonaws.com\nx-amz-date:20150830T123600Z");
/// assert_eq!(list, "host;x-amz-date");
/// ```
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)]) -> (String, String) {
    let mut entries: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), collapse_whitespace(value.trim())))
        .collect();

    entries.sort_unstable();

    let block = entries
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let list = entries
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    (block, list)
}

/// Decode a query key or value and re-encode it with the strict SigV4 rules,
/// so query canonicalization is idempotent.
fn reencode(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    utf8_percent_encode(&decoded, STRICT_ENCODE_SET).to_string()
}

/// Collapse consecutive whitespace characters to a single space.
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_normalize_empty_path_to_slash() {
        assert_eq!(build_canonical_uri(""), "/");
        assert_eq!(build_canonical_uri("/"), "/");
    }

    #[test]
    fn test_should_preserve_slashes_in_path() {
        assert_eq!(
            build_canonical_uri("/index/type/_search"),
            "/index/type/_search"
        );
    }

    #[test]
    fn test_should_encode_special_characters_in_path() {
        assert_eq!(build_canonical_uri("/hello world"), "/hello%20world");
        assert_eq!(build_canonical_uri("/a:b"), "/a%3Ab");
    }

    #[test]
    fn test_should_escape_encoded_path_segments_once_more() {
        assert_eq!(build_canonical_uri("/hello%20world"), "/hello%2520world");
        assert_eq!(
            build_canonical_uri("/index/_doc/a%2Fb"),
            "/index/_doc/a%252Fb"
        );
    }

    #[test]
    fn test_should_sort_query_parameters_by_key() {
        assert_eq!(build_canonical_query_string("b=2&a=1&c=3"), "a=1&b=2&c=3");
    }

    #[test]
    fn test_should_sort_duplicate_query_keys_by_value() {
        assert_eq!(build_canonical_query_string("k=2&k=1"), "k=1&k=2");
    }

    #[test]
    fn test_should_return_empty_for_empty_query() {
        assert_eq!(build_canonical_query_string(""), "");
    }

    #[test]
    fn test_should_encode_query_values_strictly() {
        assert_eq!(
            build_canonical_query_string("events=s3:ObjectCreated:*"),
            "events=s3%3AObjectCreated%3A%2A"
        );
    }

    #[test]
    fn test_should_treat_valueless_parameters_as_empty() {
        assert_eq!(build_canonical_query_string("flag"), "flag=");
    }

    #[test]
    fn test_should_canonicalize_query_idempotently() {
        let inputs = [
            "b=2&a=1",
            "q=hello world&size=10",
            "events=s3%3AObjectCreated%3A%2A&prefix=test",
            "k=%E2%9C%93",
        ];
        for input in inputs {
            let once = build_canonical_query_string(input);
            let twice = build_canonical_query_string(&once);
            assert_eq!(once, twice, "canonicalization of {input:?} not stable");
        }
    }

    #[test]
    fn test_should_lowercase_and_sort_headers() {
        let (block, list) = build_canonical_headers(&[
            ("X-Amz-Date", "20150830T123600Z"),
            ("HOST", "example.amazonaws.com"),
        ]);
        assert_eq!(
            block,
            "host:example.amazonaws.com\nx-amz-date:20150830T123600Z"
        );
        assert_eq!(list, "host;x-amz-date");
    }

    #[test]
    fn test_should_ignore_header_name_casing() {
        let upper = build_canonical_headers(&[("HOST", "h"), ("X-AMZ-DATE", "d")]);
        let lower = build_canonical_headers(&[("host", "h"), ("x-amz-date", "d")]);
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_should_trim_and_collapse_header_values() {
        let (block, _) = build_canonical_headers(&[("Host", "  example.com  "), ("X-C", "a   b")]);
        assert_eq!(block, "host:example.com\nx-c:a b");
    }

    #[test]
    fn test_should_build_canonical_request_shape() {
        let (block, list) = build_canonical_headers(&[
            ("host", "example.amazonaws.com"),
            ("x-amz-date", "20150830T123600Z"),
        ]);
        let canonical = build_canonical_request(
            "GET",
            "/",
            "",
            &block,
            &list,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
        let expected = "GET\n\
                        /\n\
                        \n\
                        host:example.amazonaws.com\n\
                        x-amz-date:20150830T123600Z\n\
                        \n\
                        host;x-amz-date\n\
                        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical, expected);

        // Hash of the canonical request per the AWS "get-vanilla" test vector.
        use sha2::{Digest, Sha256};
        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(
            hash,
            "bb579772317eb040ac9ed261061d46c1f17a8133879d6129b6e1c25292927e63"
        );
    }
}
