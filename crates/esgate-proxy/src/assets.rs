//! Static-asset cache-control policy.
//!
//! A cosmetic optimization independent of signing correctness: responses for
//! recognizable static-asset paths get a long-lived public `Cache-Control`
//! so dashboards load faster through the proxy. The recognized extensions
//! are an explicit, enumerated set rather than ad hoc pattern matching.

/// File extensions treated as static assets.
const STATIC_ASSET_EXTENSIONS: &[&str] = &["css", "js", "img", "font"];

/// The directive applied to static-asset responses.
pub const STATIC_CACHE_CONTROL: &str = "public, max-age=86400";

/// Whether a request path names a static asset, judged by the extension of
/// its final segment.
#[must_use]
pub fn is_static_asset(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((_, ext)) => STATIC_ASSET_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_recognize_asset_extensions() {
        assert!(is_static_asset("/_plugin/kibana/app.css"));
        assert!(is_static_asset("/bundle.js"));
        assert!(is_static_asset("/logo.img"));
        assert!(is_static_asset("/ui/main.FONT"));
    }

    #[test]
    fn test_should_ignore_non_asset_paths() {
        assert!(!is_static_asset("/_search"));
        assert!(!is_static_asset("/"));
        assert!(!is_static_asset("/index/doc/1"));
        assert!(!is_static_asset("/style.css/extra"));
    }

    #[test]
    fn test_should_use_final_extension_only() {
        assert!(is_static_asset("/app.min.js"));
        assert!(!is_static_asset("/archive.js.gz"));
    }
}
