//! Fetching of binary assets (fonts, background images) from a file path or URL.

use std::io::Read;
use std::time::Duration;

/// Reads `location` as an `http(s)://` URL or a local file path.
///
/// Errors are returned as plain messages so callers can wrap them in the
/// error variant that fits the asset being loaded.
pub(crate) fn fetch_bytes(location: &str, timeout: Option<Duration>) -> Result<Vec<u8>, String> {
    if is_url(location) {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let agent = builder.build();

        let response = agent
            .get(location)
            .call()
            .map_err(|e| format!("Failed to fetch URL: {}", e))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| format!("Failed to read response: {}", e))?;
        Ok(bytes)
    } else {
        std::fs::read(location).map_err(|e| format!("{}: {}", location, e))
    }
}

pub(crate) fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/font.ttf"));
        assert!(is_url("http://localhost/bg.png"));
        assert!(!is_url("fonts/andalus.ttf"));
        assert!(!is_url("/tmp/https-font.ttf"));
    }

    #[test]
    fn test_fetch_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"font-bytes").unwrap();

        let bytes = fetch_bytes(file.path().to_str().unwrap(), None).unwrap();
        assert_eq!(bytes, b"font-bytes");
    }

    #[test]
    fn test_fetch_missing_file_names_location() {
        let err = fetch_bytes("does/not/exist.ttf", None).unwrap_err();
        assert!(err.starts_with("does/not/exist.ttf:"), "got: {}", err);
    }
}
