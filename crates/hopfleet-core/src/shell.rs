//! Building remote command lines.

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchUrlError {
    #[error("invalid url {url}: {reason}")]
    Invalid { url: String, reason: String },
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
}

/// Escape `s` for a POSIX shell.
///
/// Values made only of safe characters pass through bare; anything else is
/// single-quoted, with embedded quotes written as `'\''`.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | ',' | '@'))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Command that streams the body at `url` to stdout and prints only errors on stderr.
pub fn fetch_command(url: &str) -> Result<String, FetchUrlError> {
    let parsed = Url::parse(url).map_err(|e| FetchUrlError::Invalid {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" | "ftp" => Ok(format!("wget -qO- {}", quote(parsed.as_str()))),
        other => Err(FetchUrlError::UnsupportedScheme(other.to_string())),
    }
}
