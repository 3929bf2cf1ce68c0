use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the calendar document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarSource {
    Url(String),
    File(PathBuf),
}

impl CalendarSource {
    /// Read the raw calendar bytes. Any failure here is a `Transport` error.
    pub fn fetch(&self) -> TrackerResult<Vec<u8>> {
        match self {
            CalendarSource::Url(url) => fetch_url(url),
            CalendarSource::File(path) => fs::read(path).map_err(|e| {
                TrackerError::Transport(format!("could not read {}: {e}", path.display()))
            }),
        }
    }
}

/// Prefix `https://` unless the URL already names an http(s) scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn fetch_url(url: &str) -> TrackerResult<Vec<u8>> {
    let url = normalize_url(url);
    debug!(%url, "fetching calendar");

    let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let response = client.get(&url).send()?.error_for_status()?;
    let ics_data = response.bytes()?;

    Ok(ics_data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("calendar.example.com/feed.ics", "https://calendar.example.com/feed.ics")]
    #[case("http://calendar.example.com/feed.ics", "http://calendar.example.com/feed.ics")]
    #[case(" https://calendar.example.com/feed.ics ", "https://calendar.example.com/feed.ics")]
    fn test_normalize_url(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_url(input), expected);
    }

    #[test]
    fn test_fetch_url_returns_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/test.ics")
            .with_status(200)
            .with_body("BEGIN:VCALENDAR\nEND:VCALENDAR\n")
            .create();

        let source = CalendarSource::Url(format!("{}/test.ics", server.url()));
        let bytes = source.fetch().expect("fetch should succeed");

        mock.assert();
        assert!(bytes.starts_with(b"BEGIN:VCALENDAR"));
    }

    #[test]
    fn test_fetch_url_rejects_error_status() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/missing.ics").with_status(404).create();

        let source = CalendarSource::Url(format!("{}/missing.ics", server.url()));
        assert!(matches!(source.fetch(), Err(TrackerError::Transport(_))));
    }

    #[test]
    fn test_fetch_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "BEGIN:VCALENDAR").unwrap();

        let source = CalendarSource::File(file.path().to_path_buf());
        assert_eq!(source.fetch().unwrap(), b"BEGIN:VCALENDAR".to_vec());
    }

    #[test]
    fn test_fetch_missing_file_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CalendarSource::File(dir.path().join("nope.ics"));
        assert!(matches!(source.fetch(), Err(TrackerError::Transport(_))));
    }
}
