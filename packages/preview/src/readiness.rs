use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Ordered URL/port detection patterns, most specific first: labeled
/// local-address forms, then network-address forms, then generic
/// `host:port` forms. The first pattern that matches wins for a scan.
static URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Local:\s*(https?://[^\s\]]+)",
        r"(?i)Network:\s*(https?://[^\s\]]+)",
        r"(?i)Server running at\s*(https?://[^\s\]]+)",
        r"https?://localhost:\d+",
        r"(?i)localhost:(\d+)",
        r"127\.0\.0\.1:(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("readiness pattern is valid"))
    .collect()
});

/// Any 4-5 digit run, for the last-resort port extraction
static PORT_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4,5}").expect("port digits pattern is valid"));

/// Reconstruct a loopback URL from a bare port
pub fn loopback_url(port: &str) -> String {
    format!("http://localhost:{}", port)
}

/// Scan the rolling output window for a servable URL.
///
/// Applies the ordered pattern list; a match that captured only a port is
/// reconstructed into a loopback URL, a full URL is returned exactly as
/// printed.
pub fn scan_output(output: &str) -> Option<String> {
    for pattern in URL_PATTERNS.iter() {
        let Some(captures) = pattern.captures(output) else {
            continue;
        };
        let matched = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())?;

        let url = if matched.starts_with("http") {
            matched
        } else {
            let digits = PORT_DIGITS
                .find(&matched)
                .map(|m| m.as_str())
                .or_else(|| matched.rfind(':').map(|i| &matched[i + 1..]))?;
            loopback_url(digits)
        };

        debug!(pattern = pattern.as_str(), url = %url, "detected server url");
        return Some(url);
    }
    None
}

/// Last-resort pass: extract the most recent 4-5 digit number from the
/// output and treat it as the server port
pub fn last_resort_port(output: &str) -> Option<String> {
    PORT_DIGITS
        .find_iter(output)
        .last()
        .map(|m| loopback_url(m.as_str()))
}
