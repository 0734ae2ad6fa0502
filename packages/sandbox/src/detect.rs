// ABOUTME: Dev server readiness detection from process output
// ABOUTME: Recognizes the "listening" lines printed by Vite, Next.js, Express and similar servers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::providers::ServerReady;

static ANSI_ESCAPE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").ok());

// Ordered from most to least specific
static PORT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"Local:\s+https?://[^\s/]*:(\d+)", // Vite, Next.js 13+: "Local:   http://localhost:5173/"
        r"Local server:\s+https?://[^\s/]*:(\d+)",
        r"ready - started server on .*:(\d+)", // Next.js 12: "ready - started server on 0.0.0.0:3000"
        r"(?:Server ready|Running) at https?://[^\s/]*:(\d+)",
        r"(?i)server (?:is )?(?:running|listening) on port (\d+)", // Express
        r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]):(\d+)",
        r"localhost:(\d+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Strip terminal color codes so patterns match colored output
pub fn strip_ansi(line: &str) -> String {
    match ANSI_ESCAPE.as_ref() {
        Some(regex) => regex.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

/// Extract the listening port from a dev server log line
pub fn extract_port_from_log(line: &str) -> Option<u16> {
    let line = strip_ansi(line);
    PORT_PATTERNS.iter().find_map(|regex| {
        regex
            .captures(&line)
            .and_then(|captures| captures.get(1))
            .and_then(|port| port.as_str().parse::<u16>().ok())
            .filter(|port| *port != 0)
    })
}

/// Turn a log line into a readiness notification when it announces a listening server
pub fn detect_server_ready(line: &str) -> Option<ServerReady> {
    extract_port_from_log(line).map(|port| ServerReady {
        port,
        url: format!("http://localhost:{}", port),
    })
}
