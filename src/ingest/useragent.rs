//! User-Agent heuristics producing the `ua_score` used by bot detection.
//!
//! Plain substring matching; no full UA parser is needed for a suspicion score.

/// Tokens that only automated clients put in their User-Agent.
const AUTOMATION_TOKENS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "slurp",
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "java/",
    "okhttp",
    "libwww",
    "httpclient",
    "headless",
    "phantomjs",
    "puppeteer",
    "playwright",
    "selenium",
    "scrapy",
];

const EMPTY_UA_SCORE: f64 = 1.0;
const AUTOMATION_SCORE: f64 = 0.95;
const BASELINE_SCORE: f64 = 0.1;
const NO_BROWSER_PENALTY: f64 = 0.4;
const NO_OS_PENALTY: f64 = 0.2;

/// Suspicion score in `[0, 1]`; higher means more likely automated.
pub fn ua_score(ua: &str) -> f64 {
    let ua = ua.trim();
    if ua.is_empty() {
        return EMPTY_UA_SCORE;
    }

    let lower = ua.to_ascii_lowercase();
    if AUTOMATION_TOKENS.iter().any(|token| lower.contains(token)) {
        return AUTOMATION_SCORE;
    }

    let mut score = BASELINE_SCORE;
    if detect_browser(ua).is_none() {
        score += NO_BROWSER_PENALTY;
    }
    if detect_os(ua).is_none() {
        score += NO_OS_PENALTY;
    }
    score.min(1.0)
}

fn detect_browser(ua: &str) -> Option<&'static str> {
    // Order matters: check more specific patterns first
    if ua.contains("Edg/") || ua.contains("Edge/") {
        Some("Edge")
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Chrome/") || ua.contains("Chromium/") {
        Some("Chrome")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else if ua.contains("Firefox/") {
        Some("Firefox")
    } else {
        None
    }
}

fn detect_os(ua: &str) -> Option<&'static str> {
    if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        // iPhone UAs also contain "Mac OS X"
        Some("iOS")
    } else if ua.contains("Mac OS X") || ua.contains("macOS") {
        Some("macOS")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else if ua.contains("CrOS") {
        Some("Chrome OS")
    } else {
        None
    }
}
