use crate::analytics::outlier::{OutlierEngine, ThresholdPolicy};
use crate::analytics::{mean, VisitorSession};
use serde::Serialize;

/// Minimum number of visitors before bot detection runs.
pub const MIN_BOT_SESSIONS: usize = 10;

/// Expected share of automated visitors.
pub const DEFAULT_BOT_CONTAMINATION: f64 = 0.05;

/// User-agent score above which the UA alone is suspicious.
const SUSPICIOUS_UA_SCORE: f64 = 0.8;

pub const HIGH_REQUEST_VOLUME: &str = "High Request Volume";
pub const ABNORMAL_REQUEST_RATE: &str = "Abnormal Request Rate";
pub const SUSPICIOUS_USER_AGENT: &str = "Suspicious User Agent";
pub const UNUSUAL_PATTERN: &str = "Unusual Pattern";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotRecord {
    pub identifier_hash: String,
    pub request_count: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotResult {
    pub detected_bots_count: usize,
    pub bots: Vec<BotRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-session features fed to the outlier engine.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SessionFeatures {
    request_count: f64,
    request_rate: f64,
    ua_score: f64,
}

impl SessionFeatures {
    #[allow(clippy::cast_precision_loss)]
    fn from_session(session: &VisitorSession) -> Self {
        Self {
            request_count: session.request_count as f64,
            request_rate: session.request_rate(),
            ua_score: session.ua_score.unwrap_or(0.0),
        }
    }

    fn to_vec(self) -> Vec<f64> {
        vec![self.request_count, self.request_rate, self.ua_score]
    }
}

/// Dataset-wide means the reason checks compare against.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    request_count: f64,
    request_rate: f64,
}

/// Reason codes for a flagged session, in check order.
fn reasons(features: SessionFeatures, baseline: Baseline) -> Vec<&'static str> {
    let mut reasons = Vec::with_capacity(3);
    if features.request_count > baseline.request_count * 2.0 {
        reasons.push(HIGH_REQUEST_VOLUME);
    }
    if features.request_rate > baseline.request_rate * 2.0 {
        reasons.push(ABNORMAL_REQUEST_RATE);
    }
    if features.ua_score > SUSPICIOUS_UA_SCORE {
        reasons.push(SUSPICIOUS_USER_AGENT);
    }
    if reasons.is_empty() {
        reasons.push(UNUSUAL_PATTERN);
    }
    reasons
}

/// Flag the most anomalous `contamination` share of sessions as likely bots.
pub fn detect_bots(
    engine: &OutlierEngine,
    sessions: &[VisitorSession],
    contamination: f64,
) -> BotResult {
    if sessions.len() < MIN_BOT_SESSIONS {
        return BotResult {
            detected_bots_count: 0,
            bots: Vec::new(),
            message: Some(format!(
                "Not enough data for bot detection (need > {MIN_BOT_SESSIONS} visitors)"
            )),
        };
    }

    let features: Vec<SessionFeatures> = sessions.iter().map(SessionFeatures::from_session).collect();
    let matrix: Vec<Vec<f64>> = features.iter().map(|f| f.to_vec()).collect();
    let report = engine.detect(&matrix, ThresholdPolicy::Contamination(contamination));

    let baseline = Baseline {
        request_count: mean(features.iter().map(|f| f.request_count)),
        request_rate: mean(features.iter().map(|f| f.request_rate)),
    };

    let bots: Vec<BotRecord> = report
        .outlier_indices()
        .map(|i| BotRecord {
            identifier_hash: sessions[i].identifier_hash.clone(),
            request_count: sessions[i].request_count,
            reason: reasons(features[i], baseline).join(", "),
        })
        .collect();

    tracing::debug!(
        sessions = sessions.len(),
        flagged = bots.len(),
        "Bot detection complete"
    );

    BotResult {
        detected_bots_count: bots.len(),
        bots,
        message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::session;

    /// `count` ordinary visitors: a handful of requests over ten minutes.
    fn humans(count: usize) -> Vec<VisitorSession> {
        (0..count)
            .map(|i| {
                let requests = 5 + (i as u64 % 5);
                session(
                    &format!("human-{i:03}"),
                    600 + (i as i64 % 7) * 30,
                    requests,
                    Some(0.1),
                )
            })
            .collect()
    }

    #[test]
    fn test_insufficient_sessions() {
        let result = detect_bots(&OutlierEngine::default(), &humans(9), DEFAULT_BOT_CONTAMINATION);
        assert_eq!(result.detected_bots_count, 0);
        assert!(result.bots.is_empty());
        assert!(result.message.unwrap().contains("Not enough data"));
    }

    #[test]
    fn test_minimum_sessions_runs_detection() {
        let result = detect_bots(&OutlierEngine::default(), &humans(10), DEFAULT_BOT_CONTAMINATION);
        assert!(result.message.is_none());
        // round(0.05 * 10) = 1
        assert_eq!(result.detected_bots_count, 1);
    }

    #[test]
    fn test_obvious_bot_has_all_reasons() {
        let mut sessions = humans(19);
        sessions.push(session("crawler", 10, 500, Some(0.9)));

        let result = detect_bots(&OutlierEngine::default(), &sessions, DEFAULT_BOT_CONTAMINATION);
        assert_eq!(result.detected_bots_count, 1);
        assert_eq!(
            result.bots,
            vec![BotRecord {
                identifier_hash: "crawler".to_string(),
                request_count: 500,
                reason: "High Request Volume, Abnormal Request Rate, Suspicious User Agent"
                    .to_string(),
            }]
        );
    }

    #[test]
    fn test_reason_order_and_fallback() {
        let baseline = Baseline {
            request_count: 10.0,
            request_rate: 0.5,
        };
        let all = SessionFeatures {
            request_count: 25.0,
            request_rate: 1.5,
            ua_score: 0.9,
        };
        assert_eq!(
            reasons(all, baseline),
            vec![HIGH_REQUEST_VOLUME, ABNORMAL_REQUEST_RATE, SUSPICIOUS_USER_AGENT]
        );

        let plain = SessionFeatures {
            request_count: 12.0,
            request_rate: 0.6,
            ua_score: 0.8,
        };
        assert_eq!(reasons(plain, baseline), vec![UNUSUAL_PATTERN]);

        let rate_only = SessionFeatures {
            request_count: 20.0,
            request_rate: 1.01,
            ua_score: 0.0,
        };
        assert_eq!(reasons(rate_only, baseline), vec![ABNORMAL_REQUEST_RATE]);
    }

    #[test]
    fn test_flagged_session_without_clear_signal_is_unusual_pattern() {
        // Only the UA score separates this visitor, and it stays below the
        // suspicious cutoff; volume and rate match everyone else.
        let mut sessions: Vec<VisitorSession> = (0..19)
            .map(|i| session(&format!("regular-{i:02}"), 600, 5, Some(0.1)))
            .collect();
        sessions.push(session("odd-one", 600, 5, Some(0.5)));

        let result = detect_bots(&OutlierEngine::default(), &sessions, DEFAULT_BOT_CONTAMINATION);
        assert_eq!(
            result.bots,
            vec![BotRecord {
                identifier_hash: "odd-one".to_string(),
                request_count: 5,
                reason: UNUSUAL_PATTERN.to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_ua_score_is_zero() {
        let features = SessionFeatures::from_session(&session("x", 0, 3, None));
        assert!(features.ua_score.abs() < f64::EPSILON);
        assert!((features.request_rate - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contamination_fraction() {
        let sessions = humans(60);
        let result = detect_bots(&OutlierEngine::default(), &sessions, DEFAULT_BOT_CONTAMINATION);
        assert_eq!(result.detected_bots_count, 3);
        assert_eq!(result.bots.len(), 3);
    }

    #[test]
    fn test_reproducible() {
        let mut sessions = humans(40);
        sessions.push(session("scraper", 30, 300, Some(0.3)));
        sessions.push(session("headless", 5, 40, Some(0.95)));
        let engine = OutlierEngine::default();
        let a = detect_bots(&engine, &sessions, DEFAULT_BOT_CONTAMINATION);
        let b = detect_bots(&engine, &sessions, DEFAULT_BOT_CONTAMINATION);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
