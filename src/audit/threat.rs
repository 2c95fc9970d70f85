//! Request threat scanning
//!
//! A pattern battery over inbound request material, a sliding-window rate
//! counter and a per-user suspicious-activity ledger. The scanner fails
//! open: an internal error yields a clean result with a warning rather
//! than blocking legitimate traffic.

use regex::Regex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::ThreatConfig;
use crate::error::{Error, Result};

use super::types::{ScanRequest, ThreatFinding, ThreatKind, ThreatScanResult, ThreatSeverity};

/// SQL keyword pairs that indicate injection attempts in query or body text
const SQL_INJECTION_PATTERN: &str =
    r"(?is)(union|select|insert|update|delete|drop|create|alter|exec|execute|script).*(from|into|where|set|table|database)";

const XSS_SCRIPT_TAG_PATTERN: &str = r"(?i)<script[^>]*>";
const XSS_JAVASCRIPT_URI_PATTERN: &str = r"(?i)javascript:";

const PAYLOAD_EVAL_PATTERN: &str = r"(?i)eval\s*\(";
const PAYLOAD_DOM_PATTERN: &str = r"(?i)document\.";

/// Methods that mutate state and therefore need CSRF headers
const MUTATING_METHODS: &[&str] = &["POST", "PUT", "DELETE", "PATCH"];

/// Risk score contributions for the suspicious-activity ledger
const SCORE_FAILED_LOGINS: f64 = 0.3;
const SCORE_UNUSUAL_ACCESS: f64 = 0.4;
const SCORE_PHI_VIOLATION: f64 = 0.5;
const SCORE_HIGH_RISK_ACTIONS: f64 = 0.3;
const FAILED_LOGIN_THRESHOLD: usize = 5;
const HIGH_RISK_ACTION_THRESHOLD: usize = 3;
const THREAT_SCORE_THRESHOLD: f64 = 0.7;

/// One kind of suspicious activity recorded against a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    FailedLogin,
    UnusualAccess,
    PhiViolation,
    HighRiskAction,
}

#[derive(Debug, Clone)]
struct ActivityRecord {
    kind: ActivityKind,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: i64,
}

/// Request threat scanner with rate limiting and an activity ledger
pub struct ThreatScanner {
    config: ThreatConfig,
    sql_injection: Regex,
    xss: Vec<(&'static str, Regex)>,
    payload: Vec<(&'static str, ThreatSeverity, Regex)>,
    rate: RwLock<HashMap<String, RateWindow>>,
    ledger: RwLock<HashMap<String, VecDeque<ActivityRecord>>>,
}

impl ThreatScanner {
    pub fn new(config: ThreatConfig) -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| Error::Config(format!("Invalid threat pattern: {}", e)))
        };
        Ok(Self {
            config,
            sql_injection: compile(SQL_INJECTION_PATTERN)?,
            xss: vec![
                ("xss_script_tag", compile(XSS_SCRIPT_TAG_PATTERN)?),
                ("xss_javascript_uri", compile(XSS_JAVASCRIPT_URI_PATTERN)?),
            ],
            payload: vec![
                ("payload_eval", ThreatSeverity::Critical, compile(PAYLOAD_EVAL_PATTERN)?),
                ("payload_dom_access", ThreatSeverity::High, compile(PAYLOAD_DOM_PATTERN)?),
            ],
            rate: RwLock::new(HashMap::new()),
            ledger: RwLock::new(HashMap::new()),
        })
    }

    /// Scan one inbound request. Rate limiting is included; the request
    /// identity is the user id when present, the source IP otherwise.
    pub async fn scan_request(&self, request: &ScanRequest) -> ThreatScanResult {
        let mut findings = Vec::new();

        let searchable = format!("{} {}", request.query, request.body);
        if self.sql_injection.is_match(&searchable) {
            findings.push(ThreatFinding::new(
                ThreatKind::SqlInjection,
                ThreatSeverity::Critical,
                "sql_keyword_pair",
            ));
        }
        for (rule, pattern) in &self.xss {
            if pattern.is_match(&searchable) {
                findings.push(ThreatFinding::new(
                    ThreatKind::CrossSiteScripting,
                    ThreatSeverity::High,
                    *rule,
                ));
            }
        }
        for (rule, severity, pattern) in &self.payload {
            if pattern.is_match(&request.body) {
                findings.push(ThreatFinding::new(ThreatKind::MaliciousPayload, *severity, *rule));
            }
        }
        self.check_csrf(request, &mut findings);

        let identity = request
            .user_id
            .clone()
            .or_else(|| request.source_ip.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        if !self.check_rate_limit(&identity, request.user_id.is_some()).await {
            findings.push(ThreatFinding::new(
                ThreatKind::RateLimitExceeded,
                ThreatSeverity::High,
                "rate_window_exceeded",
            ));
        }

        if !findings.is_empty() {
            tracing::warn!(
                identity = %identity,
                findings = findings.len(),
                "Threat scan produced findings"
            );
        }
        ThreatScanResult::from_findings(findings)
    }

    fn check_csrf(&self, request: &ScanRequest, findings: &mut Vec<ThreatFinding>) {
        if !MUTATING_METHODS.contains(&request.method.to_uppercase().as_str()) {
            return;
        }
        let referer = request.headers.get("referer");
        let origin = request.headers.get("origin");

        if referer.is_none() && origin.is_none() {
            findings.push(ThreatFinding::new(
                ThreatKind::CrossSiteRequestForgery,
                ThreatSeverity::Medium,
                "csrf_missing_origin_headers",
            ));
        } else if let Some(referer) = referer {
            let referer = referer.to_lowercase();
            if referer.contains("null") || referer.contains("about:blank") {
                findings.push(ThreatFinding::new(
                    ThreatKind::CrossSiteRequestForgery,
                    ThreatSeverity::Medium,
                    "csrf_suspicious_referer",
                ));
            }
        }
    }

    /// Sliding-window rate check. The window resets lazily when the first
    /// request after expiry arrives. Returns whether the request is allowed.
    pub async fn check_rate_limit(&self, identity: &str, authenticated: bool) -> bool {
        let limit = if authenticated {
            self.config.max_requests_authenticated
        } else {
            self.config.max_requests_anonymous
        };
        let window_ms = self.config.rate_window_secs as i64 * 1000;
        let now = chrono::Utc::now().timestamp_millis();

        let mut rate = self.rate.write().await;
        let window = rate.entry(identity.to_string()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });
        if now - window.window_start >= window_ms {
            window.count = 0;
            window.window_start = now;
        }
        window.count += 1;
        window.count <= limit
    }

    /// Rate check that surfaces as a retryable error, for callers that
    /// gate an operation rather than collect findings.
    pub async fn enforce_rate_limit(&self, identity: &str, authenticated: bool) -> Result<()> {
        if self.check_rate_limit(identity, authenticated).await {
            Ok(())
        } else {
            Err(Error::RateLimited(identity.to_string()))
        }
    }

    /// Record one suspicious activity against a user. The ledger is capped;
    /// the oldest entry is dropped when full.
    pub async fn record_activity(&self, user_id: &str, kind: ActivityKind) {
        let mut ledger = self.ledger.write().await;
        let entries = ledger.entry(user_id.to_string()).or_default();
        if entries.len() >= self.config.activity_ledger_size {
            entries.pop_front();
        }
        entries.push_back(ActivityRecord { kind });
    }

    /// Cumulative risk score for a user from the activity ledger, 0.0 to 1.5
    pub async fn risk_score(&self, user_id: &str) -> f64 {
        let ledger = self.ledger.read().await;
        let Some(entries) = ledger.get(user_id) else {
            return 0.0;
        };

        let count = |kind: ActivityKind| entries.iter().filter(|r| r.kind == kind).count();

        let mut score = 0.0;
        if count(ActivityKind::FailedLogin) > FAILED_LOGIN_THRESHOLD {
            score += SCORE_FAILED_LOGINS;
        }
        if count(ActivityKind::UnusualAccess) > 0 {
            score += SCORE_UNUSUAL_ACCESS;
        }
        if count(ActivityKind::PhiViolation) > 0 {
            score += SCORE_PHI_VIOLATION;
        }
        if count(ActivityKind::HighRiskAction) > HIGH_RISK_ACTION_THRESHOLD {
            score += SCORE_HIGH_RISK_ACTIONS;
        }
        score
    }

    /// Whether the user's accumulated activity marks them as a threat
    pub async fn is_user_threat(&self, user_id: &str) -> bool {
        self.risk_score(user_id).await > THREAT_SCORE_THRESHOLD
    }
}
