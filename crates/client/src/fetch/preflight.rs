//! Fast reachability probe run before any render.
//!
//! A HEAD request decides most cases. Servers that refuse HEAD, answer it
//! with an unexpected 4xx, or drop the connection get one short GET.

use std::time::Duration;

use reqwest::{Method, StatusCode, Url};

use super::{ACCEPT_DOCUMENT, FetchClient, FetchError, is_ok_status};

const GET_MIN: Duration = Duration::from_millis(1000);
const GET_MAX: Duration = Duration::from_millis(2500);

/// Result of probing a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightOutcome {
    Ok,
    /// 401, 403 or 451.
    Blocked(u16),
    /// 5xx from the origin.
    UpstreamError(u16),
    /// Any other 4xx on the GET fallback.
    Rejected(u16),
    /// Timeout or transport failure.
    Timeout,
}

impl PreflightOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, PreflightOutcome::Ok)
    }

    /// HTTP status the capture endpoint answers with for this outcome.
    pub fn http_status(&self) -> u16 {
        match self {
            PreflightOutcome::Ok => 200,
            PreflightOutcome::Blocked(_) | PreflightOutcome::Rejected(_) => 403,
            PreflightOutcome::UpstreamError(_) | PreflightOutcome::Timeout => 504,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PreflightOutcome::Ok => "ok",
            PreflightOutcome::Blocked(_) => "preflight-blocked",
            PreflightOutcome::UpstreamError(_) => "preflight-upstream",
            PreflightOutcome::Rejected(_) => "preflight-rejected",
            PreflightOutcome::Timeout => "preflight-timeout",
        }
    }

    pub fn message(&self) -> String {
        match self {
            PreflightOutcome::Ok => "ok".to_string(),
            PreflightOutcome::Blocked(s) => format!("Blocked ({s})"),
            PreflightOutcome::UpstreamError(s) => format!("Upstream error ({s})"),
            PreflightOutcome::Rejected(s) => format!("Rejected ({s})"),
            PreflightOutcome::Timeout => "Preflight timeout or network error".to_string(),
        }
    }
}

enum HeadVerdict {
    Done(PreflightOutcome),
    TryGet,
}

fn classify_head(status: StatusCode) -> HeadVerdict {
    let code = status.as_u16();
    match code {
        405 | 501 => HeadVerdict::TryGet,
        _ if is_ok_status(status) => HeadVerdict::Done(PreflightOutcome::Ok),
        401 | 403 | 451 => HeadVerdict::Done(PreflightOutcome::Blocked(code)),
        _ if code >= 500 => HeadVerdict::Done(PreflightOutcome::UpstreamError(code)),
        _ => HeadVerdict::TryGet,
    }
}

fn classify_get(status: StatusCode) -> PreflightOutcome {
    let code = status.as_u16();
    match code {
        _ if is_ok_status(status) => PreflightOutcome::Ok,
        401 | 403 | 451 => PreflightOutcome::Blocked(code),
        _ if code >= 500 => PreflightOutcome::UpstreamError(code),
        _ => PreflightOutcome::Rejected(code),
    }
}

impl FetchClient {
    /// Probe `url` within `budget`. The GET fallback gets `budget` clamped
    /// to 1-2.5s.
    pub async fn preflight(&self, url: &Url, budget: Duration) -> PreflightOutcome {
        match self.probe(Method::HEAD, url, budget).await {
            Ok(status) => match classify_head(status) {
                HeadVerdict::Done(outcome) => {
                    tracing::debug!(%url, status = status.as_u16(), outcome = outcome.code(), "preflight HEAD");
                    return outcome;
                }
                HeadVerdict::TryGet => {
                    tracing::debug!(%url, status = status.as_u16(), "preflight HEAD inconclusive, trying GET");
                }
            },
            Err(FetchError::Timeout) => {
                tracing::debug!(%url, "preflight HEAD timed out");
                return PreflightOutcome::Timeout;
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "preflight HEAD failed, trying GET");
            }
        }

        let get_budget = budget.clamp(GET_MIN, GET_MAX);
        match self.probe(Method::GET, url, get_budget).await {
            Ok(status) => {
                let outcome = classify_get(status);
                tracing::debug!(%url, status = status.as_u16(), outcome = outcome.code(), "preflight GET");
                outcome
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "preflight GET failed");
                PreflightOutcome::Timeout
            }
        }
    }

    /// Send one probe and return its status without reading the body.
    async fn probe(&self, method: Method, url: &Url, budget: Duration) -> Result<StatusCode, FetchError> {
        let send = self.request(method, url, ACCEPT_DOCUMENT, budget).send();
        let response = tokio::time::timeout(budget, send).await.map_err(|_| FetchError::Timeout)??;
        Ok(response.status())
    }
}
