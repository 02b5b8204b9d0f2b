//! Per-language batch submission.
//!
//! Groups are handled one after another; each group gets at most one POST and a
//! failure in one group never stops the others.
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::calling::{BatchCallingService, CallingError};
use crate::config::{CallNameSuffix, Config};
use crate::model::{BatchRequest, LanguageGroup};

/// Result of one language group's submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { language: String, batch_id: String },
    /// No agent is configured for the language.
    Skipped { language: String },
    Failed {
        language: String,
        reason: FailureReason,
        /// Pretty-printed request body that was sent, for diagnosis.
        request: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Non-2xx response from the remote API.
    Rejected { status: u16, body: String },
    /// Timeout, connection error or unusable endpoint.
    Transport(String),
}

impl SubmitOutcome {
    pub fn language(&self) -> &str {
        match self {
            SubmitOutcome::Submitted { language, .. }
            | SubmitOutcome::Skipped { language }
            | SubmitOutcome::Failed { language, .. } => language,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SubmitOutcome::Failed { .. })
    }

    /// Request body of a failed submission.
    pub fn failed_request(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Failed { request, .. } => Some(request),
            _ => None,
        }
    }
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitOutcome::Submitted { language, batch_id } => {
                write!(f, "{} → Batch ID: {}", language.to_uppercase(), batch_id)
            }
            SubmitOutcome::Skipped { language } => write!(
                f,
                "{} → skipped: no agent configured for language",
                language.to_uppercase()
            ),
            SubmitOutcome::Failed {
                language,
                reason: FailureReason::Rejected { status, body },
                ..
            } => write!(f, "{} → HTTP {}: {}", language.to_uppercase(), status, body),
            SubmitOutcome::Failed {
                language,
                reason: FailureReason::Transport(err),
                ..
            } => write!(f, "{} → request failed: {}", language.to_uppercase(), err),
        }
    }
}

impl From<CallingError> for FailureReason {
    fn from(err: CallingError) -> Self {
        match err {
            CallingError::Rejected { status, body } => FailureReason::Rejected { status, body },
            other => FailureReason::Transport(other.to_string()),
        }
    }
}

/// A group ready to send, or the reason it will not be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedBatch {
    Ready {
        language: String,
        request: BatchRequest,
    },
    Skipped {
        language: String,
    },
}

/// Builds `{prefix}-{language}-{timestamp}` call names with an optional suffix.
#[derive(Debug)]
pub struct CallNamer {
    prefix: String,
    suffix: CallNameSuffix,
    counter: AtomicU64,
}

impl CallNamer {
    pub fn new(prefix: impl Into<String>, suffix: CallNameSuffix) -> Self {
        Self {
            prefix: prefix.into(),
            suffix,
            counter: AtomicU64::new(0),
        }
    }

    pub fn name(&self, language: &str, now: DateTime<Utc>) -> String {
        let base = format!(
            "{}-{}-{}",
            self.prefix,
            language,
            now.format("%Y-%m-%dT%H:%M:%S")
        );
        match self.suffix {
            CallNameSuffix::None => base,
            CallNameSuffix::Counter => {
                let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
                format!("{base}-{n}")
            }
            CallNameSuffix::Random => {
                let id = Uuid::new_v4().simple().to_string();
                format!("{base}-{}", &id[..8])
            }
        }
    }
}

pub struct BatchSubmitter<'a> {
    cfg: &'a Config,
    service: &'a dyn BatchCallingService,
    namer: CallNamer,
}

impl<'a> BatchSubmitter<'a> {
    pub fn new(cfg: &'a Config, service: &'a dyn BatchCallingService) -> Self {
        let namer = CallNamer::new(cfg.batch.call_name_prefix.clone(), cfg.batch.call_name_suffix);
        Self {
            cfg,
            service,
            namer,
        }
    }

    /// `now` minus the configured backdate.
    pub fn scheduled_time_unix(&self, now: DateTime<Utc>) -> i64 {
        let backdate = i64::try_from(self.cfg.batch.schedule_backdate_seconds).unwrap_or(0);
        now.timestamp().saturating_sub(backdate)
    }

    pub fn build_request(
        &self,
        group: &LanguageGroup,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> BatchRequest {
        BatchRequest {
            call_name: self.namer.name(&group.language, now),
            agent_id: agent_id.to_string(),
            agent_phone_number_id: self.cfg.api.phone_number_id.clone(),
            scheduled_time_unix: self.scheduled_time_unix(now),
            recipients: group.recipients.clone(),
        }
    }

    fn plan_group(&self, group: &LanguageGroup, now: DateTime<Utc>) -> PlannedBatch {
        match self.cfg.agent_for(&group.language) {
            Some(agent_id) => PlannedBatch::Ready {
                language: group.language.clone(),
                request: self.build_request(group, agent_id, now),
            },
            None => PlannedBatch::Skipped {
                language: group.language.clone(),
            },
        }
    }

    /// Resolve agents and build every request without sending anything.
    pub fn plan(&self, groups: &[LanguageGroup], now: DateTime<Utc>) -> Vec<PlannedBatch> {
        groups.iter().map(|group| self.plan_group(group, now)).collect()
    }

    pub async fn submit_all(&self, groups: &[LanguageGroup]) -> Vec<SubmitOutcome> {
        self.submit_with_clock(groups, Utc::now).await
    }

    /// Submit with every group stamped at the same fixed instant.
    pub async fn submit_all_at(
        &self,
        groups: &[LanguageGroup],
        now: DateTime<Utc>,
    ) -> Vec<SubmitOutcome> {
        self.submit_with_clock(groups, || now).await
    }

    /// Submit each group in turn. `clock` is read right before each group's
    /// request is built.
    #[instrument(skip_all, fields(groups = groups.len()))]
    pub async fn submit_with_clock<F>(&self, groups: &[LanguageGroup], clock: F) -> Vec<SubmitOutcome>
    where
        F: Fn() -> DateTime<Utc>,
    {
        let mut outcomes = Vec::with_capacity(groups.len());
        for group in groups {
            let outcome = match self.plan_group(group, clock()) {
                PlannedBatch::Skipped { language } => {
                    warn!(%language, "no agent configured for language; skipping group");
                    SubmitOutcome::Skipped { language }
                }
                PlannedBatch::Ready { language, request } => {
                    self.submit_one(language, &request).await
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn submit_one(&self, language: String, request: &BatchRequest) -> SubmitOutcome {
        match self.service.submit_batch(request).await {
            Ok(batch_id) => {
                info!(
                    %language,
                    %batch_id,
                    call_name = %request.call_name,
                    recipients = request.recipients.len(),
                    "batch submitted"
                );
                SubmitOutcome::Submitted { language, batch_id }
            }
            Err(err) => {
                let payload = serde_json::to_string_pretty(request).unwrap_or_default();
                warn!(%language, error = %err, %payload, "batch submission failed");
                SubmitOutcome::Failed {
                    language,
                    reason: err.into(),
                    request: payload,
                }
            }
        }
    }
}
