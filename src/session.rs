//! Gap resolution dialogue for one model.
//!
//! The session owns the current snapshot of the model and every earlier
//! accepted snapshot. Answers go through [`merge_answer`], the defaulting
//! policy and validation before they replace the current snapshot; an answer
//! that fails any of these leaves the session as it was.
//!
//! ```text
//! Open ──propose──▶ Proposed ──confirm──▶ Open | Resolved
//!   ▲                  │                        │
//!   └────withdraw──────┘                      close ──▶ Closed
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::defaults::{apply_defaults, DefaultPolicy};
use crate::error::{Error, Result, ValidationError};
use crate::merge::merge_answer;
use crate::model::BuildingModel;
use crate::path::FieldPath;
use crate::suggestion::Suggestion;
use crate::validate::{
    validate_with, CompletionState, IssueClass, IssueCode, Severity, ValidationIssue,
    ValidationReport,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Blocking gaps remain.
    Open,
    /// An answer waits for confirmation.
    Proposed,
    /// Nothing blocks encoding.
    Resolved,
    Closed,
}

/// A model revision together with what it still lacks.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSnapshot {
    pub model: Arc<BuildingModel>,
    pub report: ValidationReport,
}

impl ModelSnapshot {
    pub fn completion(&self) -> CompletionState {
        self.report.completion_state()
    }

    fn is_resolved(&self) -> bool {
        self.completion().is_resolved()
    }
}

/// One question for the user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Gap {
    pub path: FieldPath,
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    /// Low-confidence suggestions for this path.
    pub hints: Vec<Suggestion>,
}

#[derive(Clone, Debug)]
struct Proposal {
    path: FieldPath,
    value: Value,
}

pub struct GapResolutionSession {
    policy: Arc<DefaultPolicy>,
    current: ModelSnapshot,
    /// Accepted snapshots before `current`, oldest first.
    history: Vec<ModelSnapshot>,
    proposal: Option<Proposal>,
    hints: Vec<Suggestion>,
    state: SessionState,
}

impl GapResolutionSession {
    pub fn new(model: BuildingModel, policy: Arc<DefaultPolicy>) -> Self {
        let current = snapshot(&model, &policy);
        let state = resting_state(&current);
        info!(
            ?state,
            issues = current.report.issues.len(),
            "started gap resolution session"
        );
        GapResolutionSession {
            policy,
            current,
            history: Vec::new(),
            proposal: None,
            hints: Vec::new(),
            state,
        }
    }

    pub fn with_hints(mut self, hints: Vec<Suggestion>) -> Self {
        self.hints = hints;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> &Arc<BuildingModel> {
        &self.current.model
    }

    pub fn report(&self) -> &ValidationReport {
        &self.current.report
    }

    pub fn completion(&self) -> CompletionState {
        self.current.completion()
    }

    /// Accepted snapshots before the current one, oldest first.
    pub fn history(&self) -> &[ModelSnapshot] {
        &self.history
    }

    pub fn pending(&self) -> Option<(&FieldPath, &Value)> {
        self.proposal
            .as_ref()
            .map(|proposal| (&proposal.path, &proposal.value))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    /// Record a candidate answer. A second proposal replaces the first.
    pub fn propose(&mut self, path: FieldPath, value: Value) -> Result<()> {
        self.ensure_open()?;
        debug!(%path, "proposed answer");
        self.proposal = Some(Proposal { path, value });
        self.state = SessionState::Proposed;
        Ok(())
    }

    /// Drop the pending proposal.
    pub fn withdraw(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.proposal.take().ok_or(Error::NothingProposed)?;
        self.state = resting_state(&self.current);
        Ok(())
    }

    /// Merge the pending proposal.
    ///
    /// The answer is rejected when it does not fit the field or when the
    /// merged model has an Error-severity issue the current one does not.
    /// Missing values the answer brings along, such as the fields of a new
    /// zone, are new gaps rather than new errors. Either way the proposal
    /// is dropped.
    pub fn confirm(&mut self) -> Result<SessionState> {
        self.ensure_open()?;
        let Proposal { path, value } = self.proposal.take().ok_or(Error::NothingProposed)?;
        self.state = resting_state(&self.current);

        let merged = merge_answer(&self.current.model, &path, value)?;
        let next = snapshot(&merged, &self.policy);

        let known: HashSet<_> = self
            .current
            .report
            .errors()
            .map(|issue| (&issue.path, issue.code))
            .collect();
        let introduced: Vec<&ValidationIssue> = next
            .report
            .errors()
            .filter(|issue| issue.class() != IssueClass::Completeness)
            .filter(|issue| !known.contains(&(&issue.path, issue.code)))
            .collect();
        if !introduced.is_empty() {
            let reason = introduced
                .iter()
                .map(|issue| format!("{}: {}", issue.path, issue.message))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(%path, %reason, "answer rejected");
            return Err(Error::AnswerRejected { path, reason });
        }

        self.history
            .push(std::mem::replace(&mut self.current, next));
        self.state = resting_state(&self.current);
        info!(%path, state = ?self.state, revision = self.history.len(), "answer accepted");
        Ok(self.state)
    }

    /// Propose and confirm in one step.
    pub fn submit_answer(&mut self, path: FieldPath, value: Value) -> Result<SessionState> {
        self.propose(path, value)?;
        self.confirm()
    }

    /// Everything still to ask: Error issues in authoring order, then
    /// optional fields without a default.
    pub fn gaps(&self) -> Vec<Gap> {
        let report = &self.current.report;
        report
            .errors()
            .chain(
                report
                    .warnings()
                    .filter(|issue| issue.code == IssueCode::MissingOptional),
            )
            .map(|issue| Gap {
                path: issue.path.clone(),
                severity: issue.severity,
                code: issue.code,
                message: issue.message.clone(),
                hints: self
                    .hints
                    .iter()
                    .filter(|hint| hint.path == issue.path)
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// The most important gap, or `None` once nothing blocks encoding.
    pub fn next_question(&self) -> Option<Gap> {
        match self.state {
            SessionState::Resolved | SessionState::Closed => None,
            SessionState::Open | SessionState::Proposed => self.gaps().into_iter().next(),
        }
    }

    /// Go back to the previous accepted snapshot. A pending proposal is dropped.
    pub fn undo(&mut self) -> Result<SessionState> {
        self.ensure_open()?;
        let previous = self.history.pop().ok_or(Error::NothingToUndo)?;
        self.current = previous;
        self.proposal = None;
        self.state = resting_state(&self.current);
        info!(state = ?self.state, revision = self.history.len(), "undid last answer");
        Ok(self.state)
    }

    /// End the dialogue and hand out the final model.
    ///
    /// While Error issues remain the session stays usable and the issues
    /// are returned.
    pub fn close(&mut self) -> Result<Arc<BuildingModel>> {
        self.ensure_open()?;
        if self.current.report.has_errors() {
            return Err(ValidationError {
                issues: self.current.report.errors().cloned().collect(),
            }
            .into());
        }
        self.proposal = None;
        self.state = SessionState::Closed;
        info!(revisions = self.history.len() + 1, "closed session");
        Ok(Arc::clone(&self.current.model))
    }
}

fn snapshot(model: &BuildingModel, policy: &DefaultPolicy) -> ModelSnapshot {
    let model = apply_defaults(model, policy);
    let report = validate_with(&model, &policy.limits);
    ModelSnapshot {
        model: Arc::new(model),
        report,
    }
}

fn resting_state(snapshot: &ModelSnapshot) -> SessionState {
    if snapshot.is_resolved() {
        SessionState::Resolved
    } else {
        SessionState::Open
    }
}
