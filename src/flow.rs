//! Onboarding flow states and step severities
//!
//! The flow runs three steps in a fixed order:
//!
//! ```text
//! Start -> LeadsLinked -> ProfileResolved -> (CompanyResolved | Skipped) -> Done
//!   |          |
//!   +----------+--> Failed
//! ```
//!
//! Only the two critical steps can move the flow to `Failed`. The company
//! step is advisory: whatever it does, the flow proceeds to `Done`.

use tracing::{debug, warn};

/// Position of a single onboarding run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing has run yet
    Start,
    /// Anonymous leads were linked (possibly zero)
    LeadsLinked,
    /// The user profile was created or updated
    ProfileResolved,
    /// The company step attempted a write (successful or not)
    CompanyResolved,
    /// The company step did not apply
    Skipped,
    /// Terminal success
    Done,
    /// Terminal failure
    Failed,
}

impl FlowState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Start, Self::LeadsLinked | Self::Failed)
                | (Self::LeadsLinked, Self::ProfileResolved | Self::Failed)
                | (Self::ProfileResolved, Self::CompanyResolved | Self::Skipped)
                | (Self::CompanyResolved | Self::Skipped, Self::Done)
        )
    }

    /// No transitions leave a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// How a step's failure affects the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Failure aborts the flow and propagates to the caller
    Critical,
    /// Failure is logged and swallowed
    Advisory,
}

impl Severity {
    /// Log/metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Advisory => "advisory",
        }
    }
}

/// The steps of an onboarding run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Link anonymous leads to the account
    AttributeLeads,
    /// Create or update the user profile
    MaterializeProfile,
    /// Create or update the company profile
    MaterializeCompany,
}

impl Step {
    /// Severity of this step's failure
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::AttributeLeads | Self::MaterializeProfile => Severity::Critical,
            Self::MaterializeCompany => Severity::Advisory,
        }
    }

    /// Log/metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttributeLeads => "attribute_leads",
            Self::MaterializeProfile => "materialize_profile",
            Self::MaterializeCompany => "materialize_company",
        }
    }
}

/// Records the states a run passes through
#[derive(Debug, Clone)]
pub struct FlowTracker {
    user_id: String,
    history: Vec<FlowState>,
}

impl FlowTracker {
    /// Start tracking a run for `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            history: vec![FlowState::Start],
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.history.last().copied().unwrap_or(FlowState::Start)
    }

    /// Every state visited so far, starting with `Start`
    #[must_use]
    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: FlowState) -> bool {
        let current = self.state();
        if !current.can_transition_to(next) {
            warn!(user_id = %self.user_id, from = ?current, to = ?next, "Rejected onboarding flow transition");
            return false;
        }
        debug!(user_id = %self.user_id, from = ?current, to = ?next, "Onboarding flow transition");
        self.history.push(next);
        true
    }
}
