//! Data models for leads, profiles and the onboarding result
//!
//! This module contains the records stored in the `leads`, `user_profiles`
//! and `company_profiles` tables together with the input and output types of
//! the onboarding flow.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OnboardingError;
use crate::metadata::Metadata;

/// Lifecycle status of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Freshly submitted
    New,
    /// Vetted by a provider
    Qualified,
    /// Provider reached out to the consumer
    Contacted,
    /// Terms are being discussed
    Negotiating,
    /// Deal closed successfully
    Converted,
    /// Deal closed unsuccessfully
    Lost,
    /// Temporarily on hold
    Paused,
}

impl LeadStatus {
    /// All statuses in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::New,
        Self::Qualified,
        Self::Contacted,
        Self::Negotiating,
        Self::Converted,
        Self::Lost,
        Self::Paused,
    ];

    /// Stored string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Qualified => "qualified",
            Self::Contacted => "contacted",
            Self::Negotiating => "negotiating",
            Self::Converted => "converted",
            Self::Lost => "lost",
            Self::Paused => "paused",
        }
    }

    /// True once the lead reached a final outcome
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Converted | Self::Lost)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = OnboardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OnboardingError::InvalidInput(format!("unknown lead status: {s}")))
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Consumer submitting leads
    #[default]
    User,
    /// Service provider
    Company,
    /// Platform administrator
    Admin,
    /// Editorial staff
    ContentEditor,
    /// Super administrator
    MasterAdmin,
}

impl UserRole {
    /// All roles.
    pub const ALL: [Self; 5] = [
        Self::User,
        Self::Company,
        Self::Admin,
        Self::ContentEditor,
        Self::MasterAdmin,
    ];

    /// Stored string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Company => "company",
            Self::Admin => "admin",
            Self::ContentEditor => "content_editor",
            Self::MasterAdmin => "master_admin",
        }
    }

    /// Roles an account may pick for itself during onboarding
    #[must_use]
    pub const fn is_self_service(&self) -> bool {
        matches!(self, Self::User | Self::Company)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = OnboardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| OnboardingError::InvalidInput(format!("unknown role: {s}")))
    }
}

/// A service request submitted by a consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Primary key
    pub id: String,
    /// Short summary
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Service category
    pub category: String,
    /// Pipeline status
    pub status: LeadStatus,
    /// Account that owns the lead; `None` while anonymous
    pub submitted_by: Option<String>,
    /// Email given when the lead was submitted without an account
    pub anonymous_email: Option<String>,
    /// Browser session of an anonymous submission
    pub session_id: Option<String>,
    /// When the lead was attributed to an account
    pub attributed_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Free-form metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Input for submitting a lead without an account
#[derive(Debug, Clone, Default)]
pub struct NewAnonymousLead {
    /// Short summary
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Service category
    pub category: String,
    /// Email used later to attribute the lead
    pub anonymous_email: String,
    /// Browser session, if known
    pub session_id: Option<String>,
    /// Free-form metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A lead that was attributed to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedLead {
    /// Lead id
    pub id: String,
    /// Lead title
    pub title: String,
    /// When the lead was originally submitted
    pub created_at: DateTime<Utc>,
}

/// Per-account profile; `id` equals the auth account id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account id
    pub id: String,
    /// Display name
    pub full_name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
    /// Account role
    pub role: UserRole,
    /// Onboarding flags and preferences
    pub metadata: Metadata,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Company profile owned by a company-role account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    /// Primary key
    pub id: String,
    /// Owning account
    pub user_id: String,
    /// Company name
    pub name: String,
    /// Contact person
    pub contact_name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
    /// Company metadata
    pub metadata: Metadata,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Profile input collected at signup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    /// Display name (required)
    pub full_name: String,
    /// Email, also used to find anonymous leads (required)
    pub email: String,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Requested role; `user` when creating, unchanged when updating
    #[serde(default)]
    pub role: Option<UserRole>,
    /// Metadata to merge into the profile
    #[serde(default)]
    pub metadata: Metadata,
}

impl ProfileData {
    /// Profile data with the required fields set.
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// Set the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the requested role.
    #[must_use]
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the metadata payload.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Company name to materialize, if this signup asks for one.
    #[must_use]
    pub fn company_name(&self) -> Option<&str> {
        if self.role == Some(UserRole::Company) {
            self.metadata.company_name()
        } else {
            None
        }
    }
}

/// Whether the user profile was inserted or updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileOutcome {
    /// No profile existed; one was inserted
    Created,
    /// An existing profile was updated
    Updated,
}

/// What happened to the company profile; informational only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CompanyOutcome {
    /// Not a company signup, or no company name given
    Skipped,
    /// A company profile was inserted
    Created,
    /// An existing company profile was updated
    Updated,
    /// The write failed and was logged
    Failed {
        /// Error description
        reason: String,
    },
}

impl CompanyOutcome {
    /// Metric label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of linking anonymous leads and materializing the profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "LinkSummary")]
pub struct LinkResult {
    /// Leads attributed to the account during this run
    pub linked_leads: Vec<LinkedLead>,
    /// Whether the profile was created or updated
    pub profile: ProfileOutcome,
    /// What happened to the company profile
    pub company: CompanyOutcome,
}

impl LinkResult {
    /// Number of leads linked during this run
    #[must_use]
    pub fn linked_leads_count(&self) -> usize {
        self.linked_leads.len()
    }

    /// True when a new profile was inserted
    #[must_use]
    pub fn profile_created(&self) -> bool {
        self.profile == ProfileOutcome::Created
    }

    /// True when an existing profile was updated
    #[must_use]
    pub fn profile_updated(&self) -> bool {
        self.profile == ProfileOutcome::Updated
    }
}

/// Wire form of [`LinkResult`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSummary {
    /// Number of leads linked
    pub linked_leads_count: usize,
    /// The linked leads
    pub linked_leads: Vec<LinkedLead>,
    /// A profile was inserted
    pub profile_created: bool,
    /// A profile was updated
    pub profile_updated: bool,
    /// Company profile outcome
    pub company_profile: CompanyOutcome,
}

impl From<LinkResult> for LinkSummary {
    fn from(result: LinkResult) -> Self {
        Self {
            linked_leads_count: result.linked_leads_count(),
            profile_created: result.profile_created(),
            profile_updated: result.profile_updated(),
            linked_leads: result.linked_leads,
            company_profile: result.company,
        }
    }
}

/// Lead statistics for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserLeadStats {
    /// All leads owned by the account
    pub total_leads: usize,
    /// Leads not yet converted or lost
    pub active_leads: usize,
    /// Converted or lost leads
    pub completed_leads: usize,
    /// Count per status
    pub leads_by_status: BTreeMap<LeadStatus, usize>,
    /// Count per category
    pub leads_by_category: BTreeMap<String, usize>,
}

impl UserLeadStats {
    /// Tally a set of leads.
    #[must_use]
    pub fn from_leads(leads: &[Lead]) -> Self {
        let mut stats = Self {
            total_leads: leads.len(),
            ..Self::default()
        };
        for lead in leads {
            *stats.leads_by_status.entry(lead.status).or_default() += 1;
            *stats.leads_by_category.entry(lead.category.clone()).or_default() += 1;
            if lead.status.is_closed() {
                stats.completed_leads += 1;
            } else {
                stats.active_leads += 1;
            }
        }
        stats
    }
}
