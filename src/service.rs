use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{OnboardingError, Result};
use crate::flow::{FlowState, FlowTracker, Step};
use crate::logging::OperationTimer;
use crate::metrics::{OnboardingMetrics, StepTimer};
use crate::models::{
    CompanyOutcome, CompanyProfile, LinkResult, LinkedLead, ProfileData, ProfileOutcome, UserProfile, UserRole,
};
use crate::repository::OnboardingRepository;

/// Links anonymous leads to a freshly authenticated account and materializes
/// its profile records.
pub struct OnboardingService {
    repository: Arc<dyn OnboardingRepository>,
    metrics: Arc<OnboardingMetrics>,
}

impl OnboardingService {
    pub fn new(repository: Arc<dyn OnboardingRepository>, metrics: Arc<OnboardingMetrics>) -> Self {
        Self { repository, metrics }
    }

    /// Metrics collector this service reports to
    pub fn metrics(&self) -> &OnboardingMetrics {
        &self.metrics
    }

    /// Run the post-signup flow for `user_id`.
    ///
    /// Steps run strictly in order: link anonymous leads by email, create or
    /// update the user profile, then (for company signups with a company name)
    /// create or update the company profile. Failures of the first two steps
    /// abort the run; a company profile failure is logged and reported in
    /// [`LinkResult::company`] only.
    ///
    /// A retry after a failure is safe: linked leads are not linked again and
    /// an existing profile takes the update path.
    #[instrument(skip(self, profile_data), fields(email = %profile_data.email))]
    pub async fn link_anonymous_leads_and_create_profile(
        &self,
        user_id: &str,
        profile_data: ProfileData,
    ) -> Result<LinkResult> {
        let timer = OperationTimer::new("link_anonymous_leads_and_create_profile");
        validate_request(user_id, &profile_data)?;

        let mut flow = FlowTracker::new(user_id);

        let linked_leads = match self.attribute_leads(user_id, &profile_data.email).await {
            Ok(linked) => linked,
            Err(e) => return Err(self.abort(&mut flow, Step::AttributeLeads, e)),
        };
        flow.advance(FlowState::LeadsLinked);

        let profile = match self.materialize_profile(user_id, &profile_data, linked_leads.len()).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.abort(&mut flow, Step::MaterializeProfile, e)),
        };
        flow.advance(FlowState::ProfileResolved);

        let company = self.materialize_company_profile(user_id, &profile_data).await;
        flow.advance(if company == CompanyOutcome::Skipped {
            FlowState::Skipped
        } else {
            FlowState::CompanyResolved
        });
        flow.advance(FlowState::Done);

        self.metrics.record_run(true);
        info!(
            user_id,
            linked_leads = linked_leads.len(),
            profile = ?profile,
            company = company.as_str(),
            duration_ms = timer.finish(),
            "Onboarding completed"
        );

        Ok(LinkResult {
            linked_leads,
            profile,
            company,
        })
    }

    /// Number of leads submitted with `email` that no account owns yet.
    ///
    /// Never fails: storage errors are logged and reported as zero.
    pub async fn check_unlinked_leads(&self, email: &str) -> u64 {
        match self.repository.count_unlinked_leads(email).await {
            Ok(count) => {
                self.metrics.record_unlinked_check(true);
                count
            }
            Err(e) => {
                self.metrics.record_unlinked_check(false);
                error!(error = %e, "Failed to count unlinked leads");
                0
            }
        }
    }

    /// Attribute every unowned lead submitted with `email` to `user_id`.
    async fn attribute_leads(&self, user_id: &str, email: &str) -> Result<Vec<LinkedLead>> {
        let _timer = StepTimer::start(&self.metrics, Step::AttributeLeads);

        let linked = self
            .repository
            .link_anonymous_leads(user_id, email, Utc::now())
            .await
            .map_err(|e| OnboardingError::lead_attribution(user_id, e))?;

        self.metrics.record_leads_linked(linked.len());
        if linked.is_empty() {
            info!(user_id, "No anonymous leads to link");
        } else {
            info!(user_id, count = linked.len(), "Linked anonymous leads");
        }
        Ok(linked)
    }

    /// Create the profile, or merge into the existing one.
    async fn materialize_profile(
        &self,
        user_id: &str,
        profile_data: &ProfileData,
        linked_count: usize,
    ) -> Result<ProfileOutcome> {
        let _timer = StepTimer::start(&self.metrics, Step::MaterializeProfile);
        let now = Utc::now();

        let outcome = self
            .write_profile(user_id, profile_data, linked_count, now)
            .await
            .map_err(|e| OnboardingError::profile_write(user_id, e))?;

        self.metrics.record_profile(outcome);
        info!(user_id, outcome = ?outcome, "Profile materialized");
        Ok(outcome)
    }

    async fn write_profile(
        &self,
        user_id: &str,
        profile_data: &ProfileData,
        linked_count: usize,
        now: DateTime<Utc>,
    ) -> Result<ProfileOutcome> {
        if let Some(existing) = self.repository.find_user_profile(user_id).await? {
            let updated = apply_profile_update(existing, profile_data, linked_count, now);
            self.repository.update_user_profile(&updated).await?;
            return Ok(ProfileOutcome::Updated);
        }

        let created = new_profile(user_id, profile_data, linked_count, now);
        if self.repository.insert_user_profile(&created).await? {
            return Ok(ProfileOutcome::Created);
        }

        // A concurrent run inserted the row between our lookup and insert;
        // merge into the row it wrote.
        warn!(user_id, "Profile appeared concurrently, switching to update");
        let existing = self
            .repository
            .find_user_profile(user_id)
            .await?
            .ok_or_else(|| OnboardingError::NotFound(format!("user_profiles/{user_id}")))?;
        let updated = apply_profile_update(existing, profile_data, linked_count, now);
        self.repository.update_user_profile(&updated).await?;
        Ok(ProfileOutcome::Updated)
    }

    /// Best-effort company profile write; never fails the run.
    async fn materialize_company_profile(&self, user_id: &str, profile_data: &ProfileData) -> CompanyOutcome {
        let Some(company_name) = profile_data.company_name() else {
            return CompanyOutcome::Skipped;
        };

        let _timer = StepTimer::start(&self.metrics, Step::MaterializeCompany);
        let outcome = match self.write_company(user_id, company_name, profile_data).await {
            Ok(outcome) => {
                info!(user_id, company_name, outcome = outcome.as_str(), "Company profile materialized");
                outcome
            }
            Err(e) => {
                self.metrics
                    .record_step_failure(Step::MaterializeCompany, e.kind());
                error!(
                    user_id,
                    operation = Step::MaterializeCompany.as_str(),
                    severity = Step::MaterializeCompany.severity().as_str(),
                    error = %e,
                    "Failed to materialize company profile; continuing"
                );
                CompanyOutcome::Failed { reason: e.to_string() }
            }
        };
        self.metrics.record_company(&outcome);
        outcome
    }

    async fn write_company(
        &self,
        user_id: &str,
        company_name: &str,
        profile_data: &ProfileData,
    ) -> Result<CompanyOutcome> {
        let now = Utc::now();

        if let Some(existing) = self.repository.find_company_profile(user_id).await? {
            let updated = apply_company_update(existing, company_name, profile_data, now);
            self.repository.update_company_profile(&updated).await?;
            return Ok(CompanyOutcome::Updated);
        }

        let created = new_company(user_id, company_name, profile_data, now);
        if self.repository.insert_company_profile(&created).await? {
            return Ok(CompanyOutcome::Created);
        }

        warn!(user_id, "Company profile appeared concurrently, switching to update");
        let existing = self
            .repository
            .find_company_profile(user_id)
            .await?
            .ok_or_else(|| OnboardingError::NotFound(format!("company_profiles/{user_id}")))?;
        let updated = apply_company_update(existing, company_name, profile_data, now);
        self.repository.update_company_profile(&updated).await?;
        Ok(CompanyOutcome::Updated)
    }

    fn abort(&self, flow: &mut FlowTracker, step: Step, err: OnboardingError) -> OnboardingError {
        flow.advance(FlowState::Failed);
        self.metrics.record_step_failure(step, err.kind());
        self.metrics.record_run(false);
        error!(
            step = step.as_str(),
            severity = step.severity().as_str(),
            error = %err,
            "Onboarding aborted"
        );
        err
    }
}

fn validate_request(user_id: &str, profile_data: &ProfileData) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(OnboardingError::InvalidInput("user id cannot be empty".to_string()));
    }
    if profile_data.full_name.trim().is_empty() {
        return Err(OnboardingError::InvalidInput("full name cannot be empty".to_string()));
    }
    if profile_data.email.trim().is_empty() {
        return Err(OnboardingError::InvalidInput("email cannot be empty".to_string()));
    }
    if let Some(role) = profile_data.role {
        if !role.is_self_service() {
            return Err(OnboardingError::InvalidInput(format!(
                "role {role} cannot be chosen during onboarding"
            )));
        }
    }
    Ok(())
}

fn new_profile(user_id: &str, data: &ProfileData, linked_count: usize, now: DateTime<Utc>) -> UserProfile {
    let mut metadata = data.metadata.clone();
    metadata.stamp_onboarding(linked_count as u64, now);

    UserProfile {
        id: user_id.to_string(),
        full_name: data.full_name.clone(),
        email: data.email.clone(),
        phone: data.phone.clone(),
        role: data.role.unwrap_or(UserRole::User),
        metadata,
        created_at: now,
        updated_at: now,
    }
}

fn apply_profile_update(
    mut profile: UserProfile,
    data: &ProfileData,
    linked_count: usize,
    now: DateTime<Utc>,
) -> UserProfile {
    profile.metadata.merge(&data.metadata);
    profile.metadata.stamp_onboarding(linked_count as u64, now);
    profile.full_name.clone_from(&data.full_name);
    profile.email.clone_from(&data.email);
    if data.phone.is_some() {
        profile.phone.clone_from(&data.phone);
    }
    match data.role {
        // Onboarding never demotes staff accounts
        Some(role) if profile.role.is_self_service() => profile.role = role,
        Some(role) if role != profile.role => {
            warn!(
                user_id = %profile.id,
                current = %profile.role,
                requested = %role,
                "Keeping privileged role during onboarding"
            );
        }
        _ => {}
    }
    profile.updated_at = now;
    profile
}

fn new_company(user_id: &str, company_name: &str, data: &ProfileData, now: DateTime<Utc>) -> CompanyProfile {
    CompanyProfile {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: company_name.to_string(),
        contact_name: data.full_name.clone(),
        email: data.email.clone(),
        phone: data.phone.clone(),
        metadata: data.metadata.clone(),
        created_at: now,
        updated_at: now,
    }
}

fn apply_company_update(
    mut company: CompanyProfile,
    company_name: &str,
    data: &ProfileData,
    now: DateTime<Utc>,
) -> CompanyProfile {
    company.metadata.merge(&data.metadata);
    company.name = company_name.to_string();
    company.contact_name.clone_from(&data.full_name);
    company.email.clone_from(&data.email);
    if data.phone.is_some() {
        company.phone.clone_from(&data.phone);
    }
    company.updated_at = now;
    company
}
