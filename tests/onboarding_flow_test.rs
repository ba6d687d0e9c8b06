use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::TempDir;

use homni_onboarding::models::{CompanyProfile, LinkedLead, NewAnonymousLead, UserProfile};
use homni_onboarding::{
    CompanyOutcome, Database, Metadata, OnboardingError, OnboardingMetrics, OnboardingRepository,
    OnboardingService, ProfileData, Result, SqliteRepository, UserRole,
};

fn temp_database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_url = format!("sqlite://{}", dir.path().join("onboarding.db").display());
    let db = Database::new(&db_url).expect("Failed to create database");
    (dir, db)
}

fn submit(db: &Database, title: &str, email: &str) -> String {
    db.create_anonymous_lead(NewAnonymousLead {
        title: title.to_string(),
        description: "Submitted before signup".to_string(),
        category: "plumbing".to_string(),
        anonymous_email: email.to_string(),
        ..NewAnonymousLead::default()
    })
    .expect("Failed to store lead")
    .id
}

fn service_over(repository: impl OnboardingRepository + 'static) -> OnboardingService {
    OnboardingService::new(Arc::new(repository), Arc::new(OnboardingMetrics::new()))
}

fn company_signup(name: &str, email: &str, company: &str) -> ProfileData {
    ProfileData::new(name, email)
        .with_role(UserRole::Company)
        .with_metadata(Metadata {
            company_name: Some(company.to_string()),
            ..Metadata::default()
        })
}

/// Delegates to SQLite but refuses selected writes.
struct FlakyRepository {
    inner: SqliteRepository,
    fail_lead_link: bool,
    fail_profile_insert: bool,
    fail_company_writes: bool,
}

impl FlakyRepository {
    fn new(db: Database) -> Self {
        Self {
            inner: SqliteRepository::new(db),
            fail_lead_link: false,
            fail_profile_insert: false,
            fail_company_writes: false,
        }
    }
}

fn refused(what: &str) -> OnboardingError {
    OnboardingError::Task(format!("{what} refused"))
}

#[async_trait]
impl OnboardingRepository for FlakyRepository {
    async fn link_anonymous_leads(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> Result<Vec<LinkedLead>> {
        if self.fail_lead_link {
            return Err(refused("lead link"));
        }
        self.inner.link_anonymous_leads(user_id, email, now).await
    }

    async fn count_unlinked_leads(&self, email: &str) -> Result<u64> {
        self.inner.count_unlinked_leads(email).await
    }

    async fn find_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.inner.find_user_profile(user_id).await
    }

    async fn insert_user_profile(&self, profile: &UserProfile) -> Result<bool> {
        if self.fail_profile_insert {
            return Err(refused("profile insert"));
        }
        self.inner.insert_user_profile(profile).await
    }

    async fn update_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.inner.update_user_profile(profile).await
    }

    async fn find_company_profile(&self, user_id: &str) -> Result<Option<CompanyProfile>> {
        self.inner.find_company_profile(user_id).await
    }

    async fn insert_company_profile(&self, company: &CompanyProfile) -> Result<bool> {
        if self.fail_company_writes {
            return Err(refused("company insert"));
        }
        self.inner.insert_company_profile(company).await
    }

    async fn update_company_profile(&self, company: &CompanyProfile) -> Result<()> {
        if self.fail_company_writes {
            return Err(refused("company update"));
        }
        self.inner.update_company_profile(company).await
    }
}

#[tokio::test]
async fn test_new_user_with_anonymous_leads() {
    let (_dir, db) = temp_database();
    let first = submit(&db, "Leaky tap", "a@x.com");
    let second = submit(&db, "Broken heater", "a@x.com");
    let service = service_over(SqliteRepository::new(db.clone()));

    let result = service
        .link_anonymous_leads_and_create_profile("u1", ProfileData::new("Kari Nordmann", "a@x.com"))
        .await
        .expect("Onboarding failed");

    assert_eq!(result.linked_leads_count(), 2);
    assert!(result.profile_created());
    assert!(!result.profile_updated());
    assert_eq!(result.company, CompanyOutcome::Skipped);

    let linked_ids: Vec<_> = result.linked_leads.iter().map(|l| l.id.clone()).collect();
    assert!(linked_ids.contains(&first));
    assert!(linked_ids.contains(&second));

    for id in [&first, &second] {
        let lead = db.get_lead(id).unwrap().unwrap();
        assert_eq!(lead.submitted_by.as_deref(), Some("u1"));
        assert!(lead.attributed_at.is_some());
    }

    let profile = db.get_user_profile("u1").unwrap().expect("Profile missing");
    assert_eq!(profile.full_name, "Kari Nordmann");
    assert_eq!(profile.role, UserRole::User);
    assert_eq!(profile.metadata.onboarding_completed, Some(true));
    assert_eq!(profile.metadata.linked_leads_count, Some(2));
    assert!(profile.metadata.leads_linked_at.is_some());
}

#[tokio::test]
async fn test_returning_user_without_leads_keeps_metadata() {
    let (_dir, db) = temp_database();
    let now = Utc::now();
    db.insert_user_profile(&UserProfile {
        id: "u2".to_string(),
        full_name: "Ola".to_string(),
        email: "b@x.com".to_string(),
        phone: Some("+4798765432".to_string()),
        role: UserRole::User,
        metadata: Metadata::default().with_extension("theme", "dark"),
        created_at: now,
        updated_at: now,
    })
    .unwrap();
    let service = service_over(SqliteRepository::new(db.clone()));

    let result = service
        .link_anonymous_leads_and_create_profile("u2", ProfileData::new("Ola Nordmann", "b@x.com"))
        .await
        .unwrap();

    assert_eq!(result.linked_leads_count(), 0);
    assert!(result.profile_updated());
    assert!(!result.profile_created());

    let profile = db.get_user_profile("u2").unwrap().unwrap();
    assert_eq!(profile.full_name, "Ola Nordmann");
    assert_eq!(profile.phone.as_deref(), Some("+4798765432"));
    assert_eq!(profile.metadata.extensions.get("theme"), Some(&json!("dark")));
    assert_eq!(profile.metadata.onboarding_completed, Some(true));
    assert_eq!(profile.metadata.linked_leads_count, Some(0));
    assert_eq!(profile.created_at, now);
}

#[tokio::test]
async fn test_company_signup_creates_company_profile() {
    let (_dir, db) = temp_database();
    submit(&db, "Office renovation", "c@x.com");
    let service = service_over(SqliteRepository::new(db.clone()));

    let result = service
        .link_anonymous_leads_and_create_profile("u3", company_signup("Kari", "c@x.com", "Acme AS"))
        .await
        .unwrap();

    assert!(result.profile_created());
    assert_eq!(result.linked_leads_count(), 1);
    assert_eq!(result.company, CompanyOutcome::Created);

    let profile = db.get_user_profile("u3").unwrap().unwrap();
    assert_eq!(profile.role, UserRole::Company);

    let company = db.get_company_profile("u3").unwrap().expect("Company profile missing");
    assert_eq!(company.name, "Acme AS");
    assert_eq!(company.contact_name, "Kari");
    assert_eq!(company.email, "c@x.com");
}

#[tokio::test]
async fn test_company_signup_twice_updates_company() {
    let (_dir, db) = temp_database();
    let service = service_over(SqliteRepository::new(db.clone()));

    service
        .link_anonymous_leads_and_create_profile("u3", company_signup("Kari", "c@x.com", "Acme AS"))
        .await
        .unwrap();
    let second = service
        .link_anonymous_leads_and_create_profile("u3", company_signup("Kari", "c@x.com", "Acme Holding AS"))
        .await
        .unwrap();

    assert!(second.profile_updated());
    assert_eq!(second.company, CompanyOutcome::Updated);
    let company = db.get_company_profile("u3").unwrap().unwrap();
    assert_eq!(company.name, "Acme Holding AS");
}

#[tokio::test]
async fn test_company_role_without_company_name_skips_company_step() {
    let (_dir, db) = temp_database();
    // Any company write would surface as CompanyOutcome::Failed
    let mut repository = FlakyRepository::new(db.clone());
    repository.fail_company_writes = true;
    let service = service_over(repository);

    let missing = service
        .link_anonymous_leads_and_create_profile(
            "u10",
            ProfileData::new("Kari", "k@x.com").with_role(UserRole::Company),
        )
        .await
        .unwrap();
    let blank = service
        .link_anonymous_leads_and_create_profile("u11", company_signup("Ola", "l@x.com", "   "))
        .await
        .unwrap();

    for (user_id, result) in [("u10", missing), ("u11", blank)] {
        assert!(result.profile_created());
        assert_eq!(result.company, CompanyOutcome::Skipped);
        assert!(db.get_company_profile(user_id).unwrap().is_none());
        assert_eq!(db.get_user_profile(user_id).unwrap().unwrap().role, UserRole::Company);
    }
    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.company_writes, 0);
    assert_eq!(snapshot.company_failures, 0);
}

#[tokio::test]
async fn test_reonboarding_recovers_from_mistyped_stored_metadata() {
    let (_dir, db) = temp_database();
    let service = service_over(SqliteRepository::new(db.clone()));
    service
        .link_anonymous_leads_and_create_profile("u12", ProfileData::new("Kari", "m@x.com"))
        .await
        .unwrap();

    // Another client rewrote the document with its own value types
    db.get_connection()
        .unwrap()
        .execute(
            "UPDATE user_profiles SET metadata = ?1 WHERE id = ?2",
            [r#"{"version":"2.0","onboarding_completed":"yes","theme":"dark"}"#, "u12"],
        )
        .unwrap();

    let result = service
        .link_anonymous_leads_and_create_profile("u12", ProfileData::new("Kari", "m@x.com"))
        .await
        .expect("Mistyped metadata must not block onboarding");

    assert!(result.profile_updated());
    let profile = db.get_user_profile("u12").unwrap().unwrap();
    assert_eq!(profile.metadata.version, Some(1));
    assert_eq!(profile.metadata.onboarding_completed, Some(true));
    assert_eq!(profile.metadata.extensions.get("theme"), Some(&json!("dark")));
    assert!(!profile.metadata.extensions.contains_key("version"));
}

#[tokio::test]
async fn test_company_failure_does_not_fail_onboarding() {
    let (_dir, db) = temp_database();
    let mut repository = FlakyRepository::new(db.clone());
    repository.fail_company_writes = true;
    let service = service_over(repository);

    let result = service
        .link_anonymous_leads_and_create_profile("u4", company_signup("Kari", "d@x.com", "Acme AS"))
        .await
        .expect("Company failure must not abort onboarding");

    assert!(result.profile_created());
    assert!(matches!(result.company, CompanyOutcome::Failed { .. }));
    assert!(db.get_user_profile("u4").unwrap().is_some());
    assert!(db.get_company_profile("u4").unwrap().is_none());
    assert_eq!(service.metrics().snapshot().company_failures, 1);
}

#[tokio::test]
async fn test_lead_link_failure_leaves_no_profile() {
    let (_dir, db) = temp_database();
    submit(&db, "Leaky tap", "e@x.com");
    let mut repository = FlakyRepository::new(db.clone());
    repository.fail_lead_link = true;
    let service = service_over(repository);

    let err = service
        .link_anonymous_leads_and_create_profile("u5", ProfileData::new("Kari", "e@x.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, OnboardingError::LeadAttribution { .. }));
    assert!(db.get_user_profile("u5").unwrap().is_none());
    assert_eq!(db.count_unlinked_leads("e@x.com").unwrap(), 1);
}

#[tokio::test]
async fn test_profile_failure_keeps_linked_leads_and_retry_recovers() {
    let (_dir, db) = temp_database();
    submit(&db, "Leaky tap", "f@x.com");

    let mut repository = FlakyRepository::new(db.clone());
    repository.fail_profile_insert = true;
    let err = service_over(repository)
        .link_anonymous_leads_and_create_profile("u6", ProfileData::new("Kari", "f@x.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, OnboardingError::ProfileWrite { .. }));

    // The lead link is not rolled back
    assert_eq!(db.leads_for_user("u6").unwrap().len(), 1);
    assert!(db.get_user_profile("u6").unwrap().is_none());

    let retry = service_over(SqliteRepository::new(db.clone()))
        .link_anonymous_leads_and_create_profile("u6", ProfileData::new("Kari", "f@x.com"))
        .await
        .unwrap();
    assert_eq!(retry.linked_leads_count(), 0);
    assert!(retry.profile_created());
}

#[tokio::test]
async fn test_second_run_links_nothing_new() {
    let (_dir, db) = temp_database();
    let lead_id = submit(&db, "Leaky tap", "g@x.com");
    let service = service_over(SqliteRepository::new(db.clone()));

    service
        .link_anonymous_leads_and_create_profile("u7", ProfileData::new("Kari", "g@x.com"))
        .await
        .unwrap();
    let attributed_at = db.get_lead(&lead_id).unwrap().unwrap().attributed_at;

    let second = service
        .link_anonymous_leads_and_create_profile("u7", ProfileData::new("Kari", "g@x.com"))
        .await
        .unwrap();

    assert_eq!(second.linked_leads_count(), 0);
    assert!(second.profile_updated());
    assert_eq!(db.get_lead(&lead_id).unwrap().unwrap().attributed_at, attributed_at);
    assert_eq!(
        db.get_user_profile("u7").unwrap().unwrap().metadata.linked_leads_count,
        Some(0)
    );
}

#[tokio::test]
async fn test_leads_owned_by_other_account_are_not_relinked() {
    let (_dir, db) = temp_database();
    submit(&db, "Leaky tap", "h@x.com");
    let service = service_over(SqliteRepository::new(db.clone()));

    service
        .link_anonymous_leads_and_create_profile("first", ProfileData::new("Kari", "h@x.com"))
        .await
        .unwrap();
    let other = service
        .link_anonymous_leads_and_create_profile("second", ProfileData::new("Kari", "h@x.com"))
        .await
        .unwrap();

    assert_eq!(other.linked_leads_count(), 0);
    assert_eq!(db.leads_for_user("first").unwrap().len(), 1);
    assert!(db.leads_for_user("second").unwrap().is_empty());
}

#[tokio::test]
async fn test_check_unlinked_leads() {
    let (_dir, db) = temp_database();
    submit(&db, "One", "i@x.com");
    submit(&db, "Two", "i@x.com");
    let service = service_over(SqliteRepository::new(db));

    assert_eq!(service.check_unlinked_leads("i@x.com").await, 2);
    assert_eq!(service.check_unlinked_leads("nobody@x.com").await, 0);

    service
        .link_anonymous_leads_and_create_profile("u8", ProfileData::new("Kari", "i@x.com"))
        .await
        .unwrap();
    assert_eq!(service.check_unlinked_leads("i@x.com").await, 0);
}

#[tokio::test]
async fn test_link_result_wire_format() {
    let (_dir, db) = temp_database();
    submit(&db, "Leaky tap", "j@x.com");
    let service = service_over(SqliteRepository::new(db));

    let result = service
        .link_anonymous_leads_and_create_profile("u9", ProfileData::new("Kari", "j@x.com"))
        .await
        .unwrap();
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["linkedLeadsCount"], json!(1));
    assert_eq!(value["profileCreated"], json!(true));
    assert_eq!(value["profileUpdated"], json!(false));
    assert_eq!(value["companyProfile"]["status"], json!("skipped"));
    assert_eq!(value["linkedLeads"][0]["title"], json!("Leaky tap"));
}
