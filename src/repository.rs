use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::Result;
use crate::models::{CompanyProfile, LinkedLead, UserProfile};

/// Storage operations the onboarding flow depends on.
///
/// Each call is a single round trip; no call spans more than one table and
/// nothing here is transactional across calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OnboardingRepository: Send + Sync {
    /// Attribute unowned leads with a matching anonymous email to `user_id`.
    async fn link_anonymous_leads(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> Result<Vec<LinkedLead>>;

    /// Count unowned leads with a matching anonymous email.
    async fn count_unlinked_leads(&self, email: &str) -> Result<u64>;

    /// Look up a user profile by account id.
    async fn find_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Insert a profile; `Ok(false)` when a row with the same id already exists.
    async fn insert_user_profile(&self, profile: &UserProfile) -> Result<bool>;

    /// Update an existing profile.
    async fn update_user_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Look up the company profile owned by an account.
    async fn find_company_profile(&self, user_id: &str) -> Result<Option<CompanyProfile>>;

    /// Insert a company profile; `Ok(false)` when the account already owns one.
    async fn insert_company_profile(&self, company: &CompanyProfile) -> Result<bool>;

    /// Update an existing company profile.
    async fn update_company_profile(&self, company: &CompanyProfile) -> Result<()>;
}

/// [`OnboardingRepository`] backed by the SQLite [`Database`].
///
/// rusqlite is blocking, so every call runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteRepository {
    database: Database,
}

impl SqliteRepository {
    /// Wrap an opened database.
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    /// The underlying database handle.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let database = self.database.clone();
        tokio::task::spawn_blocking(move || op(&database)).await?
    }
}

#[async_trait]
impl OnboardingRepository for SqliteRepository {
    async fn link_anonymous_leads(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> Result<Vec<LinkedLead>> {
        let (user_id, email) = (user_id.to_string(), email.to_string());
        self.run(move |db| db.link_anonymous_leads(&user_id, &email, now)).await
    }

    async fn count_unlinked_leads(&self, email: &str) -> Result<u64> {
        let email = email.to_string();
        self.run(move |db| db.count_unlinked_leads(&email)).await
    }

    async fn find_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.run(move |db| db.get_user_profile(&user_id)).await
    }

    async fn insert_user_profile(&self, profile: &UserProfile) -> Result<bool> {
        let profile = profile.clone();
        self.run(move |db| db.insert_user_profile(&profile)).await
    }

    async fn update_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let profile = profile.clone();
        self.run(move |db| db.update_user_profile(&profile)).await
    }

    async fn find_company_profile(&self, user_id: &str) -> Result<Option<CompanyProfile>> {
        let user_id = user_id.to_string();
        self.run(move |db| db.get_company_profile(&user_id)).await
    }

    async fn insert_company_profile(&self, company: &CompanyProfile) -> Result<bool> {
        let company = company.clone();
        self.run(move |db| db.insert_company_profile(&company)).await
    }

    async fn update_company_profile(&self, company: &CompanyProfile) -> Result<()> {
        let company = company.clone();
        self.run(move |db| db.update_company_profile(&company)).await
    }
}
