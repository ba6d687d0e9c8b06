use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{OnboardingError, Result};
use crate::metadata::Metadata;
use crate::models::{
    CompanyProfile, Lead, LeadStatus, LinkedLead, NewAnonymousLead, UserLeadStats, UserProfile,
};
use crate::schema::{company_profiles, leads, user_profiles};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool size used by [`Database::new`]
pub const DEFAULT_POOL_SIZE: u32 = 10;
/// Connection checkout timeout used by [`Database::new`]
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const MEMORY_URL: &str = ":memory:";
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Database manager for handling connections and operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `database_url` with default pool settings.
    ///
    /// Accepts a bare path, `sqlite:<path>`, `sqlite://<path>` or `:memory:`.
    pub fn new(database_url: &str) -> Result<Self> {
        Self::open(database_url, DEFAULT_POOL_SIZE, DEFAULT_CONNECTION_TIMEOUT)
    }

    /// Open a private in-memory database (single pooled connection).
    pub fn in_memory() -> Result<Self> {
        Self::open(MEMORY_URL, 1, DEFAULT_CONNECTION_TIMEOUT)
    }

    /// Open with explicit pool settings and run migrations.
    pub fn open(database_url: &str, max_connections: u32, connection_timeout: Duration) -> Result<Self> {
        let path = strip_scheme(database_url);

        let in_memory = path == MEMORY_URL;
        let (manager, max_size) = if in_memory {
            // Every connection to :memory: is its own database
            (SqliteConnectionManager::memory(), 1)
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .map_err(|e| OnboardingError::Task(format!("cannot create {}: {e}", parent.display())))?;
                }
            }
            (SqliteConnectionManager::file(path), max_connections.max(1))
        };

        let manager = manager.with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
            ))
        });

        let mut builder = Pool::builder()
            .max_size(max_size)
            .connection_timeout(connection_timeout);
        if in_memory {
            // Recycling the only connection would drop the whole database
            builder = builder.max_lifetime(None).idle_timeout(None);
        }
        let pool = builder.build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path, max_size, "Database opened");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2025-06-01-000000_create_leads/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2025-06-01-000001_create_profiles/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Store a lead submitted without an account
    pub fn create_anonymous_lead(&self, new_lead: NewAnonymousLead) -> Result<Lead> {
        let conn = self.get_connection()?;
        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4().to_string(),
            title: new_lead.title,
            description: new_lead.description,
            category: new_lead.category,
            status: LeadStatus::New,
            submitted_by: None,
            anonymous_email: Some(new_lead.anonymous_email),
            session_id: new_lead.session_id,
            attributed_at: None,
            created_at: now,
            updated_at: now,
            metadata: new_lead.metadata,
        };

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                leads::TABLE,
                leads::ID,
                leads::TITLE,
                leads::DESCRIPTION,
                leads::CATEGORY,
                leads::STATUS,
                leads::ANONYMOUS_EMAIL,
                leads::SESSION_ID,
                leads::CREATED_AT,
                leads::UPDATED_AT,
                leads::METADATA
            ),
            params![
                lead.id,
                lead.title,
                lead.description,
                lead.category,
                lead.status.as_str(),
                lead.anonymous_email,
                lead.session_id,
                lead.created_at,
                lead.updated_at,
                serde_json::to_string(&lead.metadata)?
            ],
        )?;

        debug!(lead_id = %lead.id, category = %lead.category, "Anonymous lead stored");
        Ok(lead)
    }

    /// Get a lead by ID
    pub fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        let conn = self.get_connection()?;

        let lead = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", leads::TABLE, leads::ID),
                params![lead_id],
                map_lead,
            )
            .optional()?;

        Ok(lead)
    }

    /// Move a lead to a new pipeline status. Returns false when no such lead exists.
    pub fn set_lead_status(&self, lead_id: &str, status: LeadStatus) -> Result<bool> {
        let conn = self.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ? WHERE {} = ?",
                leads::TABLE,
                leads::STATUS,
                leads::UPDATED_AT,
                leads::ID
            ),
            params![status.as_str(), Utc::now(), lead_id],
        )?;
        Ok(changed > 0)
    }

    /// Attribute every still-anonymous lead submitted with `email` to `user_id`.
    ///
    /// Only rows with a NULL submitter match, so a lead's attribution
    /// timestamp is written exactly once. Returns the linked leads, oldest first.
    pub fn link_anonymous_leads(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> Result<Vec<LinkedLead>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "UPDATE {table} SET {submitted_by} = ?1, {attributed_at} = ?2, {updated_at} = ?2 \
             WHERE {anonymous_email} = ?3 AND {submitted_by} IS NULL \
             RETURNING {id}, {title}, {created_at}",
            table = leads::TABLE,
            submitted_by = leads::SUBMITTED_BY,
            attributed_at = leads::ATTRIBUTED_AT,
            updated_at = leads::UPDATED_AT,
            anonymous_email = leads::ANONYMOUS_EMAIL,
            id = leads::ID,
            title = leads::TITLE,
            created_at = leads::CREATED_AT,
        ))?;

        let linked_iter = stmt.query_map(params![user_id, now, email], |row| {
            Ok(LinkedLead {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for linked in linked_iter {
            results.push(linked?);
        }
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(results)
    }

    /// Count leads submitted with `email` that no account owns yet
    pub fn count_unlinked_leads(&self, email: &str) -> Result<u64> {
        let conn = self.get_connection()?;

        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ? AND {} IS NULL",
                leads::TABLE,
                leads::ANONYMOUS_EMAIL,
                leads::SUBMITTED_BY
            ),
            params![email],
            |row| row.get(0),
        )?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// All leads owned by an account, newest first
    pub fn leads_for_user(&self, user_id: &str) -> Result<Vec<Lead>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ? ORDER BY {} DESC",
            leads::TABLE,
            leads::SUBMITTED_BY,
            leads::CREATED_AT
        ))?;
        let lead_iter = stmt.query_map(params![user_id], map_lead)?;

        let mut results = Vec::new();
        for lead in lead_iter {
            results.push(lead?);
        }

        Ok(results)
    }

    /// Lead statistics for an account
    pub fn user_lead_stats(&self, user_id: &str) -> Result<UserLeadStats> {
        let leads = self.leads_for_user(user_id)?;
        Ok(UserLeadStats::from_leads(&leads))
    }

    /// Get a user profile by account id
    pub fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.get_connection()?;

        let profile = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", user_profiles::TABLE, user_profiles::ID),
                params![user_id],
                map_user_profile,
            )
            .optional()?;

        Ok(profile)
    }

    /// Insert a user profile. Returns false if a profile with the same id already exists.
    pub fn insert_user_profile(&self, profile: &UserProfile) -> Result<bool> {
        let conn = self.get_connection()?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT DO NOTHING",
                user_profiles::TABLE,
                user_profiles::ID,
                user_profiles::FULL_NAME,
                user_profiles::EMAIL,
                user_profiles::PHONE,
                user_profiles::ROLE,
                user_profiles::METADATA,
                user_profiles::CREATED_AT,
                user_profiles::UPDATED_AT
            ),
            params![
                profile.id,
                profile.full_name,
                profile.email,
                profile.phone,
                profile.role.as_str(),
                profile.metadata.to_column()?,
                profile.created_at,
                profile.updated_at
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Overwrite the mutable fields of an existing user profile
    pub fn update_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let conn = self.get_connection()?;

        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = ?, {} = ?, {} = ?, {} = ? WHERE {} = ?",
                user_profiles::TABLE,
                user_profiles::FULL_NAME,
                user_profiles::EMAIL,
                user_profiles::PHONE,
                user_profiles::ROLE,
                user_profiles::METADATA,
                user_profiles::UPDATED_AT,
                user_profiles::ID
            ),
            params![
                profile.full_name,
                profile.email,
                profile.phone,
                profile.role.as_str(),
                profile.metadata.to_column()?,
                profile.updated_at,
                profile.id
            ],
        )?;

        if updated == 0 {
            return Err(OnboardingError::NotFound(format!("{}/{}", user_profiles::TABLE, profile.id)));
        }
        Ok(())
    }

    /// Get the company profile owned by an account
    pub fn get_company_profile(&self, user_id: &str) -> Result<Option<CompanyProfile>> {
        let conn = self.get_connection()?;

        let company = conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ?",
                    company_profiles::TABLE,
                    company_profiles::USER_ID
                ),
                params![user_id],
                map_company_profile,
            )
            .optional()?;

        Ok(company)
    }

    /// Insert a company profile. Returns false if the account already owns one.
    pub fn insert_company_profile(&self, company: &CompanyProfile) -> Result<bool> {
        let conn = self.get_connection()?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT DO NOTHING",
                company_profiles::TABLE,
                company_profiles::ID,
                company_profiles::USER_ID,
                company_profiles::NAME,
                company_profiles::CONTACT_NAME,
                company_profiles::EMAIL,
                company_profiles::PHONE,
                company_profiles::METADATA,
                company_profiles::CREATED_AT,
                company_profiles::UPDATED_AT
            ),
            params![
                company.id,
                company.user_id,
                company.name,
                company.contact_name,
                company.email,
                company.phone,
                company.metadata.to_column()?,
                company.created_at,
                company.updated_at
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Overwrite the mutable fields of an existing company profile
    pub fn update_company_profile(&self, company: &CompanyProfile) -> Result<()> {
        let conn = self.get_connection()?;

        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = ?, {} = ?, {} = ?, {} = ? WHERE {} = ?",
                company_profiles::TABLE,
                company_profiles::NAME,
                company_profiles::CONTACT_NAME,
                company_profiles::EMAIL,
                company_profiles::PHONE,
                company_profiles::METADATA,
                company_profiles::UPDATED_AT,
                company_profiles::USER_ID
            ),
            params![
                company.name,
                company.contact_name,
                company.email,
                company.phone,
                company.metadata.to_column()?,
                company.updated_at,
                company.user_id
            ],
        )?;

        if updated == 0 {
            return Err(OnboardingError::NotFound(format!(
                "{}/{}",
                company_profiles::TABLE,
                company.user_id
            )));
        }
        Ok(())
    }
}

fn strip_scheme(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

/// Parse a TEXT column through `FromStr`, reporting failures as conversion errors.
fn parse_column<T>(row: &Row, column: &'static str) -> rusqlite::Result<T>
where
    T: FromStr<Err = OnboardingError>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|_| {
        let err = OnboardingError::InvalidStoredValue { column, value: raw.clone() };
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
    })
}

fn metadata_column(row: &Row, column: &'static str) -> rusqlite::Result<Metadata> {
    let raw: Option<String> = row.get(column)?;
    Metadata::from_column(raw.as_deref())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Map a database row to a Lead
fn map_lead(row: &Row) -> rusqlite::Result<Lead> {
    let raw_metadata: Option<String> = row.get(leads::METADATA)?;
    let metadata = match raw_metadata.as_deref() {
        None | Some("") => serde_json::Map::new(),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
    };

    Ok(Lead {
        id: row.get(leads::ID)?,
        title: row.get(leads::TITLE)?,
        description: row.get(leads::DESCRIPTION)?,
        category: row.get(leads::CATEGORY)?,
        status: parse_column(row, leads::STATUS)?,
        submitted_by: row.get(leads::SUBMITTED_BY)?,
        anonymous_email: row.get(leads::ANONYMOUS_EMAIL)?,
        session_id: row.get(leads::SESSION_ID)?,
        attributed_at: row.get(leads::ATTRIBUTED_AT)?,
        created_at: row.get(leads::CREATED_AT)?,
        updated_at: row.get(leads::UPDATED_AT)?,
        metadata,
    })
}

/// Map a database row to a `UserProfile`
fn map_user_profile(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(user_profiles::ID)?,
        full_name: row.get(user_profiles::FULL_NAME)?,
        email: row.get(user_profiles::EMAIL)?,
        phone: row.get(user_profiles::PHONE)?,
        role: parse_column(row, user_profiles::ROLE)?,
        metadata: metadata_column(row, user_profiles::METADATA)?,
        created_at: row.get(user_profiles::CREATED_AT)?,
        updated_at: row.get(user_profiles::UPDATED_AT)?,
    })
}

/// Map a database row to a `CompanyProfile`
fn map_company_profile(row: &Row) -> rusqlite::Result<CompanyProfile> {
    Ok(CompanyProfile {
        id: row.get(company_profiles::ID)?,
        user_id: row.get(company_profiles::USER_ID)?,
        name: row.get(company_profiles::NAME)?,
        contact_name: row.get(company_profiles::CONTACT_NAME)?,
        email: row.get(company_profiles::EMAIL)?,
        phone: row.get(company_profiles::PHONE)?,
        metadata: metadata_column(row, company_profiles::METADATA)?,
        created_at: row.get(company_profiles::CREATED_AT)?,
        updated_at: row.get(company_profiles::UPDATED_AT)?,
    })
}
