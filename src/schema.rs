//! Database schema definitions
//!
//! Constants for table and column names used with rusqlite. The tables mirror
//! the hosted schema the web client talks to.

/// Leads table schema
pub mod leads {
    /// Table name
    pub const TABLE: &str = "leads";
    /// Primary key column
    pub const ID: &str = "id";
    /// Lead title column
    pub const TITLE: &str = "title";
    /// Lead description column
    pub const DESCRIPTION: &str = "description";
    /// Service category column
    pub const CATEGORY: &str = "category";
    /// Pipeline status column
    pub const STATUS: &str = "status";
    /// Owning account column; NULL while anonymous
    pub const SUBMITTED_BY: &str = "submitted_by";
    /// Email given by an anonymous submitter
    pub const ANONYMOUS_EMAIL: &str = "anonymous_email";
    /// Anonymous session column
    pub const SESSION_ID: &str = "session_id";
    /// Attribution timestamp column
    pub const ATTRIBUTED_AT: &str = "attributed_at";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
    /// JSON metadata column
    pub const METADATA: &str = "metadata";
}

/// User profiles table schema
pub mod user_profiles {
    /// Table name
    pub const TABLE: &str = "user_profiles";
    /// Primary key column, equal to the auth account id
    pub const ID: &str = "id";
    /// Display name column
    pub const FULL_NAME: &str = "full_name";
    /// Email column
    pub const EMAIL: &str = "email";
    /// Phone column
    pub const PHONE: &str = "phone";
    /// Role column
    pub const ROLE: &str = "role";
    /// JSON metadata column
    pub const METADATA: &str = "metadata";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Company profiles table schema
pub mod company_profiles {
    /// Table name
    pub const TABLE: &str = "company_profiles";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning account column
    pub const USER_ID: &str = "user_id";
    /// Company name column
    pub const NAME: &str = "name";
    /// Contact person column
    pub const CONTACT_NAME: &str = "contact_name";
    /// Email column
    pub const EMAIL: &str = "email";
    /// Phone column
    pub const PHONE: &str = "phone";
    /// JSON metadata column
    pub const METADATA: &str = "metadata";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}
