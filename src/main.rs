use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use homni_onboarding::config::AppConfig;
use homni_onboarding::logging::init_logging;
use homni_onboarding::models::NewAnonymousLead;
use homni_onboarding::validation::InputValidator;
use homni_onboarding::{Database, Metadata, OnboardingMetrics, OnboardingService, ProfileData, SqliteRepository, UserRole};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (overrides configuration)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and run migrations
    InitDb,
    /// Submit a lead without an account
    SubmitLead {
        /// Lead title
        #[arg(short, long)]
        title: String,

        /// Service category
        #[arg(short, long)]
        category: String,

        /// Email of the anonymous submitter
        #[arg(short, long)]
        email: String,

        /// Lead description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Browser session id
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Link anonymous leads to an account and materialize its profile
    Onboard {
        /// Auth account id
        #[arg(short, long)]
        user_id: String,

        /// Display name
        #[arg(short = 'n', long)]
        full_name: String,

        /// Account email
        #[arg(short, long)]
        email: String,

        /// Phone number
        #[arg(short, long)]
        phone: Option<String>,

        /// Requested role (user or company)
        #[arg(short, long)]
        role: Option<String>,

        /// Company name (company signups)
        #[arg(long)]
        company_name: Option<String>,

        /// Extra metadata as key=value, repeatable
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },
    /// Count leads that are waiting to be linked for an email
    CheckUnlinked {
        /// Email to look up
        #[arg(short, long)]
        email: String,
    },
    /// List the leads owned by an account
    UserLeads {
        /// Auth account id
        #[arg(short, long)]
        user_id: String,
    },
    /// Lead statistics for an account
    LeadStats {
        /// Auth account id
        #[arg(short, long)]
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = init_logging(&config.logging)?;

    // Parse command line arguments
    let cli = Cli::parse();

    let database_url = cli.database.clone().unwrap_or_else(|| config.get_database_url());
    InputValidator::validate_database_url(&database_url)?;
    let db = Database::open(&database_url, config.database.max_connections, config.connection_timeout())
        .with_context(|| format!("Failed to open database {database_url}"))?;

    // Process command
    match cli.command {
        Commands::InitDb => {
            info!(database_url = %database_url, "Database ready");
        },
        Commands::SubmitLead {
            title,
            category,
            email,
            description,
            session_id,
        } => {
            InputValidator::validate_email(&email)?;
            let lead = db.create_anonymous_lead(NewAnonymousLead {
                title,
                description,
                category,
                anonymous_email: InputValidator::normalize_email(&email),
                session_id,
                metadata: serde_json::Map::new(),
            })?;
            print_json(&lead)?;
        },
        Commands::Onboard {
            user_id,
            full_name,
            email,
            phone,
            role,
            company_name,
            meta,
        } => {
            let profile_data = build_profile_data(&config, &full_name, &email, phone, role, company_name, &meta)?;
            InputValidator::validate_user_id(&user_id)?;

            let service = build_service(db);
            let result = service
                .link_anonymous_leads_and_create_profile(&user_id, profile_data)
                .await?;
            print_json(&result)?;
        },
        Commands::CheckUnlinked { email } => {
            let service = build_service(db);
            let count = service.check_unlinked_leads(&InputValidator::normalize_email(&email)).await;
            print_json(&serde_json::json!({ "email": email, "unlinkedLeads": count }))?;
        },
        Commands::UserLeads { user_id } => {
            let leads = db.leads_for_user(&user_id)?;
            info!(user_id = %user_id, count = leads.len(), "Fetched user leads");
            print_json(&leads)?;
        },
        Commands::LeadStats { user_id } => {
            print_json(&db.user_lead_stats(&user_id)?)?;
        },
    }

    Ok(())
}

fn build_service(db: Database) -> OnboardingService {
    OnboardingService::new(
        Arc::new(SqliteRepository::new(db)),
        Arc::new(OnboardingMetrics::new()),
    )
}

/// Validate CLI input and assemble the profile payload
fn build_profile_data(
    config: &AppConfig, full_name: &str, email: &str, phone: Option<String>, role: Option<String>,
    company_name: Option<String>, meta: &[String],
) -> Result<ProfileData> {
    InputValidator::validate_full_name(full_name)?;
    if config.onboarding.validate_email {
        InputValidator::validate_email(email)?;
    }
    if let (Some(phone), true) = (&phone, config.onboarding.validate_phone) {
        InputValidator::validate_phone(phone)?;
    }

    let role = role.map(|r| r.parse::<UserRole>()).transpose()?;

    let mut metadata = Metadata::default();
    for pair in meta {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("metadata must be KEY=VALUE, got {pair}"))?;
        InputValidator::validate_metadata_key(key)?;
        if Metadata::is_reserved_key(key) {
            anyhow::bail!("metadata key {key} is managed by onboarding and cannot be set");
        }
        // Values that parse as JSON keep their type; anything else is a string
        let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
        metadata = metadata.with_extension(key, value);
    }

    if let Some(name) = company_name {
        InputValidator::validate_company_name(&name)?;
        if role != Some(UserRole::Company) {
            warn!("Company name given without --role company; it will be stored but no company profile is created");
        }
        metadata.company_name = Some(name);
    }

    let mut profile_data = ProfileData::new(full_name, InputValidator::normalize_email(email)).with_metadata(metadata);
    profile_data.phone = phone;
    profile_data.role = role;
    Ok(profile_data)
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
