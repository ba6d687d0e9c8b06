//! Homni Onboarding - Lead Attribution and Profile Materialization
//!
//! Consumers can submit service requests (leads) on the Homni marketplace
//! before they have an account. When they later sign up, this library links
//! those anonymous leads to the new account and creates or updates the
//! account's profile records.
//!
//! # Features
//!
//! - Attribute anonymous leads to an account by email
//! - Create or merge the user profile with typed metadata
//! - Best-effort company profile for company signups
//! - SQLite storage behind an async repository trait
//! - Configurable logging and metrics

/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Onboarding flow states and step severities
pub mod flow;
/// Logging setup and utilities
pub mod logging;
/// Typed profile metadata
pub mod metadata;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Repository pattern for data access
pub mod repository;
/// Database schema definitions
pub mod schema;
/// Onboarding service
pub mod service;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use error::{OnboardingError, Result};
pub use metadata::Metadata;
pub use metrics::OnboardingMetrics;
pub use models::{CompanyOutcome, LinkResult, ProfileData, ProfileOutcome, UserRole};
pub use repository::{OnboardingRepository, SqliteRepository};
pub use service::OnboardingService;
