use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;

use crate::flow::Step;
use crate::models::{CompanyOutcome, ProfileOutcome};

/// Onboarding metrics.
///
/// Emits through the `metrics` facade (a no-op until the host installs a
/// recorder) and keeps in-process tallies readable via [`Self::snapshot`].
/// Constructed by the host and handed to the service; there is no global
/// instance.
#[derive(Debug)]
pub struct OnboardingMetrics {
    // Metric names
    pub runs_total: &'static str,
    pub step_duration: &'static str,
    pub step_failures_total: &'static str,
    pub leads_linked_total: &'static str,
    pub profiles_total: &'static str,
    pub company_profiles_total: &'static str,
    pub unlinked_checks_total: &'static str,

    tallies: Tallies,
}

#[derive(Debug, Default)]
struct Tallies {
    runs: AtomicU64,
    failed_runs: AtomicU64,
    leads_linked: AtomicU64,
    profiles_created: AtomicU64,
    profiles_updated: AtomicU64,
    company_writes: AtomicU64,
    company_failures: AtomicU64,
    step_failures: AtomicU64,
}

/// Point-in-time copy of the in-process tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Completed or failed onboarding runs
    pub runs: u64,
    /// Runs that ended in failure
    pub failed_runs: u64,
    /// Leads attributed across all runs
    pub leads_linked: u64,
    /// Profiles inserted
    pub profiles_created: u64,
    /// Profiles updated
    pub profiles_updated: u64,
    /// Company profiles inserted or updated
    pub company_writes: u64,
    /// Company writes that failed and were swallowed
    pub company_failures: u64,
    /// Failures of any step
    pub step_failures: u64,
}

impl Default for OnboardingMetrics {
    fn default() -> Self {
        Self {
            runs_total: "homni_onboarding_runs_total",
            step_duration: "homni_onboarding_step_duration_seconds",
            step_failures_total: "homni_onboarding_step_failures_total",
            leads_linked_total: "homni_onboarding_leads_linked_total",
            profiles_total: "homni_onboarding_profiles_total",
            company_profiles_total: "homni_onboarding_company_profiles_total",
            unlinked_checks_total: "homni_onboarding_unlinked_checks_total",
            tallies: Tallies::default(),
        }
    }
}

impl OnboardingMetrics {
    /// Collector with the default metric names
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the end of an onboarding run
    pub fn record_run(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(self.runs_total, "status" => status).increment(1);

        self.tallies.runs.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.tallies.failed_runs.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record how long a step took
    pub fn record_step_duration(&self, step: Step, duration: Duration) {
        histogram!(self.step_duration, "step" => step.as_str()).record(duration.as_secs_f64());
    }

    /// Record a failed step, whether or not it aborted the run
    pub fn record_step_failure(&self, step: Step, error_kind: &'static str) {
        counter!(
            self.step_failures_total,
            "step" => step.as_str(),
            "severity" => step.severity().as_str(),
            "kind" => error_kind
        )
        .increment(1);
        self.tallies.step_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record leads attributed in one run
    pub fn record_leads_linked(&self, count: usize) {
        let count = count as u64;
        counter!(self.leads_linked_total).increment(count);
        self.tallies.leads_linked.fetch_add(count, Ordering::Relaxed);
    }

    /// Record the user profile outcome
    pub fn record_profile(&self, outcome: ProfileOutcome) {
        let label = match outcome {
            ProfileOutcome::Created => {
                self.tallies.profiles_created.fetch_add(1, Ordering::Relaxed);
                "created"
            }
            ProfileOutcome::Updated => {
                self.tallies.profiles_updated.fetch_add(1, Ordering::Relaxed);
                "updated"
            }
        };
        counter!(self.profiles_total, "outcome" => label).increment(1);
    }

    /// Record the company profile outcome
    pub fn record_company(&self, outcome: &CompanyOutcome) {
        match outcome {
            CompanyOutcome::Created | CompanyOutcome::Updated => {
                self.tallies.company_writes.fetch_add(1, Ordering::Relaxed);
            }
            CompanyOutcome::Failed { .. } => {
                self.tallies.company_failures.fetch_add(1, Ordering::Relaxed);
            }
            CompanyOutcome::Skipped => {}
        }
        counter!(self.company_profiles_total, "outcome" => outcome.as_str()).increment(1);
    }

    /// Record an unlinked-lead lookup
    pub fn record_unlinked_check(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(self.unlinked_checks_total, "status" => status).increment(1);
    }

    /// Copy of the in-process tallies
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let t = &self.tallies;
        MetricsSnapshot {
            runs: t.runs.load(Ordering::Relaxed),
            failed_runs: t.failed_runs.load(Ordering::Relaxed),
            leads_linked: t.leads_linked.load(Ordering::Relaxed),
            profiles_created: t.profiles_created.load(Ordering::Relaxed),
            profiles_updated: t.profiles_updated.load(Ordering::Relaxed),
            company_writes: t.company_writes.load(Ordering::Relaxed),
            company_failures: t.company_failures.load(Ordering::Relaxed),
            step_failures: t.step_failures.load(Ordering::Relaxed),
        }
    }
}

/// Times one step and reports it on drop or [`StepTimer::finish`]
pub struct StepTimer<'a> {
    metrics: &'a OnboardingMetrics,
    step: Step,
    start: Instant,
}

impl<'a> StepTimer<'a> {
    /// Start timing `step`.
    #[must_use]
    pub fn start(metrics: &'a OnboardingMetrics, step: Step) -> Self {
        Self {
            metrics,
            step,
            start: Instant::now(),
        }
    }

    /// Stop timing and return the elapsed time.
    pub fn finish(self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for StepTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_step_duration(self.step, self.start.elapsed());
    }
}
