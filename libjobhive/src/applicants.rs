//! Applicant list store for business accounts
//!
//! Holds the applications a business has received. The list is replaced
//! wholesale; there is no merge and no timestamp reconciliation, so the
//! last `set_applications` call wins regardless of how old its data is.
//! `is_loading` is a separate flag that callers toggle around their own
//! fetches.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::types::{Application, ApplicationStatus};

/// Snapshot of the applicant list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicantsState {
    pub applications: Vec<Application>,
    pub is_loading: bool,
}

pub struct ApplicantStore {
    state: watch::Sender<ApplicantsState>,
}

impl Default for ApplicantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicantStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ApplicantsState::default());
        Self { state }
    }

    pub fn snapshot(&self) -> ApplicantsState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ApplicantsState> {
        self.state.subscribe()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.state.borrow().applications.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Replace the whole list
    pub fn set_applications(&self, applications: Vec<Application>) {
        tracing::debug!("Applicant list replaced ({} applications)", applications.len());
        self.state.send_modify(|state| state.applications = applications);
    }

    pub fn set_is_loading(&self, is_loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.is_loading != is_loading;
            state.is_loading = is_loading;
            changed
        });
    }

    /// Patch one application's status in place
    ///
    /// Returns `false` when no application with that id is held.
    pub fn apply_status(&self, application_id: &str, status: ApplicationStatus) -> bool {
        self.state.send_if_modified(|state| {
            match state
                .applications
                .iter_mut()
                .find(|application| application.id == application_id)
            {
                Some(application) => {
                    application.status = status;
                    true
                }
                None => false,
            }
        })
    }

    /// Number of applications received in the last `days` days
    pub fn applicants_in_last_n_days(&self, days: u32) -> usize {
        self.applicants_in_last_n_days_at(days, Utc::now())
    }

    /// Number of applications with `applied_at >= now - days`
    ///
    /// The boundary is inclusive: with `days = 0` an application stamped
    /// exactly `now` is counted.
    pub fn applicants_in_last_n_days_at(&self, days: u32, now: DateTime<Utc>) -> usize {
        let cutoff = window_start(days, now);
        self.state
            .borrow()
            .applications
            .iter()
            .filter(|application| within(application, cutoff))
            .count()
    }

    /// The applications counted by `applicants_in_last_n_days_at`
    pub fn applications_in_last_n_days_at(&self, days: u32, now: DateTime<Utc>) -> Vec<Application> {
        let cutoff = window_start(days, now);
        self.state
            .borrow()
            .applications
            .iter()
            .filter(|application| within(application, cutoff))
            .cloned()
            .collect()
    }
}

/// Start of the window, `None` when it predates every representable time
fn window_start(days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
}

fn within(application: &Application, cutoff: Option<DateTime<Utc>>) -> bool {
    cutoff.map_or(true, |cutoff| application.applied_at >= cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(id: &str, applied_at: DateTime<Utc>) -> Application {
        Application::new(id, applied_at)
    }

    #[test]
    fn test_count_in_last_seven_days() {
        let now = Utc::now();
        let store = ApplicantStore::new();
        store.set_applications(vec![
            application("a", now - Duration::days(1)),
            application("b", now - Duration::days(8)),
            application("c", now - Duration::days(30)),
        ]);

        assert_eq!(store.applicants_in_last_n_days_at(7, now), 1);
        assert_eq!(store.applicants_in_last_n_days_at(30, now), 3);
    }

    #[test]
    fn test_zero_days_includes_exactly_now() {
        let now = Utc::now();
        let store = ApplicantStore::new();
        store.set_applications(vec![
            application("now", now),
            application("earlier", now - Duration::seconds(1)),
        ]);

        assert_eq!(store.applicants_in_last_n_days_at(0, now), 1);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let now = Utc::now();
        let store = ApplicantStore::new();
        store.set_applications(vec![application("edge", now - Duration::days(7))]);

        assert_eq!(store.applicants_in_last_n_days_at(7, now), 1);
        assert_eq!(store.applicants_in_last_n_days_at(6, now), 0);
    }

    #[test]
    fn test_set_applications_replaces() {
        let now = Utc::now();
        let store = ApplicantStore::new();
        let a = application("a", now);
        let b = application("b", now);

        store.set_applications(vec![]);
        store.set_applications(vec![a.clone(), b.clone()]);
        assert_eq!(store.applications(), vec![a.clone(), b.clone()]);

        store.set_applications(vec![b.clone()]);
        assert_eq!(store.applications(), vec![b]);
    }

    #[test]
    fn test_loading_flag_is_independent() {
        let store = ApplicantStore::new();
        store.set_is_loading(true);
        store.set_applications(vec![application("a", Utc::now())]);
        assert!(store.is_loading());

        store.set_is_loading(false);
        assert!(!store.is_loading());
        assert_eq!(store.applications().len(), 1);
    }

    #[test]
    fn test_apply_status() {
        let store = ApplicantStore::new();
        store.set_applications(vec![application("a", Utc::now())]);

        assert!(store.apply_status("a", ApplicationStatus::Interview));
        assert_eq!(store.applications()[0].status, ApplicationStatus::Interview);
        assert!(!store.apply_status("missing", ApplicationStatus::Rejected));
    }

    #[test]
    fn test_huge_window_counts_everything() {
        let now = Utc::now();
        let store = ApplicantStore::new();
        store.set_applications(vec![
            application("recent", now),
            application("ancient", DateTime::<Utc>::MIN_UTC),
        ]);

        assert_eq!(store.applicants_in_last_n_days_at(100_000_000, now), 2);
        assert_eq!(store.applicants_in_last_n_days_at(u32::MAX, now), 2);
        assert_eq!(store.applicants_in_last_n_days(u32::MAX), 2);
    }

    #[test]
    fn test_applications_in_window_match_count() {
        let now = Utc::now();
        let store = ApplicantStore::new();
        store.set_applications(vec![
            application("a", now - Duration::days(1)),
            application("b", now - Duration::days(8)),
        ]);

        let recent = store.applications_in_last_n_days_at(7, now);
        assert_eq!(recent.len(), store.applicants_in_last_n_days_at(7, now));
        assert_eq!(recent[0].id, "a");
    }

    #[test]
    fn test_empty_store_counts_zero() {
        let store = ApplicantStore::new();
        assert_eq!(store.applicants_in_last_n_days(7), 0);
    }
}
