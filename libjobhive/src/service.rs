//! Service facade wiring the stores and queries together
//!
//! `JobHiveService` is constructed once per application session. It owns
//! the shared collaborators (token store, transport) and hands out the
//! session store, the resource queries and the applicant store by
//! reference, so consumers never reach for globals and every test can
//! start from a fresh instance.
//!
//! # Example
//!
//! ```no_run
//! use libjobhive::service::JobHiveService;
//!
//! # async fn example() -> libjobhive::Result<()> {
//! let service = JobHiveService::new()?;
//!
//! let session = service.session().fetch_authenticated_user().await?;
//! if session.is_authenticated {
//!     let top = service.api().top_companies().load().await;
//!     println!("{} top companies", top.data.map(|d| d.len()).unwrap_or(0));
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::api::JobApi;
use crate::applicants::ApplicantStore;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::session::{HttpAuthBackend, SessionStore};
use crate::token_store::{open_token_store, TokenStore};
use crate::transport::http::HttpTransport;
use crate::transport::Transport;
use crate::types::ApplicationStatus;

pub struct JobHiveService {
    tokens: Arc<dyn TokenStore>,
    session: SessionStore,
    api: JobApi,
    applicants: ApplicantStore,
}

impl JobHiveService {
    /// Create a service from the configuration file (or defaults)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or parsed, or
    /// the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let config = Config::load_or_default()?;
        Self::from_config(&config)
    }

    /// Create a service from an explicit configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.api)?);
        let tokens: Arc<dyn TokenStore> = Arc::from(open_token_store(&config.token)?);
        tracing::debug!(
            "JobHive service for {} (token backend: {})",
            config.api.base_url,
            tokens.backend_name()
        );
        Ok(Self::with_parts(config, transport, tokens))
    }

    /// Assemble a service from already-built collaborators
    pub fn with_parts(
        config: &Config,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let backend = HttpAuthBackend::new(Arc::clone(&transport), config.api.whoami_path.clone());
        let session = SessionStore::new(Arc::clone(&tokens), Arc::new(backend));
        let api = JobApi::new(transport, Arc::clone(&tokens))
            .with_top_companies_ttl(config.cache.top_companies_ttl);

        Self {
            tokens,
            session,
            api,
            applicants: ApplicantStore::new(),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn api(&self) -> &JobApi {
        &self.api
    }

    pub fn applicants(&self) -> &ApplicantStore {
        &self.applicants
    }

    pub fn token_store(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// Reload the business applications into the applicant store
    ///
    /// Toggles the store's loading flag around the request. On failure the
    /// previous list is kept.
    ///
    /// # Errors
    ///
    /// Returns the `ApiError` of the request; `MissingToken` when signed out.
    pub async fn refresh_applicants(&self) -> std::result::Result<usize, ApiError> {
        self.applicants.set_is_loading(true);
        let result = self.api.business_applications().await;
        if let Ok(applications) = &result {
            self.applicants.set_applications(applications.clone());
        }
        self.applicants.set_is_loading(false);
        result.map(|applications| applications.len())
    }

    /// Change an application's status and mirror it in the applicant store
    ///
    /// Unlike `JobApi::update_application_status`, a successful update is
    /// patched into the store so it does not show the old status.
    pub async fn update_status_and_sync(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> bool {
        let updated = self
            .api
            .update_application_status(application_id, status)
            .await;
        if updated && !self.applicants.apply_status(application_id, status) {
            tracing::debug!(
                "Application {} not in the applicant store; nothing to patch",
                application_id
            );
        }
        updated
    }

    /// Sign out and forget everything cached for the previous account
    pub fn sign_out(&self) -> Result<()> {
        self.session.remove_user()?;
        self.applicants.set_applications(Vec::new());
        self.api.invalidate_company_searches();
        Ok(())
    }
}
