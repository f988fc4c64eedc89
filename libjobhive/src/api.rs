//! Resource queries against the JobHive backend
//!
//! `JobApi` hands out `Query` handles for the read-only resources
//! (company search, company detail, top hiring companies, interview prep)
//! and performs the uncached calls (business applications, application
//! status updates).
//!
//! | query              | key                              | freshness        |
//! |--------------------|----------------------------------|------------------|
//! | `companies`        | `companies?search={q}`           | until invalidated|
//! | `company`          | `company?id={id}`                | until invalidated|
//! | `top_companies`    | `top-companies`                  | one hour         |
//! | `interview_prep`   | `interview-prep?company={id}`    | until invalidated|

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::query::{Freshness, Query, QueryCache, QueryKey};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, Transport};
use crate::types::{Application, ApplicationStatus, Company, InterviewPrep, TopCompany};

/// Default freshness window of the top-hiring-companies aggregate
pub const TOP_COMPANIES_TTL: Duration = Duration::from_secs(60 * 60);

pub struct JobApi {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    top_companies_ttl: Duration,
    companies: QueryCache<Vec<Company>>,
    company: QueryCache<Company>,
    top_companies: QueryCache<Vec<TopCompany>>,
    interview_prep: QueryCache<InterviewPrep>,
}

impl JobApi {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            tokens,
            top_companies_ttl: TOP_COMPANIES_TTL,
            companies: QueryCache::new(),
            company: QueryCache::new(),
            top_companies: QueryCache::new(),
            interview_prep: QueryCache::new(),
        }
    }

    pub fn with_top_companies_ttl(mut self, ttl: Duration) -> Self {
        self.top_companies_ttl = ttl;
        self
    }

    /// Companies matching a search string: `GET /companies?search={q}`
    pub fn companies(&self, search: &str) -> Query<Vec<Company>> {
        let transport = Arc::clone(&self.transport);
        let search = search.to_string();
        let key = QueryKey::new("companies").param("search", search.clone());

        Query::new(Some(key), Freshness::Forever, self.companies.clone(), move || {
            let transport = Arc::clone(&transport);
            let request = ApiRequest::get("/companies").query("search", search.clone());
            async move { transport.send(request).await?.decode::<Vec<Company>>("companies") }
        })
    }

    /// One company by id: `GET /companies/{id}`
    ///
    /// Disabled while `id` is `None`.
    pub fn company(&self, id: Option<&str>) -> Query<Company> {
        let transport = Arc::clone(&self.transport);
        let key = id.map(|id| QueryKey::new("company").param("id", id));
        let id = id.unwrap_or_default().to_string();

        Query::new(key, Freshness::Forever, self.company.clone(), move || {
            let transport = Arc::clone(&transport);
            let request = ApiRequest::get("/companies").segment(id.clone());
            async move { transport.send(request).await?.decode::<Company>("company") }
        })
    }

    /// Top hiring companies: `GET /companies/top-hiring-companies`
    ///
    /// Served from cache for the configured window after a successful fetch.
    pub fn top_companies(&self) -> Query<Vec<TopCompany>> {
        let transport = Arc::clone(&self.transport);

        Query::new(
            Some(QueryKey::new("top-companies")),
            Freshness::For(self.top_companies_ttl),
            self.top_companies.clone(),
            move || {
                let transport = Arc::clone(&transport);
                async move {
                    transport
                        .send(ApiRequest::get("/companies/top-hiring-companies"))
                        .await?
                        .decode::<Vec<TopCompany>>("top-companies")
                }
            },
        )
    }

    /// Interview preparation for a company: `GET /companies/{id}/interview-prep`
    ///
    /// Disabled while `company_id` is `None`.
    pub fn interview_prep(&self, company_id: Option<&str>) -> Query<InterviewPrep> {
        let transport = Arc::clone(&self.transport);
        let key = company_id.map(|id| QueryKey::new("interview-prep").param("company", id));
        let company_id = company_id.unwrap_or_default().to_string();

        Query::new(key, Freshness::Forever, self.interview_prep.clone(), move || {
            let transport = Arc::clone(&transport);
            let request = ApiRequest::get("/companies")
                .segment(company_id.clone())
                .segment("interview-prep");
            async move { transport.send(request).await?.decode::<InterviewPrep>("interview-prep") }
        })
    }

    /// Drop the cached detail of one company
    pub fn invalidate_company(&self, id: &str) {
        self.company
            .invalidate(&QueryKey::new("company").param("id", id));
    }

    /// Drop every cached company search result
    pub fn invalidate_company_searches(&self) {
        self.companies.clear();
    }

    fn bearer_token(&self) -> Result<SecretString, ApiError> {
        match self.tokens.get() {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(ApiError::MissingToken),
            Err(e) => {
                tracing::warn!("Could not read auth token ({}): {}", self.tokens.backend_name(), e);
                Err(ApiError::Storage(e.to_string()))
            }
        }
    }

    /// Applications received by the signed-in business: `GET /applications/business`
    ///
    /// Not cached; the applicant store holds the result.
    ///
    /// # Errors
    ///
    /// `ApiError::MissingToken` without a stored token and
    /// `ApiError::Storage` when the token store cannot be read (no request
    /// is made in either case), otherwise transport, status and decode
    /// errors.
    pub async fn business_applications(&self) -> Result<Vec<Application>, ApiError> {
        let token = self.bearer_token()?;
        self.transport
            .send(ApiRequest::get("/applications/business").bearer(&token))
            .await?
            .decode("applications")
    }

    /// Change an application's status:
    /// `PATCH /applications/{id}/updateStatus?status={status}`
    ///
    /// Returns `true` only when the backend answers `200 OK`. A missing
    /// token, a storage failure, a transport failure or any other status
    /// yields `false`; without a token no request is made.
    ///
    /// The applicant store is not updated; callers refresh or patch it
    /// themselves (see `JobHiveService::update_status_and_sync`).
    pub async fn update_application_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> bool {
        let token = match self.bearer_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!("Skipping status update for {}: {}", application_id, e);
                return false;
            }
        };

        let request = ApiRequest::patch("/applications")
            .segment(application_id)
            .segment("updateStatus")
            .query("status", status.as_str())
            .bearer(&token);

        match self.transport.send(request).await {
            Ok(response) if response.status == 200 => true,
            Ok(response) => {
                tracing::debug!(
                    "Status update for {} rejected with {}",
                    application_id,
                    response.status
                );
                false
            }
            Err(e) => {
                tracing::debug!("Status update for {} failed: {}", application_id, e);
                false
            }
        }
    }
}
