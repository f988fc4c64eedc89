//! JobHive - client-side state and data access for the JobHive job board
//!
//! This library holds everything the JobHive apps need between the screens
//! and the REST backend: the persisted bearer token, the authentication
//! session, cached and coalesced resource queries, and the applicant list
//! of a business account.

pub mod api;
pub mod applicants;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod service;
pub mod session;
pub mod token_store;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use applicants::ApplicantStore;
pub use config::Config;
pub use error::{ApiError, JobHiveError, Result, StorageError};
pub use service::JobHiveService;
pub use session::{Session, SessionStore};
pub use token_store::{open_token_store, TokenStore};
pub use types::{Application, ApplicationStatus, Company, TopCompany, User, UserType};
