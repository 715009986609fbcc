//! Business logic services

pub mod auth;
pub mod catalog;
pub mod ledger;
pub mod loans;
pub mod users;

use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    config::{AuthConfig, LoansConfig},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub users: users::UsersService,
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services with the given repository, on the wall clock
    pub fn new(repository: Repository, auth_config: AuthConfig, loans_config: LoansConfig) -> Self {
        Self::with_clock(repository, auth_config, loans_config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repository: Repository,
        auth_config: AuthConfig,
        loans_config: LoansConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = ledger::Ledger::new(
            Arc::new(repository.ledger.clone()),
            clock,
            loans_config,
        );

        Self {
            auth: auth::AuthService::new(repository.clone(), auth_config),
            catalog: catalog::CatalogService::new(repository.clone()),
            users: users::UsersService::new(repository.clone()),
            loans: loans::LoansService::new(repository, ledger),
        }
    }
}
