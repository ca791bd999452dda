//! Business logic services

pub mod authorization;
pub mod books;
pub mod cache;
pub mod catalog;
pub mod email;
pub mod loan_transactions;
pub mod members;
pub mod pipeline;
pub mod reservations;
pub mod users;

use std::{sync::Arc, time::Duration};

use crate::{
    models::{Author, Category, Publisher},
    repository::Repository,
};

use authorization::{Authorizer, ClaimsAuthorizer};
use cache::CacheStore;
use email::Mailer;
use pipeline::Pipeline;

/// Cache groups evicted by commands
pub mod groups {
    pub const BOOKS: &str = "GetBooks";
    pub const AUTHORS: &str = "GetAuthors";
    pub const CATEGORIES: &str = "GetCategories";
    pub const PUBLISHERS: &str = "GetPublishers";
    pub const MEMBERS: &str = "GetMembers";
    pub const LOAN_TRANSACTIONS: &str = "GetLoanTransactions";
    pub const RESERVATIONS: &str = "GetReservations";
    pub const USERS: &str = "GetUsers";
    pub const OPERATION_CLAIMS: &str = "GetOperationClaims";
    pub const USER_OPERATION_CLAIMS: &str = "GetUserOperationClaims";
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub pipeline: Pipeline,
    pub books: books::BooksService,
    pub authors: catalog::CatalogService<Author>,
    pub categories: catalog::CatalogService<Category>,
    pub publishers: catalog::CatalogService<Publisher>,
    pub members: members::MembersService,
    pub loan_transactions: loan_transactions::LoanTransactionsService,
    pub reservations: reservations::ReservationsService,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services; grants are read from the operation claim tables
    pub fn new(
        repository: Repository,
        cache: Arc<dyn CacheStore>,
        mailer: Arc<dyn Mailer>,
        cache_ttl: Duration,
    ) -> Self {
        let authorizer = Arc::new(ClaimsAuthorizer::new(repository.clone()));
        Self::with_authorizer(repository, cache, authorizer, mailer, cache_ttl)
    }

    pub fn with_authorizer(
        repository: Repository,
        cache: Arc<dyn CacheStore>,
        authorizer: Arc<dyn Authorizer>,
        mailer: Arc<dyn Mailer>,
        cache_ttl: Duration,
    ) -> Self {
        let pipeline = Pipeline::new(repository, cache, authorizer, cache_ttl);
        Self {
            books: books::BooksService::new(pipeline.clone()),
            authors: catalog::CatalogService::new(pipeline.clone()),
            categories: catalog::CatalogService::new(pipeline.clone()),
            publishers: catalog::CatalogService::new(pipeline.clone()),
            members: members::MembersService::new(pipeline.clone()),
            loan_transactions: loan_transactions::LoanTransactionsService::new(
                pipeline.clone(),
                mailer,
            ),
            reservations: reservations::ReservationsService::new(pipeline.clone()),
            users: users::UsersService::new(pipeline.clone()),
            pipeline,
        }
    }
}
