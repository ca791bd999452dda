//! Shared fixtures: services over the in-memory store with a recording mailer

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use library_server::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{
        author::CreateAuthor,
        book::CreateBook,
        member::CreateMember,
        Author, Book, Member,
    },
    repository::Repository,
    services::{
        authorization::Caller,
        cache::MemoryCache,
        email::{Mail, Mailer},
        Services,
    },
    AppState,
};

pub const ADMIN_EMAIL: &str = "admin@library.local";
pub const ADMIN_PASSWORD: &str = "admin-password";

/// Keeps every mail handed to it, or fails on demand
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every send for `delay`, like a slow relay
    pub fn delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: Mail) -> AppResult<()> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Mail("SMTP relay unavailable".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| AppError::Internal("mailer poisoned".to_string()))?
            .push(mail);
        Ok(())
    }
}

pub struct TestApp {
    pub repository: Repository,
    pub services: Services,
    pub mailer: Arc<RecordingMailer>,
    /// Holds every operation claim
    pub admin: Caller,
}

impl TestApp {
    pub async fn new() -> Self {
        let repository = Repository::memory();
        let mailer = Arc::new(RecordingMailer::default());
        let services = Services::new(
            repository.clone(),
            Arc::new(MemoryCache::new()),
            mailer.clone(),
            Duration::from_secs(60),
        );

        services.users.sync_operation_claims().await.unwrap();
        let admin = services
            .users
            .bootstrap_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();

        Self {
            repository,
            services,
            mailer,
            admin: Caller::user(admin.id),
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            config: Arc::new(AppConfig::default()),
            services: Arc::new(self.services.clone()),
        }
    }

    pub async fn book(&self, name: &str, isbn: &str) -> Book {
        self.services
            .books
            .create(
                &self.admin,
                CreateBook {
                    name: name.to_string(),
                    isbn: isbn.to_string(),
                    page: 412,
                    language: "en".to_string(),
                    units_in_stock: 3,
                    description: None,
                    category_id: None,
                    publisher_id: None,
                    author_id: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn author(&self, name: &str) -> Author {
        self.services
            .authors
            .create(
                &self.admin,
                CreateAuthor {
                    name: name.to_string(),
                    identity_number: "1234567890".to_string(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn member(&self, first_name: &str, email: &str) -> Member {
        self.services
            .members
            .create(
                &self.admin,
                CreateMember {
                    first_name: first_name.to_string(),
                    last_name: "Reader".to_string(),
                    email: email.to_string(),
                    password: "secret-password".to_string(),
                    user_id: None,
                },
            )
            .await
            .unwrap()
    }
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}
