//! User accounts, operation claims and claim assignments

use std::collections::HashSet;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use futures::FutureExt;
use uuid::Uuid;
use validator::Validate;

use super::{
    authorization::{capabilities, Caller},
    groups,
    pipeline::{cache_key, Operation, Pipeline},
};
use crate::{
    error::{AppError, AppResult},
    models::{
        user::{
            CreateUser, CreateUserOperationClaim, OperationClaimRequest, UpdateUser,
            UserOperationClaimQuery,
        },
        Audit, AuthenticatorType, ListQuery, OperationClaim, User, UserOperationClaim,
    },
    repository::{Page, PageRequest, Query, Repository},
    rules::{self, user::normalize_email},
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

const USER_GROUPS: &[&str] = &[groups::USERS, groups::MEMBERS, groups::USER_OPERATION_CLAIMS];
const CLAIM_GROUPS: &[&str] = &[groups::OPERATION_CLAIMS, groups::USER_OPERATION_CLAIMS];

/// Insert a user after the uniqueness check. Shared with member creation.
pub(crate) async fn add_user(
    repository: &Repository,
    email: &str,
    password: &str,
    authenticator_type: AuthenticatorType,
) -> AppResult<User> {
    rules::user::check_user_email_unique(repository, email, None).await?;
    let user = User {
        id: Uuid::new_v4(),
        email: normalize_email(email),
        password_hash: hash_password(password)?,
        authenticator_type,
        audit: Audit::new(),
    };
    repository.table::<User>().add(user).await
}

#[derive(Clone)]
pub struct UsersService {
    pipeline: Pipeline,
}

impl UsersService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    // Users

    pub async fn create(&self, caller: &Caller, request: CreateUser) -> AppResult<User> {
        request.validate()?;
        let operation = Operation::command("CreateUser")
            .requires(&[capabilities::users::CREATE])
            .invalidates(USER_GROUPS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    add_user(
                        &repository,
                        &request.email,
                        &request.password,
                        request.authenticator_type,
                    )
                    .await
                }
                .boxed()
            })
            .await
    }

    pub async fn update(&self, caller: &Caller, id: Uuid, request: UpdateUser) -> AppResult<User> {
        request.validate()?;
        let operation = Operation::command("UpdateUser")
            .requires(&[capabilities::users::UPDATE])
            .invalidates(USER_GROUPS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut user = repository.require::<User>(id).await?;
                    rules::user::check_user_email_unique(&repository, &request.email, Some(id))
                        .await?;

                    user.email = normalize_email(&request.email);
                    user.authenticator_type = request.authenticator_type;
                    if let Some(password) = &request.password {
                        user.password_hash = hash_password(password)?;
                    }
                    repository.table::<User>().update(user).await
                }
                .boxed()
            })
            .await
    }

    /// Soft delete; the member and claim assignments follow
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> AppResult<User> {
        let operation = Operation::command("DeleteUser")
            .requires(&[capabilities::users::DELETE])
            .invalidates(&[
                groups::USERS,
                groups::MEMBERS,
                groups::USER_OPERATION_CLAIMS,
                groups::LOAN_TRANSACTIONS,
                groups::RESERVATIONS,
            ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let user = repository.require::<User>(id).await?;
                    repository.table::<User>().delete(user, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> AppResult<User> {
        let operation = Operation::query("GetByIdUser").requires(&[capabilities::users::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.require::<User>(id).await }.boxed()
            })
            .await
    }

    pub async fn list(&self, caller: &Caller, params: ListQuery) -> AppResult<Page<User>> {
        let operation = Operation::query("GetListUsers")
            .requires(&[capabilities::users::READ])
            .cached(cache_key("GetListUsers", &params), groups::USERS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let query = Query::new()
                        .contains_opt("email", params.name.as_deref())
                        .paginate(PageRequest::from_params(params.page, params.per_page));
                    repository.table::<User>().list(query).await
                }
                .boxed()
            })
            .await
    }

    // Operation claims

    pub async fn create_claim(
        &self,
        caller: &Caller,
        request: OperationClaimRequest,
    ) -> AppResult<OperationClaim> {
        request.validate()?;
        let operation = Operation::command("CreateOperationClaim")
            .requires(&[capabilities::operation_claims::CREATE])
            .invalidates(CLAIM_GROUPS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    rules::user::check_claim_name_unique(&repository, &request.name, None).await?;
                    let claim = OperationClaim {
                        id: Uuid::new_v4(),
                        name: request.name,
                        audit: Audit::new(),
                    };
                    repository.table::<OperationClaim>().add(claim).await
                }
                .boxed()
            })
            .await
    }

    pub async fn update_claim(
        &self,
        caller: &Caller,
        id: Uuid,
        request: OperationClaimRequest,
    ) -> AppResult<OperationClaim> {
        request.validate()?;
        let operation = Operation::command("UpdateOperationClaim")
            .requires(&[capabilities::operation_claims::UPDATE])
            .invalidates(CLAIM_GROUPS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut claim = repository.require::<OperationClaim>(id).await?;
                    rules::user::check_claim_name_unique(&repository, &request.name, Some(id))
                        .await?;
                    claim.name = request.name;
                    repository.table::<OperationClaim>().update(claim).await
                }
                .boxed()
            })
            .await
    }

    pub async fn delete_claim(&self, caller: &Caller, id: Uuid) -> AppResult<OperationClaim> {
        let operation = Operation::command("DeleteOperationClaim")
            .requires(&[capabilities::operation_claims::DELETE])
            .invalidates(CLAIM_GROUPS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let claim = repository.require::<OperationClaim>(id).await?;
                    repository.table::<OperationClaim>().delete(claim, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get_claim(&self, caller: &Caller, id: Uuid) -> AppResult<OperationClaim> {
        let operation = Operation::query("GetByIdOperationClaim")
            .requires(&[capabilities::operation_claims::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.require::<OperationClaim>(id).await }.boxed()
            })
            .await
    }

    pub async fn list_claims(
        &self,
        caller: &Caller,
        params: ListQuery,
    ) -> AppResult<Page<OperationClaim>> {
        let operation = Operation::query("GetListOperationClaims")
            .requires(&[capabilities::operation_claims::READ])
            .cached(
                cache_key("GetListOperationClaims", &params),
                groups::OPERATION_CLAIMS,
            );

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let query = Query::new()
                        .contains_opt("name", params.name.as_deref())
                        .paginate(PageRequest::from_params(params.page, params.per_page));
                    repository.table::<OperationClaim>().list(query).await
                }
                .boxed()
            })
            .await
    }

    // Claim assignments

    pub async fn grant(
        &self,
        caller: &Caller,
        request: CreateUserOperationClaim,
    ) -> AppResult<UserOperationClaim> {
        let operation = Operation::command("CreateUserOperationClaim")
            .requires(&[capabilities::user_operation_claims::CREATE])
            .invalidates(&[groups::USER_OPERATION_CLAIMS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    repository.require::<User>(request.user_id).await?;
                    repository
                        .require::<OperationClaim>(request.operation_claim_id)
                        .await?;
                    rules::user::check_claim_not_granted(
                        &repository,
                        request.user_id,
                        request.operation_claim_id,
                        None,
                    )
                    .await?;

                    let grant = UserOperationClaim {
                        id: Uuid::new_v4(),
                        user_id: request.user_id,
                        operation_claim_id: request.operation_claim_id,
                        audit: Audit::new(),
                    };
                    repository.table::<UserOperationClaim>().add(grant).await
                }
                .boxed()
            })
            .await
    }

    pub async fn update_grant(
        &self,
        caller: &Caller,
        id: Uuid,
        request: CreateUserOperationClaim,
    ) -> AppResult<UserOperationClaim> {
        let operation = Operation::command("UpdateUserOperationClaim")
            .requires(&[capabilities::user_operation_claims::UPDATE])
            .invalidates(&[groups::USER_OPERATION_CLAIMS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut grant = repository.require::<UserOperationClaim>(id).await?;
                    repository.require::<User>(request.user_id).await?;
                    repository
                        .require::<OperationClaim>(request.operation_claim_id)
                        .await?;
                    rules::user::check_claim_not_granted(
                        &repository,
                        request.user_id,
                        request.operation_claim_id,
                        Some(id),
                    )
                    .await?;

                    grant.user_id = request.user_id;
                    grant.operation_claim_id = request.operation_claim_id;
                    repository.table::<UserOperationClaim>().update(grant).await
                }
                .boxed()
            })
            .await
    }

    pub async fn revoke(&self, caller: &Caller, id: Uuid) -> AppResult<UserOperationClaim> {
        let operation = Operation::command("DeleteUserOperationClaim")
            .requires(&[capabilities::user_operation_claims::DELETE])
            .invalidates(&[groups::USER_OPERATION_CLAIMS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let grant = repository.require::<UserOperationClaim>(id).await?;
                    repository
                        .table::<UserOperationClaim>()
                        .delete(grant, false)
                        .await
                }
                .boxed()
            })
            .await
    }

    pub async fn get_grant(&self, caller: &Caller, id: Uuid) -> AppResult<UserOperationClaim> {
        let operation = Operation::query("GetByIdUserOperationClaim")
            .requires(&[capabilities::user_operation_claims::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.require::<UserOperationClaim>(id).await }.boxed()
            })
            .await
    }

    pub async fn list_grants(
        &self,
        caller: &Caller,
        params: UserOperationClaimQuery,
    ) -> AppResult<Page<UserOperationClaim>> {
        let operation = Operation::query("GetListUserOperationClaims")
            .requires(&[capabilities::user_operation_claims::READ])
            .cached(
                cache_key("GetListUserOperationClaims", &params),
                groups::USER_OPERATION_CLAIMS,
            );

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let query = Query::new()
                        .eq_opt("user_id", params.user_id)
                        .eq_opt("operation_claim_id", params.operation_claim_id)
                        .paginate(PageRequest::from_params(params.page, params.per_page));
                    repository.table::<UserOperationClaim>().list(query).await
                }
                .boxed()
            })
            .await
    }

    // Startup

    /// Insert every catalog capability missing from `operation_claims`.
    /// Returns the number of claims added.
    pub async fn sync_operation_claims(&self) -> AppResult<usize> {
        let operation = Operation::command("SyncOperationClaims").invalidates(CLAIM_GROUPS);

        self.pipeline
            .run(&Caller::anonymous(), operation, |repository| {
                async move {
                    let existing: HashSet<String> = repository
                        .table::<OperationClaim>()
                        .list(Query::new())
                        .await?
                        .items
                        .into_iter()
                        .map(|claim| claim.name)
                        .collect();

                    let mut added = 0;
                    for name in capabilities::catalog() {
                        if existing.contains(name) {
                            continue;
                        }
                        let claim = OperationClaim {
                            id: Uuid::new_v4(),
                            name: name.to_string(),
                            audit: Audit::new(),
                        };
                        repository.table::<OperationClaim>().add(claim).await?;
                        added += 1;
                    }
                    Ok(added)
                }
                .boxed()
            })
            .await
    }

    /// Find or create the configured administrator and grant them every claim
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> AppResult<User> {
        let operation = Operation::command("BootstrapAdmin").invalidates(USER_GROUPS);
        let email = normalize_email(email);
        let password = password.to_string();

        self.pipeline
            .run(&Caller::anonymous(), operation, move |repository| {
                async move {
                    let existing = repository
                        .table::<User>()
                        .get(Query::new().eq("email", email.clone()))
                        .await?;
                    let admin = match existing {
                        Some(user) => user,
                        None => {
                            add_user(&repository, &email, &password, AuthenticatorType::None).await?
                        }
                    };

                    let granted: HashSet<Uuid> = repository
                        .table::<UserOperationClaim>()
                        .list(Query::new().eq("user_id", admin.id))
                        .await?
                        .items
                        .into_iter()
                        .map(|grant| grant.operation_claim_id)
                        .collect();
                    let claims = repository
                        .table::<OperationClaim>()
                        .list(Query::new())
                        .await?
                        .items;

                    for claim in claims.into_iter().filter(|claim| !granted.contains(&claim.id)) {
                        let grant = UserOperationClaim {
                            id: Uuid::new_v4(),
                            user_id: admin.id,
                            operation_claim_id: claim.id,
                            audit: Audit::new(),
                        };
                        repository.table::<UserOperationClaim>().add(grant).await?;
                    }
                    Ok(admin)
                }
                .boxed()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "battery staple").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("not-a-hash", "secret").is_err());
    }
}
