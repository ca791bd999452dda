//! Account rules: users, members and operation claims

use uuid::Uuid;

use super::{ensure_absent, excluding};
use crate::{
    error::AppResult,
    models::{Member, OperationClaim, User, UserOperationClaim},
    repository::{Query, Repository},
};

pub const USER_EMAIL_EXISTS: &str = "User email already exists";
pub const MEMBER_EMAIL_EXISTS: &str = "Member email already exists";
pub const USER_ALREADY_MEMBER: &str = "User already has a member";
pub const CLAIM_NAME_EXISTS: &str = "Operation claim already exists";
pub const CLAIM_ALREADY_GRANTED: &str = "User already has this operation claim";

/// Emails are compared lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn check_user_email_unique(
    repository: &Repository,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let same_email = Query::new().eq("email", normalize_email(email));
    ensure_absent::<User>(repository, excluding(same_email, except), USER_EMAIL_EXISTS).await
}

pub async fn check_member_email_unique(
    repository: &Repository,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let same_email = Query::new().eq("email", normalize_email(email));
    ensure_absent::<Member>(repository, excluding(same_email, except), MEMBER_EMAIL_EXISTS).await
}

/// A user owns at most one member, soft-deleted ones included
pub async fn check_user_has_no_member(repository: &Repository, user_id: Uuid) -> AppResult<()> {
    let owned = Query::new().eq("user_id", user_id).with_deleted();
    ensure_absent::<Member>(repository, owned, USER_ALREADY_MEMBER).await
}

pub async fn check_claim_name_unique(
    repository: &Repository,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let same_name = Query::new().eq("name", name);
    ensure_absent::<OperationClaim>(repository, excluding(same_name, except), CLAIM_NAME_EXISTS).await
}

pub async fn check_claim_not_granted(
    repository: &Repository,
    user_id: Uuid,
    operation_claim_id: Uuid,
    except: Option<Uuid>,
) -> AppResult<()> {
    let grant = Query::new()
        .eq("user_id", user_id)
        .eq("operation_claim_id", operation_claim_id);
    ensure_absent::<UserOperationClaim>(repository, excluding(grant, except), CLAIM_ALREADY_GRANTED)
        .await
}
