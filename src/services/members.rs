//! Library member service

use futures::FutureExt;
use uuid::Uuid;
use validator::Validate;

use super::{
    authorization::{capabilities::members, Caller},
    groups,
    pipeline::{cache_key, Operation, Pipeline},
    users::{add_user, hash_password},
};
use crate::{
    error::AppResult,
    models::{
        member::{CreateMember, UpdateMember},
        Audit, AuthenticatorType, ListQuery, Member, User,
    },
    repository::{Page, PageRequest, Query},
    rules::{self, user::normalize_email},
};

#[derive(Clone)]
pub struct MembersService {
    pipeline: Pipeline,
}

impl MembersService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Register a member. Without `user_id` a user account is created for them.
    pub async fn create(&self, caller: &Caller, request: CreateMember) -> AppResult<Member> {
        request.validate()?;
        let operation = Operation::command("CreateMember")
            .requires(&[members::CREATE])
            .invalidates(&[groups::MEMBERS, groups::USERS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    rules::user::check_member_email_unique(&repository, &request.email, None)
                        .await?;

                    let user_id = match request.user_id {
                        Some(user_id) => {
                            repository.require::<User>(user_id).await?;
                            rules::user::check_user_has_no_member(&repository, user_id).await?;
                            user_id
                        }
                        None => {
                            add_user(
                                &repository,
                                &request.email,
                                &request.password,
                                AuthenticatorType::None,
                            )
                            .await?
                            .id
                        }
                    };

                    let member = Member {
                        id: Uuid::new_v4(),
                        first_name: request.first_name,
                        last_name: request.last_name,
                        email: normalize_email(&request.email),
                        password: hash_password(&request.password)?,
                        user_id,
                        audit: Audit::new(),
                    };
                    let member = repository.table::<Member>().add(member).await?;
                    tracing::info!(member_id = %member.id, user_id = %user_id, "Member registered");
                    Ok(member)
                }
                .boxed()
            })
            .await
    }

    pub async fn update(&self, caller: &Caller, id: Uuid, request: UpdateMember) -> AppResult<Member> {
        request.validate()?;
        let operation = Operation::command("UpdateMember")
            .requires(&[members::UPDATE])
            .invalidates(&[groups::MEMBERS, groups::LOAN_TRANSACTIONS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut member = repository.require::<Member>(id).await?;
                    rules::user::check_member_email_unique(&repository, &request.email, Some(id))
                        .await?;

                    member.first_name = request.first_name;
                    member.last_name = request.last_name;
                    member.email = normalize_email(&request.email);
                    if let Some(password) = &request.password {
                        member.password = hash_password(password)?;
                    }
                    repository.table::<Member>().update(member).await
                }
                .boxed()
            })
            .await
    }

    /// Soft delete; the member's loans and reservations follow
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> AppResult<Member> {
        let operation = Operation::command("DeleteMember")
            .requires(&[members::DELETE])
            .invalidates(&[groups::MEMBERS, groups::LOAN_TRANSACTIONS, groups::RESERVATIONS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let member = repository.require::<Member>(id).await?;
                    repository.table::<Member>().delete(member, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> AppResult<Member> {
        let operation = Operation::query("GetByIdMember").requires(&[members::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.require::<Member>(id).await }.boxed()
            })
            .await
    }

    pub async fn list(&self, caller: &Caller, params: ListQuery) -> AppResult<Page<Member>> {
        let operation = Operation::query("GetListMembers")
            .requires(&[members::READ])
            .cached(cache_key("GetListMembers", &params), groups::MEMBERS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let query = Query::new()
                        .contains_opt("last_name", params.name.as_deref())
                        .paginate(PageRequest::from_params(params.page, params.per_page));
                    repository.table::<Member>().list(query).await
                }
                .boxed()
            })
            .await
    }
}
