//! Loan transaction lifecycle: borrow, return, edit and queries

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use super::{
    authorization::{capabilities::loan_transactions, Caller},
    email::{Mail, Mailer, Recipient},
    groups,
    pipeline::{cache_key, Operation, Pipeline},
};
use crate::{
    error::{AppError, AppResult},
    models::{
        loan_transaction::{
            normalize_return_time, CreateLoanTransaction, CreatedLoanTransactionResponse,
            LoanTransactionQuery, UpdateLoanTransaction,
        },
        Audit, Book, LoanTransaction, LoanTransactionDetails, LoanTransactionInclude, Member,
        ReturnStatus,
    },
    repository::{Condition, Page, PageRequest, Query, Repository, OPEN_LOAN_INDEX},
    rules::{self, loan_transaction::BOOK_ALREADY_BORROWED},
};

const INVALIDATES: &[&str] = &[groups::LOAN_TRANSACTIONS];

/// Notice sent to a member when a loan is recorded
pub fn loan_mail(member: &Member, book: &Book) -> Mail {
    Mail {
        subject: "Book Loan".to_string(),
        text_body: format!("You have borrowed the book {}", book.name),
        html_body: format!("You have borrowed a book <br> Borrowed book: {}", book.name),
        to: vec![Recipient {
            name: member.full_name(),
            address: member.email.clone(),
        }],
    }
}

/// The open-loan index reports a concurrent borrow the pre-check missed
fn borrowed_conflict(error: AppError) -> AppError {
    match error {
        AppError::Conflict(index) if index == OPEN_LOAN_INDEX => {
            AppError::BusinessRule(BOOK_ALREADY_BORROWED.to_string())
        }
        other => other,
    }
}

#[derive(Serialize)]
struct ListKey<'a> {
    query: &'a LoanTransactionQuery,
    include: &'a [LoanTransactionInclude],
}

#[derive(Clone)]
pub struct LoanTransactionsService {
    pipeline: Pipeline,
    mailer: Arc<dyn Mailer>,
}

impl LoanTransactionsService {
    pub fn new(pipeline: Pipeline, mailer: Arc<dyn Mailer>) -> Self {
        Self { pipeline, mailer }
    }

    /// Lend a book to a member and notify them by mail.
    ///
    /// The due date is moved to 17:00 on the requested day. A mail failure
    /// rolls the loan back.
    pub async fn create(
        &self,
        caller: &Caller,
        request: CreateLoanTransaction,
    ) -> AppResult<CreatedLoanTransactionResponse> {
        request.validate()?;
        let mailer = self.mailer.clone();
        let operation = Operation::command("CreateLoanTransaction")
            .requires(&[loan_transactions::CREATE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    rules::loan_transaction::check_if_book_previously_borrowed(
                        &repository,
                        request.book_id,
                        None,
                    )
                    .await?;
                    let member = repository.require::<Member>(request.member_id).await?;
                    let book = repository.require::<Book>(request.book_id).await?;

                    let loan = LoanTransaction {
                        id: Uuid::new_v4(),
                        member_id: member.id,
                        book_id: book.id,
                        return_status: request.return_status,
                        return_time: normalize_return_time(request.return_time),
                        audit: Audit::new(),
                    };
                    let loan = repository
                        .table::<LoanTransaction>()
                        .add(loan)
                        .await
                        .map_err(borrowed_conflict)?;

                    mailer.send(loan_mail(&member, &book)).await?;
                    tracing::info!(
                        loan_id = %loan.id,
                        book_id = %book.id,
                        member_id = %member.id,
                        return_time = %loan.return_time,
                        "Book loaned"
                    );

                    Ok(CreatedLoanTransactionResponse::from(loan))
                }
                .boxed()
            })
            .await
    }

    /// Mark an open loan as returned
    pub async fn return_book(&self, caller: &Caller, id: Uuid) -> AppResult<LoanTransaction> {
        let operation = Operation::command("ReturnLoanTransaction")
            .requires(&[loan_transactions::UPDATE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut loan = repository.require::<LoanTransaction>(id).await?;
                    rules::loan_transaction::check_not_returned(&loan)?;

                    loan.return_status = ReturnStatus::Returned;
                    let loan = repository.table::<LoanTransaction>().update(loan).await?;
                    tracing::info!(loan_id = %loan.id, book_id = %loan.book_id, "Book returned");
                    Ok(loan)
                }
                .boxed()
            })
            .await
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        request: UpdateLoanTransaction,
    ) -> AppResult<LoanTransaction> {
        request.validate()?;
        let operation = Operation::command("UpdateLoanTransaction")
            .requires(&[loan_transactions::UPDATE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut loan = repository.require::<LoanTransaction>(id).await?;
                    repository.require::<Member>(request.member_id).await?;
                    repository.require::<Book>(request.book_id).await?;
                    if request.return_status == ReturnStatus::Unreturned {
                        rules::loan_transaction::check_if_book_previously_borrowed(
                            &repository,
                            request.book_id,
                            Some(id),
                        )
                        .await?;
                    }

                    loan.member_id = request.member_id;
                    loan.book_id = request.book_id;
                    loan.return_status = request.return_status;
                    loan.return_time = normalize_return_time(request.return_time);
                    repository
                        .table::<LoanTransaction>()
                        .update(loan)
                        .await
                        .map_err(borrowed_conflict)
                }
                .boxed()
            })
            .await
    }

    /// Soft delete
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> AppResult<LoanTransaction> {
        let operation = Operation::command("DeleteLoanTransaction")
            .requires(&[loan_transactions::DELETE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let loan = repository.require::<LoanTransaction>(id).await?;
                    repository.table::<LoanTransaction>().delete(loan, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get(
        &self,
        caller: &Caller,
        id: Uuid,
        include: Vec<LoanTransactionInclude>,
    ) -> AppResult<LoanTransactionDetails> {
        let operation =
            Operation::query("GetByIdLoanTransaction").requires(&[loan_transactions::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let loan = repository.require::<LoanTransaction>(id).await?;
                    repository
                        .loan_transaction_details(vec![loan], &include)
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| AppError::NotFound("Loan transaction not found".to_string()))
                }
                .boxed()
            })
            .await
    }

    pub async fn list(
        &self,
        caller: &Caller,
        params: LoanTransactionQuery,
        include: Vec<LoanTransactionInclude>,
    ) -> AppResult<Page<LoanTransactionDetails>> {
        let key = cache_key(
            "GetListLoanTransactions",
            &ListKey {
                query: &params,
                include: &include,
            },
        );
        let mut operation = Operation::query("GetListLoanTransactions")
            .requires(&[loan_transactions::READ]);
        // Overdue depends on the clock
        if params.overdue != Some(true) {
            operation = operation.cached(key, groups::LOAN_TRANSACTIONS);
        }

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { list_loans(&repository, params, &include).await }.boxed()
            })
            .await
    }
}

async fn list_loans(
    repository: &Repository,
    params: LoanTransactionQuery,
    include: &[LoanTransactionInclude],
) -> AppResult<Page<LoanTransactionDetails>> {
    let mut query = Query::new()
        .eq_opt("member_id", params.member_id)
        .eq_opt("book_id", params.book_id)
        .eq_opt("return_status", params.return_status)
        .paginate(PageRequest::from_params(params.page, params.per_page));
    if params.overdue == Some(true) {
        query = query
            .eq("return_status", ReturnStatus::Unreturned)
            .filter(Condition::Lt("return_time", Utc::now().into()));
    }

    let page = repository.table::<LoanTransaction>().list(query).await?;
    let items = repository.loan_transaction_details(page.items, include).await?;
    Ok(Page {
        items,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_mail_names_the_book() {
        let member = Member {
            id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password: String::new(),
            user_id: Uuid::new_v4(),
            audit: Audit::new(),
        };
        let book = Book {
            id: Uuid::new_v4(),
            name: "Dune".into(),
            isbn: "9780441013593".into(),
            page: 412,
            language: "en".into(),
            units_in_stock: 1,
            description: None,
            category_id: None,
            publisher_id: None,
            author_id: None,
            audit: Audit::new(),
        };

        let mail = loan_mail(&member, &book);
        assert_eq!(mail.subject, "Book Loan");
        assert!(mail.text_body.contains("Dune"));
        assert!(mail.html_body.contains("Borrowed book: Dune"));
        assert_eq!(
            mail.to,
            vec![Recipient {
                name: "Ada Lovelace".into(),
                address: "ada@example.com".into(),
            }]
        );
    }

    #[test]
    fn test_open_loan_index_conflict_is_a_business_rule() {
        let error = borrowed_conflict(AppError::Conflict(OPEN_LOAN_INDEX.to_string()));
        assert!(matches!(error, AppError::BusinessRule(message) if message == BOOK_ALREADY_BORROWED));

        let other = borrowed_conflict(AppError::Conflict("members_user_id_key".to_string()));
        assert!(matches!(other, AppError::Conflict(_)));
    }
}
