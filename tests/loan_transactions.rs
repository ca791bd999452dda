//! Loan lifecycle against the in-memory store

mod common;

use chrono::{Duration, Timelike, Utc};
use uuid::Uuid;

use common::{utc, TestApp};
use library_server::{
    error::AppError,
    models::{
        book::UpdateBook,
        loan_transaction::{CreateLoanTransaction, LoanTransactionQuery, UpdateLoanTransaction},
        LoanTransaction, LoanTransactionInclude, ReturnStatus,
    },
    repository::Query,
    rules::loan_transaction::{BOOK_ALREADY_BORROWED, LOAN_ALREADY_RETURNED},
};

fn loan_request(member_id: Uuid, book_id: Uuid) -> CreateLoanTransaction {
    CreateLoanTransaction {
        member_id,
        book_id,
        return_status: ReturnStatus::Unreturned,
        return_time: utc(2030, 3, 14, 9, 0),
    }
}

async fn stored_loans(app: &TestApp) -> Vec<LoanTransaction> {
    app.repository
        .table::<LoanTransaction>()
        .list(Query::new().with_deleted())
        .await
        .unwrap()
        .items
}

#[tokio::test]
async fn test_loan_falls_due_at_five_pm_and_notifies_member() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;

    let loan = app
        .services
        .loan_transactions
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();

    assert_eq!(loan.return_status, ReturnStatus::Unreturned);
    assert_eq!(loan.return_time, utc(2030, 3, 14, 17, 0));
    assert_eq!(loan.member_id, member.id);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Book Loan");
    assert_eq!(sent[0].text_body, "You have borrowed the book Dune");
    assert_eq!(sent[0].to[0].address, "ada@example.com");
    assert_eq!(sent[0].to[0].name, "Ada Reader");
}

#[tokio::test]
async fn test_open_loan_blocks_second_loan() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let ada = app.member("Ada", "ada@example.com").await;
    let grace = app.member("Grace", "grace@example.com").await;

    app.services
        .loan_transactions
        .create(&app.admin, loan_request(ada.id, book.id))
        .await
        .unwrap();
    let second = app
        .services
        .loan_transactions
        .create(&app.admin, loan_request(grace.id, book.id))
        .await;

    assert!(matches!(second, Err(AppError::BusinessRule(message)) if message == BOOK_ALREADY_BORROWED));
    assert_eq!(stored_loans(&app).await.len(), 1);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_concurrent_loans_of_one_book_admit_one() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let ada = app.member("Ada", "ada@example.com").await;
    let grace = app.member("Grace", "grace@example.com").await;
    app.mailer.delay(std::time::Duration::from_millis(100));

    let loans = &app.services.loan_transactions;
    let (first, second) = tokio::join!(
        loans.create(&app.admin, loan_request(ada.id, book.id)),
        loans.create(&app.admin, loan_request(grace.id, book.id)),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let refused = if first.is_ok() { second } else { first };
    assert!(matches!(refused, Err(AppError::BusinessRule(message)) if message == BOOK_ALREADY_BORROWED));
    assert_eq!(stored_loans(&app).await.len(), 1);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_missing_references_leave_nothing_behind() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;

    let no_member = app
        .services
        .loan_transactions
        .create(&app.admin, loan_request(Uuid::new_v4(), book.id))
        .await;
    assert!(matches!(no_member, Err(AppError::NotFound(message)) if message == "Member not found"));

    let no_book = app
        .services
        .loan_transactions
        .create(&app.admin, loan_request(member.id, Uuid::new_v4()))
        .await;
    assert!(matches!(no_book, Err(AppError::NotFound(message)) if message == "Book not found"));

    assert!(stored_loans(&app).await.is_empty());
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_mail_failure_rolls_back_loan() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;

    app.mailer.fail(true);
    let result = app
        .services
        .loan_transactions
        .create(&app.admin, loan_request(member.id, book.id))
        .await;
    assert!(matches!(result, Err(AppError::Mail(_))));
    assert!(stored_loans(&app).await.is_empty());

    app.mailer.fail(false);
    app.services
        .loan_transactions
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();
    assert_eq!(stored_loans(&app).await.len(), 1);
}

#[tokio::test]
async fn test_returned_book_can_be_borrowed_again() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;
    let loans = &app.services.loan_transactions;

    let first = loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();
    let returned = loans.return_book(&app.admin, first.id).await.unwrap();
    assert_eq!(returned.return_status, ReturnStatus::Returned);
    assert!(returned.audit.updated_date.is_some());

    let again = loans.return_book(&app.admin, first.id).await;
    assert!(matches!(again, Err(AppError::BusinessRule(message)) if message == LOAN_ALREADY_RETURNED));

    loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();
    assert_eq!(stored_loans(&app).await.len(), 2);
}

#[tokio::test]
async fn test_reopening_a_loan_respects_open_loans() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;
    let loans = &app.services.loan_transactions;

    let first = loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();
    loans.return_book(&app.admin, first.id).await.unwrap();
    loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();

    let reopen = UpdateLoanTransaction {
        member_id: member.id,
        book_id: book.id,
        return_status: ReturnStatus::Unreturned,
        return_time: utc(2030, 4, 1, 8, 30),
    };
    let result = loans.update(&app.admin, first.id, reopen.clone()).await;
    assert!(matches!(result, Err(AppError::BusinessRule(message)) if message == BOOK_ALREADY_BORROWED));

    // Updating the open loan itself is allowed and keeps the 17:00 due time
    let open = loans
        .list(
            &app.admin,
            LoanTransactionQuery {
                return_status: Some(ReturnStatus::Unreturned),
                ..Default::default()
            },
            vec![],
        )
        .await
        .unwrap();
    let open_id = open.items[0].loan_transaction.id;
    let updated = loans.update(&app.admin, open_id, reopen).await.unwrap();
    assert_eq!(updated.return_time.hour(), 17);
    assert_eq!(updated.return_time.date_naive(), utc(2030, 4, 1, 0, 0).date_naive());
}

#[tokio::test]
async fn test_deleted_loan_releases_book() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;
    let loans = &app.services.loan_transactions;

    let loan = loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();
    loans.delete(&app.admin, loan.id).await.unwrap();

    let missing = loans.get(&app.admin, loan.id, vec![]).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_get_with_includes_and_overdue_listing() {
    let app = TestApp::new().await;
    let dune = app.book("Dune", "9780441013593").await;
    let emma = app.book("Emma", "9780141439587").await;
    let member = app.member("Ada", "ada@example.com").await;
    let loans = &app.services.loan_transactions;

    let late = loans
        .create(
            &app.admin,
            CreateLoanTransaction {
                return_time: Utc::now() - Duration::days(3),
                ..loan_request(member.id, dune.id)
            },
        )
        .await
        .unwrap();
    loans
        .create(&app.admin, loan_request(member.id, emma.id))
        .await
        .unwrap();

    let details = loans
        .get(
            &app.admin,
            late.id,
            vec![LoanTransactionInclude::Member, LoanTransactionInclude::Book],
        )
        .await
        .unwrap();
    assert_eq!(details.book.as_ref().map(|book| book.name.as_str()), Some("Dune"));
    assert_eq!(details.member.as_ref().map(|member| member.id), Some(member.id));

    let overdue = loans
        .list(
            &app.admin,
            LoanTransactionQuery {
                overdue: Some(true),
                ..Default::default()
            },
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(overdue.total, 1);
    assert_eq!(overdue.items[0].loan_transaction.id, late.id);
    assert!(overdue.items[0].book.is_none());
}

#[tokio::test]
async fn test_renamed_book_shows_in_cached_loan_pages() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let member = app.member("Ada", "ada@example.com").await;
    let loans = &app.services.loan_transactions;
    loans
        .create(&app.admin, loan_request(member.id, book.id))
        .await
        .unwrap();

    let book_names = || async {
        loans
            .list(&app.admin, LoanTransactionQuery::default(), vec![LoanTransactionInclude::Book])
            .await
            .unwrap()
            .items
            .into_iter()
            .filter_map(|details| details.book.map(|book| book.name))
            .collect::<Vec<_>>()
    };
    assert_eq!(book_names().await, ["Dune"]);

    app.services
        .books
        .update(
            &app.admin,
            book.id,
            UpdateBook {
                name: "Dune Messiah".to_string(),
                isbn: book.isbn.clone(),
                page: book.page,
                language: book.language.clone(),
                units_in_stock: book.units_in_stock,
                description: None,
                category_id: None,
                publisher_id: None,
                author_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(book_names().await, ["Dune Messiah"]);
}
