//! Loan issuance.
//!
//! A loan request names the borrower and a book. The borrower is matched to an existing reader
//! by `(first_name, last_name, email)` or signed up on the spot, then a seven day loan is
//! recorded. Both writes share one transaction: either the loan exists afterwards or nothing
//! changed.

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::LibraryError;
use crate::model::NewReader;

/// Days between `issue_date` and `return_date`.
pub const LOAN_PERIOD_DAYS: u32 = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct LoanRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub book_id: String,
}

impl LoanRequest {
    pub fn book_key(&self) -> Result<i64, LibraryError> {
        self.book_id
            .parse::<i64>()
            .map_err(|_| LibraryError::InvalidInput(format!("book_id {:?} is not a book identifier", self.book_id)))
    }

    fn reader(&self) -> NewReader {
        NewReader {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone_number: self.phone_number.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoanConfirmation {
    pub loan_id: i64,
    pub reader_id: i64,
    pub reader_created: bool,
}

// The reader was resolved in the same transaction, so a broken reference is the book.
fn missing_book(err: libsql::Error, book_id: i64) -> LibraryError {
    match LibraryError::from_store(err) {
        LibraryError::ReferenceNotFound(_) => LibraryError::ReferenceNotFound(format!("book {book_id} does not exist")),
        other => other,
    }
}

impl Database {
    pub async fn issue_loan(&self, request: LoanRequest) -> Result<LoanConfirmation, LibraryError> {
        let book_id = request.book_key()?;

        let _guard = self.lock().await;
        self.begin().await?;
        let result = self.issue_loan_internal(&request, book_id).await;
        self.finish(result).await
    }

    async fn issue_loan_internal(&self, request: &LoanRequest, book_id: i64) -> Result<LoanConfirmation, LibraryError> {
        let (reader_id, reader_created) = self.resolve_reader(&request.reader()).await?;

        let insert_loan = format!(
            r#"
            INSERT INTO loan (book_id, reader_id, issue_date, return_date)
            VALUES (?, ?, date('now'), date('now', '+{LOAN_PERIOD_DAYS} days'))
            RETURNING loan_id
        "#
        );

        let mut rows = self
            .connection()
            .query(&insert_loan, libsql::params![book_id, reader_id])
            .await
            .map_err(|e| missing_book(e, book_id))?;
        let loan_id: i64 = match rows.next().await.map_err(|e| missing_book(e, book_id))? {
            Some(row) => row.get(0)?,
            None => return Err(LibraryError::ConflictDetected("loan was not inserted".to_owned())),
        };

        tracing::info!(loan_id, reader_id, book_id, reader_created, "loan issued");
        Ok(LoanConfirmation {
            loan_id,
            reader_id,
            reader_created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{count, memory_db};
    use chrono::{Days, NaiveDate, Utc};

    fn request(book_id: &str) -> LoanRequest {
        LoanRequest {
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            phone_number: "555-0100".to_owned(),
            email: "ada@example.com".to_owned(),
            book_id: book_id.to_owned(),
        }
    }

    async fn loan_dates(db: &Database, loan_id: i64) -> (NaiveDate, NaiveDate) {
        let mut rows = db
            .connection()
            .query(
                "SELECT issue_date, return_date FROM loan WHERE loan_id = ?",
                libsql::params![loan_id],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let issue: String = row.get(0).unwrap();
        let ret: String = row.get(1).unwrap();
        (
            NaiveDate::parse_from_str(&issue, "%Y-%m-%d").unwrap(),
            NaiveDate::parse_from_str(&ret, "%Y-%m-%d").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_first_loan_creates_reader() {
        let db = memory_db().await;

        let confirmation = db.issue_loan(request("12")).await.unwrap();

        assert!(confirmation.reader_created);
        let readers = db.list_readers().await.unwrap();
        assert_eq!(readers.len(), 1);
        assert_eq!(readers[0].reader_id, confirmation.reader_id);
        assert_eq!(readers[0].first_name, "Ada");
        assert_eq!(readers[0].phone_number, "555-0100");
        assert_eq!(readers[0].email, "ada@example.com");

        let loans = db.list_loans().await.unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].book_id, 12);
        assert_eq!(loans[0].reader_id, confirmation.reader_id);
    }

    #[tokio::test]
    async fn test_same_person_twice_reuses_reader() {
        let db = memory_db().await;

        let first = db.issue_loan(request("12")).await.unwrap();
        let second = db.issue_loan(request("12")).await.unwrap();

        assert!(!second.reader_created);
        assert_eq!(first.reader_id, second.reader_id);
        assert_ne!(first.loan_id, second.loan_id);
        assert_eq!(count(&db, "reader").await, 1);

        let loans = db.list_loans().await.unwrap();
        assert_eq!(loans.len(), 2);
        assert!(loans.iter().all(|l| l.book_id == 12 && l.reader_id == first.reader_id));
    }

    #[tokio::test]
    async fn test_different_books_share_reader() {
        let db = memory_db().await;

        let first = db.issue_loan(request("1")).await.unwrap();
        let second = db.issue_loan(request("2")).await.unwrap();

        assert_eq!(first.reader_id, second.reader_id);
        let books: Vec<i64> = db.list_loans().await.unwrap().iter().map(|l| l.book_id).collect();
        assert_eq!(books, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_existing_reader_phone_is_not_updated() {
        let db = memory_db().await;
        db.issue_loan(request("3")).await.unwrap();

        let mut other_phone = request("4");
        other_phone.phone_number = "555-9999".to_owned();
        let confirmation = db.issue_loan(other_phone).await.unwrap();

        assert!(!confirmation.reader_created);
        let readers = db.list_readers().await.unwrap();
        assert_eq!(readers.len(), 1);
        assert_eq!(readers[0].phone_number, "555-0100");
    }

    #[tokio::test]
    async fn test_identity_match_is_exact() {
        let db = memory_db().await;
        db.issue_loan(request("3")).await.unwrap();

        let mut other_email = request("3");
        other_email.email = "Ada@example.com".to_owned();
        let confirmation = db.issue_loan(other_email).await.unwrap();

        assert!(confirmation.reader_created);
        assert_eq!(count(&db, "reader").await, 2);
    }

    #[tokio::test]
    async fn test_empty_strings_are_accepted() {
        let db = memory_db().await;
        let confirmation = db
            .issue_loan(LoanRequest {
                first_name: String::new(),
                last_name: String::new(),
                phone_number: String::new(),
                email: String::new(),
                book_id: "5".to_owned(),
            })
            .await
            .unwrap();
        assert!(confirmation.reader_created);
    }

    #[tokio::test]
    async fn test_unknown_book_rolls_back_new_reader() {
        let db = memory_db().await;

        let err = db.issue_loan(request("999999")).await.unwrap_err();

        assert!(matches!(err, LibraryError::ReferenceNotFound(_)));
        assert_eq!(count(&db, "reader").await, 0);
        assert_eq!(count(&db, "loan").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_book_keeps_existing_reader_untouched() {
        let db = memory_db().await;
        db.issue_loan(request("1")).await.unwrap();

        let err = db.issue_loan(request("999999")).await.unwrap_err();

        assert!(matches!(err, LibraryError::ReferenceNotFound(_)));
        assert_eq!(count(&db, "reader").await, 1);
        assert_eq!(count(&db, "loan").await, 1);
    }

    #[tokio::test]
    async fn test_non_numeric_book_id_is_invalid_input() {
        let db = memory_db().await;

        let err = db.issue_loan(request("twelve")).await.unwrap_err();

        assert!(matches!(err, LibraryError::InvalidInput(_)));
        assert_eq!(count(&db, "reader").await, 0);
    }

    #[tokio::test]
    async fn test_database_usable_after_failed_loan() {
        let db = memory_db().await;
        db.issue_loan(request("999999")).await.unwrap_err();

        let confirmation = db.issue_loan(request("12")).await.unwrap();
        assert!(confirmation.reader_created);
        assert_eq!(count(&db, "loan").await, 1);
    }

    #[tokio::test]
    async fn test_return_date_is_seven_days_after_issue() {
        let db = memory_db().await;
        let before = Utc::now().date_naive();

        let confirmation = db.issue_loan(request("7")).await.unwrap();

        let after = Utc::now().date_naive();
        let (issue, ret) = loan_dates(&db, confirmation.loan_id).await;
        assert!(issue >= before && issue <= after);
        assert_eq!(ret, issue.checked_add_days(Days::new(LOAN_PERIOD_DAYS.into())).unwrap());

        let loan = &db.list_loans().await.unwrap()[0];
        assert_eq!(loan.status, crate::model::LoanStatus::Active);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_create_one_reader() {
        let db = std::sync::Arc::new(memory_db().await);

        let mut handles = Vec::new();
        for book in ["1", "2", "3", "4", "5", "6", "7", "8"] {
            let db = db.clone();
            handles.push(tokio::spawn(async move { db.issue_loan(request(book)).await }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().reader_created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(count(&db, "reader").await, 1);
        assert_eq!(count(&db, "loan").await, 8);
    }
}
