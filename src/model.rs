use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: i64,
    pub title: String,
    pub publication_year: Option<i32>,
    pub genre: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookWithAuthors {
    pub book_id: i64,
    pub title: String,
    pub publication_year: Option<i32>,
    pub genre: Option<String>,
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub author_id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorWithBooks {
    #[serde(flatten)]
    pub author: Author,
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reader {
    pub reader_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
}

impl LoanStatus {
    /// A loan stays active through its return date.
    pub fn on(return_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        match return_date {
            Some(date) if date < today => LoanStatus::Overdue,
            _ => LoanStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: i64,
    pub book_id: i64,
    pub reader_id: i64,
    pub issue_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAuthor {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub publication_year: Option<i32>,
    pub genre: Option<String>,
    #[serde(default)]
    pub authors: Vec<NewAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReader {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn loan_is_active_until_return_date_passes() {
        let today = date("2026-10-18");
        assert_eq!(LoanStatus::on(Some(date("2026-10-25")), today), LoanStatus::Active);
        assert_eq!(LoanStatus::on(Some(today), today), LoanStatus::Active);
        assert_eq!(LoanStatus::on(Some(date("2026-10-17")), today), LoanStatus::Overdue);
        assert_eq!(LoanStatus::on(None, today), LoanStatus::Active);
    }

    #[test]
    fn author_with_books_flattens_author() {
        let value = serde_json::to_value(AuthorWithBooks {
            author: Author {
                author_id: 1,
                first_name: "Jane".to_owned(),
                last_name: "Austen".to_owned(),
            },
            books: vec![],
        })
        .unwrap();
        assert_eq!(value["author_id"], 1);
        assert_eq!(value["last_name"], "Austen");
        assert!(value["books"].as_array().unwrap().is_empty());
    }
}
