use crate::config::Config;
use crate::error::LibraryError;
use crate::model::*;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use tokio::sync::Mutex;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

/// Schema first, then seed data. Each runs once per database.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_schema.sql", include_str!("migrations/001_schema.sql")),
    ("002_seed_data.sql", include_str!("migrations/002_seed_data.sql")),
];

// Unit separator, never present in a name.
const NAME_SEPARATOR: char = '\u{1f}';

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = cfg.app.database_path(data_dir);
        tracing::info!(path = ?path, "[db] opening local database");
        Self::open(&path).await
    }

    /// Opens (or creates) the database at `path` and bootstraps it.
    /// `:memory:` gives a private database that lives as long as the returned value.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new_local(path.as_ref()).build().await?;
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").await?;

        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            tx_lock: Mutex::new(()),
        })
    }

    /// Starts a transaction. The caller must hold `tx_lock`.
    pub(crate) async fn begin(&self) -> Result<(), LibraryError> {
        self.conn
            .execute("BEGIN TRANSACTION", ())
            .await
            .map_err(LibraryError::StoreUnavailable)?;
        Ok(())
    }

    /// Commits on success, rolls back on any failure including a failed commit.
    pub(crate) async fn finish<T>(&self, result: Result<T, LibraryError>) -> Result<T, LibraryError> {
        match result {
            Ok(value) => match self.conn.execute("COMMIT", ()).await {
                Ok(_) => Ok(value),
                Err(e) => {
                    self.rollback().await;
                    Err(LibraryError::StoreUnavailable(e))
                }
            },
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }

    async fn rollback(&self) {
        if let Err(e) = self.conn.execute("ROLLBACK", ()).await {
            tracing::debug!(error = %e, "rollback did not run");
        }
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.tx_lock.lock().await
    }

    fn split_names(s: Option<String>) -> Vec<String> {
        let mut names: Vec<String> = s
            .unwrap_or_default()
            .split(NAME_SEPARATOR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        names.sort();
        names
    }

    fn parse_date(s: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| anyhow::anyhow!("invalid date {s:?}: {e}"))
    }

    fn row_to_book(row: &libsql::Row) -> Result<Book> {
        Ok(Book {
            book_id: row.get(0)?,
            title: row.get(1)?,
            publication_year: row.get::<Option<i32>>(2)?,
            genre: row.get::<Option<String>>(3)?,
        })
    }

    fn row_to_reader(row: &libsql::Row) -> Result<Reader> {
        Ok(Reader {
            reader_id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            phone_number: row.get(3)?,
            email: row.get(4)?,
        })
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let _guard = self.lock().await;
        let query = "SELECT book_id, title, publication_year, genre FROM book ORDER BY book_id";

        let mut rows = self.conn.query(query, ()).await?;
        let mut books = vec![];
        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }
        Ok(books)
    }

    pub async fn list_books_with_authors(&self) -> Result<Vec<BookWithAuthors>> {
        let _guard = self.lock().await;
        let query = r#"
SELECT
    b.book_id, b.title, b.publication_year, b.genre,
    GROUP_CONCAT(a.first_name || ' ' || a.last_name, char(31)) AS authors
FROM book AS b
LEFT JOIN bookauthor AS ba ON b.book_id = ba.book_id
LEFT JOIN author AS a ON ba.author_id = a.author_id
GROUP BY b.book_id
ORDER BY b.book_id
"#;

        let mut rows = self.conn.query(query, ()).await?;
        let mut books = vec![];
        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book_with_authors(&row)?);
        }
        Ok(books)
    }

    pub async fn get_book_with_authors(&self, book_id: i64) -> Result<Option<BookWithAuthors>> {
        let _guard = self.lock().await;
        let query = r#"
SELECT
    b.book_id, b.title, b.publication_year, b.genre,
    GROUP_CONCAT(a.first_name || ' ' || a.last_name, char(31)) AS authors
FROM book AS b
LEFT JOIN bookauthor AS ba ON b.book_id = ba.book_id
LEFT JOIN author AS a ON ba.author_id = a.author_id
WHERE b.book_id = ?
GROUP BY b.book_id
"#;

        let mut rows = self.conn.query(query, libsql::params![book_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_book_with_authors(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_book_with_authors(row: &libsql::Row) -> Result<BookWithAuthors> {
        Ok(BookWithAuthors {
            book_id: row.get(0)?,
            title: row.get(1)?,
            publication_year: row.get::<Option<i32>>(2)?,
            genre: row.get::<Option<String>>(3)?,
            authors: Self::split_names(row.get::<Option<String>>(4)?),
        })
    }

    pub async fn list_authors(&self) -> Result<Vec<Author>> {
        let _guard = self.lock().await;
        let query = "SELECT author_id, first_name, last_name FROM author ORDER BY last_name, first_name";

        let mut rows = self.conn.query(query, ()).await?;
        let mut authors = vec![];
        while let Some(row) = rows.next().await? {
            authors.push(Author {
                author_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            });
        }
        Ok(authors)
    }

    pub async fn get_author(&self, author_id: i64) -> Result<Option<AuthorWithBooks>> {
        let _guard = self.lock().await;

        let mut rows = self
            .conn
            .query(
                "SELECT author_id, first_name, last_name FROM author WHERE author_id = ?",
                libsql::params![author_id],
            )
            .await?;
        let author = match rows.next().await? {
            Some(row) => Author {
                author_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            },
            None => return Ok(None),
        };
        drop(rows);

        let query = r#"
SELECT b.book_id, b.title, b.publication_year, b.genre
FROM book AS b
JOIN bookauthor AS ba ON b.book_id = ba.book_id
WHERE ba.author_id = ?
ORDER BY b.book_id
"#;
        let mut rows = self.conn.query(query, libsql::params![author_id]).await?;
        let mut books = vec![];
        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }

        Ok(Some(AuthorWithBooks { author, books }))
    }

    pub async fn list_readers(&self) -> Result<Vec<Reader>> {
        let _guard = self.lock().await;
        let query = "SELECT reader_id, first_name, last_name, phone_number, email FROM reader ORDER BY reader_id";

        let mut rows = self.conn.query(query, ()).await?;
        let mut readers = vec![];
        while let Some(row) = rows.next().await? {
            readers.push(Self::row_to_reader(&row)?);
        }
        Ok(readers)
    }

    pub async fn list_loans(&self) -> Result<Vec<Loan>> {
        let _guard = self.lock().await;
        let query = "SELECT loan_id, book_id, reader_id, issue_date, return_date FROM loan ORDER BY loan_id";
        let today = Utc::now().date_naive();

        let mut rows = self.conn.query(query, ()).await?;
        let mut loans = vec![];
        while let Some(row) = rows.next().await? {
            let issue_date = Self::parse_date(&row.get::<String>(3)?)?;
            let return_date = row
                .get::<Option<String>>(4)?
                .map(|s| Self::parse_date(&s))
                .transpose()?;

            loans.push(Loan {
                loan_id: row.get(0)?,
                book_id: row.get(1)?,
                reader_id: row.get(2)?,
                issue_date,
                return_date,
                status: LoanStatus::on(return_date, today),
            });
        }
        Ok(loans)
    }

    /// Finds the reader with the same `(first_name, last_name, email)` or creates one.
    /// Returns the reader id and whether it was created. Runs inside the caller's transaction.
    pub(crate) async fn resolve_reader(&self, reader: &NewReader) -> Result<(i64, bool), LibraryError> {
        let insert_reader = r#"
            INSERT INTO reader (first_name, last_name, phone_number, email)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (first_name, last_name, email) DO NOTHING
            RETURNING reader_id
        "#;

        let mut rows = self
            .conn
            .query(
                insert_reader,
                libsql::params![
                    reader.first_name.as_str(),
                    reader.last_name.as_str(),
                    reader.phone_number.as_str(),
                    reader.email.as_str()
                ],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            return Ok((row.get(0)?, true));
        }
        drop(rows);

        let find_reader = "SELECT reader_id FROM reader WHERE first_name = ? AND last_name = ? AND email = ?";
        let mut rows = self
            .conn
            .query(
                find_reader,
                libsql::params![
                    reader.first_name.as_str(),
                    reader.last_name.as_str(),
                    reader.email.as_str()
                ],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok((row.get(0)?, false)),
            None => Err(LibraryError::ConflictDetected(
                "reader changed while being resolved".to_owned(),
            )),
        }
    }

    pub async fn register_reader(&self, reader: NewReader) -> Result<(Reader, bool), LibraryError> {
        let _guard = self.lock().await;
        self.begin().await?;
        let result = self.register_reader_internal(&reader).await;
        self.finish(result).await
    }

    async fn register_reader_internal(&self, reader: &NewReader) -> Result<(Reader, bool), LibraryError> {
        let (reader_id, created) = self.resolve_reader(reader).await?;

        let mut rows = self
            .conn
            .query(
                "SELECT reader_id, first_name, last_name, phone_number, email FROM reader WHERE reader_id = ?",
                libsql::params![reader_id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| LibraryError::ConflictDetected("reader changed while being resolved".to_owned()))?;

        Ok((
            Reader {
                reader_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                phone_number: row.get(3)?,
                email: row.get(4)?,
            },
            created,
        ))
    }

    /// Adds a book and links its authors, creating authors that do not exist yet.
    pub async fn add_book(&self, book: NewBook) -> Result<i64, LibraryError> {
        if book.title.trim().is_empty() {
            return Err(LibraryError::InvalidInput("title is required".to_owned()));
        }

        let _guard = self.lock().await;
        self.begin().await?;
        let result = self.add_book_internal(&book).await;
        self.finish(result).await
    }

    async fn add_book_internal(&self, book: &NewBook) -> Result<i64, LibraryError> {
        let upsert_author = r#"
            INSERT INTO author (first_name, last_name)
            VALUES (?, ?)
            ON CONFLICT (first_name, last_name) DO UPDATE SET first_name = excluded.first_name
            RETURNING author_id
        "#;

        let mut author_ids: Vec<i64> = Vec::with_capacity(book.authors.len());
        for author in &book.authors {
            let mut rows = self
                .conn
                .query(
                    upsert_author,
                    libsql::params![author.first_name.as_str(), author.last_name.as_str()],
                )
                .await?;
            let row = rows.next().await?.ok_or_else(|| {
                LibraryError::ConflictDetected(format!(
                    "author {} {} could not be resolved",
                    author.first_name, author.last_name
                ))
            })?;
            author_ids.push(row.get(0)?);
        }

        let insert_book = r#"
            INSERT INTO book (title, publication_year, genre)
            VALUES (?, ?, ?)
            RETURNING book_id
        "#;
        let mut rows = self
            .conn
            .query(
                insert_book,
                libsql::params![book.title.as_str(), book.publication_year, book.genre.clone()],
            )
            .await?;
        let book_id: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => return Err(LibraryError::ConflictDetected("book was not inserted".to_owned())),
        };
        drop(rows);

        for author_id in author_ids {
            self.conn
                .execute(
                    "INSERT INTO bookauthor (book_id, author_id) VALUES (?, ?)",
                    libsql::params![book_id, author_id],
                )
                .await?;
        }

        Ok(book_id)
    }
}
