//! Transactional store used by the loan ledger.
//!
//! Every ledger operation opens one [`LedgerTx`], reads and locks the rows it needs,
//! writes, then commits. Dropping a transaction without committing discards all of
//! its writes, so a loan mutation and its copy-count mutation land together or not
//! at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::AppResult,
    models::{
        book::Book,
        loan::{Loan, LoanStatus, NewLoan},
        user::User,
    },
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>>;
}

/// One unit of work. Lookups ending in `_for_update` hold the row until commit.
#[async_trait]
pub trait LedgerTx: Send {
    /// Serializes concurrent issuances for the same borrower
    async fn user_for_update(&mut self, id: i64) -> AppResult<Option<User>>;

    /// Serializes concurrent check-then-decrement on the same title
    async fn book_for_update(&mut self, id: i64) -> AppResult<Option<Book>>;

    async fn loan_for_update(&mut self, id: i64) -> AppResult<Option<Loan>>;

    async fn count_user_loans(&mut self, user_id: i64, status: LoanStatus) -> AppResult<i64>;

    /// Active or Overdue loan of `book_id` held by `user_id`
    async fn has_open_loan(&mut self, user_id: i64, book_id: i64) -> AppResult<bool>;

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    /// Persists status, dates, fine and notes
    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()>;

    async fn update_book_copies(&mut self, book: &Book) -> AppResult<()>;

    /// Active loans with `due_date < now`, locked
    async fn active_past_due_for_update(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

const USER_COLUMNS: &str =
    "id, username, email, password, first_name, last_name, role, is_active, created_at";
const BOOK_COLUMNS: &str = "id, title, author, isbn, publisher, published_year, category, \
     description, total_copies, available_copies, created_at";
const LOAN_COLUMNS: &str =
    "id, user_id, book_id, loan_date, due_date, return_date, status, fine, notes";

/// Postgres-backed ledger store; row locks via `SELECT ... FOR UPDATE`
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Pool<Postgres>,
}

impl PgLedgerStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn user_for_update(&mut self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn book_for_update(&mut self, id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn loan_for_update(&mut self, id: i64) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn count_user_loans(&mut self, user_id: i64, status: LoanStatus) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1 AND status = $2")
                .bind(user_id)
                .bind(status)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count)
    }

    async fn has_open_loan(&mut self, user_id: i64, book_id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans
                WHERE user_id = $1 AND book_id = $2 AND status IN ('ACTIVE', 'OVERDUE')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let created = sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (user_id, book_id, loan_date, due_date, status, fine, notes)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(LoanStatus::Active)
        .bind(&loan.notes)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE loans
            SET due_date = $1, return_date = $2, status = $3, fine = $4, notes = $5
            WHERE id = $6
            "#,
        )
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.status)
        .bind(loan.fine)
        .bind(&loan.notes)
        .bind(loan.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_book_copies(&mut self, book: &Book) -> AppResult<()> {
        sqlx::query("UPDATE books SET total_copies = $1, available_copies = $2 WHERE id = $3")
            .bind(book.total_copies)
            .bind(book.available_copies)
            .bind(book.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn active_past_due_for_update(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE status = 'ACTIVE' AND due_date < $1 ORDER BY id FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(loans)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
