//! Loans repository: read-side queries joining loans with their user and book.
//! Every state change goes through the ledger store instead.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{LoanDetails, LoanDetailsRow, LoanStats, LoanStatus},
};

const DETAILS_SELECT: &str = r#"
    SELECT l.id, l.user_id, l.book_id, l.loan_date, l.due_date, l.return_date,
           l.status, l.fine, l.notes,
           u.username, u.first_name, u.last_name,
           b.title AS book_title, b.author AS book_author, b.isbn AS book_isbn
    FROM loans l
    JOIN users u ON u.id = l.user_id
    JOIN books b ON b.id = l.book_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        filter: &str,
        binds: Vec<LoanBind>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        let query = format!("{} {}", DETAILS_SELECT, filter);
        let mut builder = sqlx::query_as::<_, LoanDetailsRow>(&query);
        for bind in binds {
            builder = match bind {
                LoanBind::Id(v) => builder.bind(v),
                LoanBind::Time(v) => builder.bind(v),
                LoanBind::Status(v) => builder.bind(v),
            };
        }
        let rows = builder.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| LoanDetails::from_row(row, now))
            .collect())
    }

    /// Get loan by ID
    pub async fn get_details(&self, id: i64, now: DateTime<Utc>) -> AppResult<LoanDetails> {
        self.fetch("WHERE l.id = $1", vec![LoanBind::Id(id)], now)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// All loans, optionally restricted to one status, newest first
    pub async fn list(
        &self,
        status: Option<LoanStatus>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        match status {
            Some(status) => {
                self.fetch(
                    "WHERE l.status = $1 ORDER BY l.loan_date DESC, l.id DESC",
                    vec![LoanBind::Status(status)],
                    now,
                )
                .await
            }
            None => {
                self.fetch("ORDER BY l.loan_date DESC, l.id DESC", Vec::new(), now)
                    .await
            }
        }
    }

    /// Loans in status Active
    pub async fn active(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        self.list(Some(LoanStatus::Active), now).await
    }

    /// Active loans past their due date that the sweep has not marked yet
    pub async fn overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        self.fetch(
            "WHERE l.status = $1 AND l.due_date < $2 ORDER BY l.due_date, l.id",
            vec![LoanBind::Status(LoanStatus::Active), LoanBind::Time(now)],
            now,
        )
        .await
    }

    /// Active loans due between `now` and `until`
    pub async fn due_soon(
        &self,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        self.fetch(
            "WHERE l.status = $1 AND l.due_date >= $2 AND l.due_date <= $3 ORDER BY l.due_date, l.id",
            vec![
                LoanBind::Status(LoanStatus::Active),
                LoanBind::Time(now),
                LoanBind::Time(until),
            ],
            now,
        )
        .await
    }

    /// Open (Active or Overdue) loans of one user
    pub async fn user_loans(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        self.fetch(
            "WHERE l.user_id = $1 AND l.status != $2 ORDER BY l.due_date, l.id",
            vec![LoanBind::Id(user_id), LoanBind::Status(LoanStatus::Returned)],
            now,
        )
        .await
    }

    /// Full loan history of one user, newest first
    pub async fn user_history(
        &self,
        user_id: i64,
        page: i64,
        per_page: i64,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<LoanDetails>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let offset = (page - 1) * per_page;
        let items = self
            .fetch(
                &format!(
                    "WHERE l.user_id = $1 ORDER BY l.loan_date DESC, l.id DESC LIMIT {} OFFSET {}",
                    per_page, offset
                ),
                vec![LoanBind::Id(user_id)],
                now,
            )
            .await?;

        Ok((items, total))
    }

    pub async fn stats(&self) -> AppResult<LoanStats> {
        let (total, active, overdue, total_outstanding_fines): (i64, i64, i64, Decimal) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'ACTIVE'),
                    COUNT(*) FILTER (WHERE status = 'OVERDUE'),
                    COALESCE(SUM(fine), 0)
                FROM loans
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(LoanStats {
            total,
            active,
            overdue,
            total_outstanding_fines,
        })
    }
}

enum LoanBind {
    Id(i64),
    Time(DateTime<Utc>),
    Status(LoanStatus),
}
