//! Loan ledger: issuance, return, renewal, overdue sweep and fine payment.
//!
//! Each operation runs in exactly one [`LedgerTx`]. Loan writes and the matching
//! copy-count writes share that transaction, so neither is visible without the other.

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::LoansConfig,
    error::{AppError, AppResult, Rejection},
    models::loan::{
        add_days, can_borrow, BulkFailure, BulkReturnReport, CreateLoan, Loan, LoanStatus,
        NewLoan, SweepReport,
    },
    repository::ledger::{LedgerStore, LedgerTx},
};

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    policy: LoansConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, policy: LoansConfig) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> &LoansConfig {
        &self.policy
    }

    /// Issue a loan. Checks run in a fixed order and the first failure wins.
    pub async fn issue(&self, request: &CreateLoan) -> AppResult<Loan> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let user = tx
            .user_for_update(request.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", request.user_id)))?;
        let mut book = tx
            .book_for_update(request.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", request.book_id)))?;

        if !user.is_active {
            return Err(Rejection::AccountInactive.into());
        }

        let active = tx.count_user_loans(user.id, LoanStatus::Active).await?;
        if !can_borrow(active, self.policy.max_active_loans) {
            return Err(Rejection::LimitReached.into());
        }

        book.reserve_copy()?;

        if tx.has_open_loan(user.id, book.id).await? {
            return Err(Rejection::DuplicateLoan.into());
        }

        // A supplied due date is taken as-is, even one already past; the sweep catches it.
        let due_date = match request.due_date {
            Some(due) => due,
            None => add_days(now, self.policy.default_loan_days).ok_or_else(|| {
                AppError::Internal("Default loan period out of range".to_string())
            })?,
        };

        let loan = tx
            .insert_loan(&NewLoan {
                user_id: user.id,
                book_id: book.id,
                loan_date: now,
                due_date,
                notes: request.notes.clone(),
            })
            .await?;
        tx.update_book_copies(&book).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            user_id = user.id,
            book_id = book.id,
            due_date = %loan.due_date,
            "Loan issued"
        );
        Ok(loan)
    }

    /// Return a loan and put its copy back on the shelf
    pub async fn return_loan(&self, loan_id: i64) -> AppResult<Loan> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let loan = self.return_in(tx.as_mut(), loan_id, now).await?;
        tx.commit().await?;

        tracing::info!(loan_id = loan.id, fine = %loan.fine, "Loan returned");
        Ok(loan)
    }

    async fn return_in(
        &self,
        tx: &mut dyn LedgerTx,
        loan_id: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<Loan> {
        let mut loan = tx
            .loan_for_update(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        loan.mark_returned(now, self.policy.daily_fine_rate)?;

        let mut book = tx
            .book_for_update(loan.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", loan.book_id)))?;
        book.release_copy();

        tx.update_loan(&loan).await?;
        tx.update_book_copies(&book).await?;
        Ok(loan)
    }

    /// Extend the due date of an active, not yet late loan
    pub async fn renew(&self, loan_id: i64, additional_days: Option<i64>) -> AppResult<Loan> {
        let days = additional_days.unwrap_or(self.policy.default_renewal_days);
        if days < 1 {
            return Err(AppError::Validation(
                "Additional days must be at least 1".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut loan = tx
            .loan_for_update(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        loan.renew(now, days)?;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(loan_id = loan.id, due_date = %loan.due_date, "Loan renewed");
        Ok(loan)
    }

    /// Mark every active loan past its due date as overdue and charge its fine.
    /// Loans already marked overdue are left alone.
    pub async fn sweep_overdue(&self) -> AppResult<SweepReport> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut report = SweepReport::default();
        for mut loan in tx.active_past_due_for_update(now).await? {
            if loan.mark_overdue(now, self.policy.daily_fine_rate) {
                tx.update_loan(&loan).await?;
                report.loan_ids.push(loan.id);
            }
        }
        report.marked = report.loan_ids.len();
        tx.commit().await?;

        tracing::info!(marked = report.marked, "Overdue sweep finished");
        Ok(report)
    }

    /// Clear the fine of a loan. No payment record is kept.
    pub async fn pay_fine(&self, loan_id: i64) -> AppResult<Loan> {
        let mut tx = self.store.begin().await?;
        let mut loan = tx
            .loan_for_update(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        let paid = loan.fine;
        loan.pay_fine()?;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(loan_id = loan.id, amount = %paid, "Fine paid");
        Ok(loan)
    }

    /// Whether the user may take out one more loan right now
    pub async fn can_borrow(&self, user_id: i64) -> AppResult<bool> {
        let mut tx = self.store.begin().await?;
        if tx.user_for_update(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
        }
        let active = tx.count_user_loans(user_id, LoanStatus::Active).await?;
        Ok(can_borrow(active, self.policy.max_active_loans))
    }

    /// Return several loans, each in its own transaction
    pub async fn bulk_return(&self, loan_ids: &[i64]) -> AppResult<BulkReturnReport> {
        let mut report = BulkReturnReport::default();

        for &loan_id in loan_ids {
            match self.return_loan(loan_id).await {
                Ok(_) => report.success_count += 1,
                Err(AppError::Database(e)) => return Err(AppError::Database(e)),
                Err(e) => {
                    tracing::debug!(loan_id, error = %e, "Bulk return item failed");
                    report.failures.push(BulkFailure {
                        loan_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.failure_count = report.failures.len();

        tracing::info!(
            success = report.success_count,
            failed = report.failure_count,
            "Bulk return finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::models::{book::Book, user::Role, user::User};
    use crate::repository::memory::MemoryLedgerStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn clock_at(now: DateTime<Utc>) -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock.expect_now().return_const(now);
        Arc::new(clock)
    }

    fn user(id: i64, is_active: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.org", id),
            password: String::new(),
            first_name: "Test".into(),
            last_name: format!("User{}", id),
            role: Role::Member,
            is_active,
            created_at: t0(),
        }
    }

    fn book(id: i64, copies: i32) -> Book {
        Book {
            id,
            title: format!("Book {}", id),
            author: "Author".into(),
            isbn: format!("97800000000{:02}", id),
            publisher: None,
            published_year: None,
            category: None,
            description: None,
            total_copies: copies,
            available_copies: copies,
            created_at: t0(),
        }
    }

    fn request(user_id: i64, book_id: i64) -> CreateLoan {
        CreateLoan {
            user_id,
            book_id,
            due_date: None,
            notes: None,
        }
    }

    async fn store() -> MemoryLedgerStore {
        let store = MemoryLedgerStore::new();
        store.put_user(user(1, true)).await;
        store.put_user(user(2, false)).await;
        for id in 1..=7 {
            store.put_book(book(id, 2)).await;
        }
        store
    }

    fn ledger(store: &MemoryLedgerStore, now: DateTime<Utc>) -> Ledger {
        Ledger::new(Arc::new(store.clone()), clock_at(now), LoansConfig::default())
    }

    fn rejection(err: AppError) -> Rejection {
        match err {
            AppError::Rejected(r) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_issue_defaults_due_date_and_takes_a_copy() {
        let store = store().await;
        let loan = ledger(&store, t0()).issue(&request(1, 1)).await.unwrap();

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.loan_date, t0());
        assert_eq!(loan.due_date, t0() + Duration::days(14));
        assert_eq!(loan.fine, Decimal::ZERO);
        assert_eq!(store.book(1).await.unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_issue_checks_existence_before_rules() {
        let store = store().await;
        let ledger = ledger(&store, t0());

        assert!(matches!(ledger.issue(&request(99, 1)).await, Err(AppError::NotFound(_))));
        assert!(matches!(ledger.issue(&request(2, 99)).await, Err(AppError::NotFound(_))));
        assert_eq!(
            rejection(ledger.issue(&request(2, 1)).await.unwrap_err()),
            Rejection::AccountInactive
        );
    }

    #[tokio::test]
    async fn test_limit_reported_before_availability() {
        let store = store().await;
        let ledger = ledger(&store, t0());
        for book_id in 1..=5 {
            ledger.issue(&request(1, book_id)).await.unwrap();
        }

        let mut empty = book(6, 1);
        empty.available_copies = 0;
        store.put_book(empty).await;

        assert_eq!(
            rejection(ledger.issue(&request(1, 6)).await.unwrap_err()),
            Rejection::LimitReached
        );
        assert_eq!(store.loans().await.len(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_loan_rejected_without_side_effects() {
        let store = store().await;
        let ledger = ledger(&store, t0());
        ledger.issue(&request(1, 3)).await.unwrap();

        assert_eq!(
            rejection(ledger.issue(&request(1, 3)).await.unwrap_err()),
            Rejection::DuplicateLoan
        );
        assert_eq!(store.book(3).await.unwrap().available_copies, 1);
        assert_eq!(store.loans().await.len(), 1);
    }

    #[tokio::test]
    async fn test_past_due_date_is_kept_and_swept() {
        let store = store().await;
        let ledger = ledger(&store, t0());
        let mut req = request(1, 1);
        req.due_date = Some(t0() - Duration::days(2));

        let loan = ledger.issue(&req).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.due_date, t0() - Duration::days(2));
        assert_eq!(store.book(1).await.unwrap().available_copies, 1);

        let report = ledger.sweep_overdue().await.unwrap();
        assert_eq!(report.loan_ids, vec![loan.id]);
        let swept = store.loan(loan.id).await.unwrap();
        assert_eq!(swept.status, LoanStatus::Overdue);
        assert_eq!(swept.fine, Decimal::new(100, 2));
    }

    #[tokio::test]
    async fn test_return_twice_is_rejected() {
        let store = store().await;
        let loan = ledger(&store, t0()).issue(&request(1, 1)).await.unwrap();

        let later = ledger(&store, t0() + Duration::days(1));
        later.return_loan(loan.id).await.unwrap();
        assert_eq!(
            rejection(later.return_loan(loan.id).await.unwrap_err()),
            Rejection::AlreadyReturned
        );
        assert_eq!(store.book(1).await.unwrap().available_copies, 2);
    }

    #[tokio::test]
    async fn test_renew_uses_default_days() {
        let store = store().await;
        let loan = ledger(&store, t0()).issue(&request(1, 1)).await.unwrap();

        let renewed = ledger(&store, t0() + Duration::days(2))
            .renew(loan.id, None)
            .await
            .unwrap();
        assert_eq!(renewed.due_date, loan.due_date + Duration::days(14));

        assert!(matches!(
            ledger(&store, t0()).renew(loan.id, Some(0)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_renew_by_huge_extension_is_validation() {
        let store = store().await;
        let ledger = ledger(&store, t0());
        let loan = ledger.issue(&request(1, 1)).await.unwrap();

        for days in [i64::MAX / 1000, 1_000_000_000] {
            assert!(matches!(
                ledger.renew(loan.id, Some(days)).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(store.loan(loan.id).await.unwrap().due_date, loan.due_date);
    }

    #[tokio::test]
    async fn test_can_borrow_counts_active_only() {
        let store = store().await;
        let ledger = ledger(&store, t0());
        for book_id in 1..=5 {
            ledger.issue(&request(1, book_id)).await.unwrap();
        }
        assert!(!ledger.can_borrow(1).await.unwrap());

        ledger.return_loan(1).await.unwrap();
        assert!(ledger.can_borrow(1).await.unwrap());
        assert!(matches!(ledger.can_borrow(42).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_return_reports_failures() {
        let store = store().await;
        let ledger = ledger(&store, t0());
        let a = ledger.issue(&request(1, 1)).await.unwrap();
        let b = ledger.issue(&request(1, 2)).await.unwrap();
        ledger.return_loan(b.id).await.unwrap();

        let report = ledger.bulk_return(&[a.id, b.id, 404]).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 2);
        assert_eq!(report.failures[0].loan_id, b.id);
        assert_eq!(report.failures[1].loan_id, 404);
        assert_eq!(store.book(1).await.unwrap().available_copies, 2);
    }
}
