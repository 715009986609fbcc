//! Loan management service

use crate::{
    error::{AppError, AppResult},
    models::loan::{
        add_days, BulkReturnReport, CreateLoan, LoanDetails, LoanPage, LoanStats, LoanStatus,
        SweepReport,
    },
    repository::Repository,
    services::ledger::Ledger,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    ledger: Ledger,
}

impl LoansService {
    pub fn new(repository: Repository, ledger: Ledger) -> Self {
        Self { repository, ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    async fn details(&self, loan_id: i64) -> AppResult<LoanDetails> {
        let now = self.ledger.clock().now();
        self.repository.loans.get_details(loan_id, now).await
    }

    /// Create a new loan (borrow a book)
    pub async fn create_loan(&self, request: &CreateLoan) -> AppResult<LoanDetails> {
        let loan = self.ledger.issue(request).await?;
        self.details(loan.id).await
    }

    /// Return a borrowed book
    pub async fn return_loan(&self, loan_id: i64) -> AppResult<LoanDetails> {
        let loan = self.ledger.return_loan(loan_id).await?;
        self.details(loan.id).await
    }

    /// Renew a loan
    pub async fn renew_loan(
        &self,
        loan_id: i64,
        additional_days: Option<i64>,
    ) -> AppResult<LoanDetails> {
        let loan = self.ledger.renew(loan_id, additional_days).await?;
        self.details(loan.id).await
    }

    pub async fn pay_fine(&self, loan_id: i64) -> AppResult<LoanDetails> {
        let loan = self.ledger.pay_fine(loan_id).await?;
        self.details(loan.id).await
    }

    pub async fn sweep_overdue(&self) -> AppResult<SweepReport> {
        self.ledger.sweep_overdue().await
    }

    pub async fn bulk_return(&self, loan_ids: &[i64]) -> AppResult<BulkReturnReport> {
        self.ledger.bulk_return(loan_ids).await
    }

    /// Get loan by ID
    pub async fn get_loan(&self, loan_id: i64) -> AppResult<LoanDetails> {
        self.details(loan_id).await
    }

    pub async fn list_loans(&self, status: Option<LoanStatus>) -> AppResult<Vec<LoanDetails>> {
        let now = self.ledger.clock().now();
        self.repository.loans.list(status, now).await
    }

    pub async fn active_loans(&self) -> AppResult<Vec<LoanDetails>> {
        let now = self.ledger.clock().now();
        self.repository.loans.active(now).await
    }

    pub async fn overdue_loans(&self) -> AppResult<Vec<LoanDetails>> {
        let now = self.ledger.clock().now();
        self.repository.loans.overdue(now).await
    }

    /// Active loans due within `days` days (default 3)
    pub async fn due_soon(&self, days: Option<i64>) -> AppResult<Vec<LoanDetails>> {
        let now = self.ledger.clock().now();
        let days = days.unwrap_or(3).max(0);
        let until = add_days(now, days)
            .ok_or_else(|| AppError::Validation(format!("Window of {} days is too large", days)))?;
        self.repository.loans.due_soon(until, now).await
    }

    /// Get open loans for a user
    pub async fn get_user_loans(&self, user_id: i64) -> AppResult<Vec<LoanDetails>> {
        // Verify user exists
        self.repository.users.get_by_id(user_id).await?;
        let now = self.ledger.clock().now();
        self.repository.loans.user_loans(user_id, now).await
    }

    pub async fn get_user_history(
        &self,
        user_id: i64,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> AppResult<LoanPage> {
        self.repository.users.get_by_id(user_id).await?;

        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(20).clamp(1, 100);
        let now = self.ledger.clock().now();
        let (items, total) = self
            .repository
            .loans
            .user_history(user_id, page, per_page, now)
            .await?;

        Ok(LoanPage {
            items,
            total,
            page,
            per_page,
        })
    }

    pub async fn stats(&self) -> AppResult<LoanStats> {
        self.repository.loans.stats().await
    }

    pub async fn can_borrow(&self, user_id: i64) -> AppResult<bool> {
        self.ledger.can_borrow(user_id).await
    }
}
