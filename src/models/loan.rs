//! Loan model, loan state machine and fine arithmetic

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{AppError, AppResult, Rejection};

/// Loan status. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Returned => "RETURNED",
            LoanStatus::Overdue => "OVERDUE",
        }
    }

    /// Still holding a copy of the book
    pub fn is_open(&self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(LoanStatus::Active),
            "RETURNED" => Ok(LoanStatus::Returned),
            "OVERDUE" => Ok(LoanStatus::Overdue),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// Whole days past `due_date`, truncated. Zero when not late.
pub fn days_overdue(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now > due_date {
        (now - due_date).num_days()
    } else {
        0
    }
}

/// `daily_rate × days`, exact
pub fn fine_for(days: i64, daily_rate: Decimal) -> Decimal {
    daily_rate * Decimal::from(days)
}

/// `from` plus `days` whole days, or `None` outside the representable range
pub fn add_days(from: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|delta| from.checked_add_signed(delta))
}

/// Borrowing eligibility: strictly fewer active loans than the limit
pub fn can_borrow(active_loans: i64, max_active_loans: i64) -> bool {
    active_loans < max_active_loans
}

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    #[schema(value_type = String)]
    pub fine: Decimal,
    pub notes: Option<String>,
}

impl Loan {
    /// Past due and not yet returned, evaluated against `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && now > self.due_date
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if self.status.is_open() {
            days_overdue(self.due_date, now)
        } else {
            0
        }
    }

    /// Close the loan. A late return stores the fine computed from `due_date`.
    pub fn mark_returned(&mut self, now: DateTime<Utc>, daily_rate: Decimal) -> Result<(), Rejection> {
        if !self.status.is_open() {
            return Err(Rejection::AlreadyReturned);
        }
        if self.is_overdue(now) {
            self.fine = fine_for(self.days_overdue(now), daily_rate);
        }
        self.return_date = Some(now);
        self.status = LoanStatus::Returned;
        Ok(())
    }

    /// Push the due date back. Only active loans that are not yet late qualify.
    pub fn renew(&mut self, now: DateTime<Utc>, additional_days: i64) -> AppResult<()> {
        if self.status != LoanStatus::Active {
            return Err(Rejection::LoanNotActive.into());
        }
        if self.is_overdue(now) {
            return Err(Rejection::LoanOverdue.into());
        }
        self.due_date = add_days(self.due_date, additional_days).ok_or_else(|| {
            AppError::Validation(format!("Cannot extend due date by {} days", additional_days))
        })?;
        Ok(())
    }

    /// Sweep transition. Returns false for anything that is not an active late loan,
    /// which leaves already-overdue loans and their fines untouched.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>, daily_rate: Decimal) -> bool {
        if self.status != LoanStatus::Active || self.due_date >= now {
            return false;
        }
        self.status = LoanStatus::Overdue;
        self.fine = fine_for(days_overdue(self.due_date, now), daily_rate);
        true
    }

    pub fn pay_fine(&mut self) -> Result<(), Rejection> {
        if self.fine <= Decimal::ZERO {
            return Err(Rejection::NoFineToPay);
        }
        self.fine = Decimal::ZERO;
        Ok(())
    }
}

/// Insert payload for a freshly issued loan
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: i64,
    pub book_id: i64,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Issue loan request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub user_id: i64,
    pub book_id: i64,
    /// Defaults to the standard loan period
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 500, message = "Notes must not exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RenewQuery {
    /// Days to add to the due date (default 14)
    pub additional_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LoanListQuery {
    pub status: Option<LoanStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DueSoonQuery {
    /// Window in days (default 3)
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Loan joined with its user and book, plus live lateness
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub user_full_name: String,
    pub book_id: i64,
    pub book_title: String,
    pub book_author: String,
    pub book_isbn: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    #[schema(value_type = String)]
    pub fine: Decimal,
    pub notes: Option<String>,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

/// Row shape of the loan/user/book join
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub book_title: String,
    pub book_author: String,
    pub book_isbn: String,
}

impl LoanDetails {
    pub fn from_row(row: LoanDetailsRow, now: DateTime<Utc>) -> Self {
        let loan = row.loan;
        Self {
            is_overdue: loan.is_overdue(now),
            days_overdue: loan.days_overdue(now),
            id: loan.id,
            user_id: loan.user_id,
            username: row.username,
            user_full_name: format!("{} {}", row.first_name, row.last_name),
            book_id: loan.book_id,
            book_title: row.book_title,
            book_author: row.book_author,
            book_isbn: row.book_isbn,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: loan.return_date,
            status: loan.status,
            fine: loan.fine,
            notes: loan.notes,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoanPage {
    pub items: Vec<LoanDetails>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanStats {
    pub total: i64,
    pub active: i64,
    pub overdue: i64,
    #[schema(value_type = String)]
    pub total_outstanding_fines: Decimal,
}

/// Outcome of an overdue sweep
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SweepReport {
    pub marked: usize,
    pub loan_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkReturnRequest {
    pub loan_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkFailure {
    pub loan_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BulkReturnReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<BulkFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn rate() -> Decimal {
        Decimal::new(50, 2)
    }

    fn loan(due: DateTime<Utc>) -> Loan {
        Loan {
            id: 1,
            user_id: 1,
            book_id: 1,
            loan_date: due - Duration::days(14),
            due_date: due,
            return_date: None,
            status: LoanStatus::Active,
            fine: Decimal::ZERO,
            notes: None,
        }
    }

    #[test]
    fn test_days_overdue_truncates() {
        assert_eq!(days_overdue(t0(), t0()), 0);
        assert_eq!(days_overdue(t0(), t0() - Duration::days(2)), 0);
        assert_eq!(days_overdue(t0(), t0() + Duration::hours(23)), 0);
        assert_eq!(days_overdue(t0(), t0() + Duration::hours(49)), 2);
    }

    #[test]
    fn test_fine_is_exact() {
        assert_eq!(fine_for(3, rate()), Decimal::new(150, 2));
        assert_eq!(fine_for(0, rate()), Decimal::ZERO);
        assert_eq!(fine_for(7, rate()).to_string(), "3.50");
    }

    #[test]
    fn test_can_borrow() {
        assert!(can_borrow(4, 5));
        assert!(!can_borrow(5, 5));
    }

    #[test]
    fn test_return_on_time_has_no_fine() {
        let mut l = loan(t0());
        l.mark_returned(t0(), rate()).unwrap();
        assert_eq!(l.status, LoanStatus::Returned);
        assert_eq!(l.fine, Decimal::ZERO);
        assert_eq!(l.return_date, Some(t0()));
    }

    #[test]
    fn test_late_return_fine() {
        let mut l = loan(t0());
        l.mark_returned(t0() + Duration::days(3), rate()).unwrap();
        assert_eq!(l.fine, Decimal::new(150, 2));
        assert_eq!(l.mark_returned(t0() + Duration::days(4), rate()), Err(Rejection::AlreadyReturned));
    }

    #[test]
    fn test_overdue_loan_return_recomputes_from_due_date() {
        let mut l = loan(t0());
        assert!(l.mark_overdue(t0() + Duration::days(1), rate()));
        assert_eq!(l.fine, Decimal::new(50, 2));
        l.mark_returned(t0() + Duration::days(5), rate()).unwrap();
        assert_eq!(l.fine, Decimal::new(250, 2));
    }

    #[test]
    fn test_sweep_skips_non_active() {
        let mut l = loan(t0());
        assert!(!l.mark_overdue(t0(), rate()));
        assert!(l.mark_overdue(t0() + Duration::days(1), rate()));
        assert!(!l.mark_overdue(t0() + Duration::days(9), rate()));
        assert_eq!(l.fine, Decimal::new(50, 2));
    }

    #[test]
    fn test_renew_rules() {
        let mut l = loan(t0());
        l.renew(t0() - Duration::days(1), 7).unwrap();
        assert_eq!(l.due_date, t0() + Duration::days(7));
        assert_eq!(l.fine, Decimal::ZERO);

        let mut late = loan(t0());
        assert!(matches!(
            late.renew(t0() + Duration::days(1), 7),
            Err(AppError::Rejected(Rejection::LoanOverdue))
        ));

        let mut swept = loan(t0());
        swept.mark_overdue(t0() + Duration::days(1), rate());
        assert!(matches!(
            swept.renew(t0() + Duration::days(1), 7),
            Err(AppError::Rejected(Rejection::LoanNotActive))
        ));
    }

    #[test]
    fn test_renew_out_of_range_is_validation() {
        let mut l = loan(t0());
        assert!(matches!(l.renew(t0(), i64::MAX / 1000), Err(AppError::Validation(_))));
        assert!(matches!(l.renew(t0(), 1_000_000_000), Err(AppError::Validation(_))));
        assert_eq!(l.due_date, t0());
    }

    #[test]
    fn test_add_days() {
        assert_eq!(add_days(t0(), 3), Some(t0() + Duration::days(3)));
        assert_eq!(add_days(t0(), i64::MAX), None);
        assert_eq!(add_days(t0(), 1_000_000_000), None);
    }

    #[test]
    fn test_pay_fine() {
        let mut l = loan(t0());
        assert_eq!(l.pay_fine(), Err(Rejection::NoFineToPay));
        l.fine = Decimal::new(150, 2);
        l.pay_fine().unwrap();
        assert_eq!(l.fine, Decimal::ZERO);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&LoanStatus::Overdue).unwrap(), "\"OVERDUE\"");
        assert_eq!("returned".parse::<LoanStatus>(), Ok(LoanStatus::Returned));
    }
}
