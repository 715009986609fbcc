//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{
            BulkReturnReport, BulkReturnRequest, CreateLoan, DueSoonQuery, LoanDetails,
            LoanListQuery, LoanStats, RenewQuery, SweepReport,
        },
        user::UserClaims,
    },
};

use super::AuthenticatedUser;

/// Members act on their own loans only; staff act on anyone's
fn require_owner_or_staff(claims: &UserClaims, owner_id: i64) -> AppResult<()> {
    if claims.user_id == owner_id {
        return Ok(());
    }
    claims.require_staff().map_err(|_| {
        AppError::Authorization("Members can only act on their own loans".to_string())
    })
}

/// Create a new loan (borrow a book)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "User or book not found"),
        (status = 422, description = "Account inactive, limit reached, unavailable or duplicate loan")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    require_owner_or_staff(&claims, request.user_id)?;
    request.validate()?;

    let loan = state.services.loans.create_loan(&request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// List loans, optionally filtered by status
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanListQuery),
    responses(
        (status = 200, description = "Loans", body = Vec<LoanDetails>),
        (status = 403, description = "Librarian or administrator role required")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanListQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_staff()?;

    let loans = state.services.loans.list_loans(query.status).await?;
    Ok(Json(loans))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_staff()?;

    let loan = state.services.loans.get_loan(loan_id).await?;
    Ok(Json(loan))
}

/// Loans in status ACTIVE
#[utoipa::path(
    get,
    path = "/loans/active",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active loans", body = Vec<LoanDetails>)
    )
)]
pub async fn active_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_staff()?;

    let loans = state.services.loans.active_loans().await?;
    Ok(Json(loans))
}

/// Active loans past their due date
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Late active loans", body = Vec<LoanDetails>)
    )
)]
pub async fn overdue_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_staff()?;

    let loans = state.services.loans.overdue_loans().await?;
    Ok(Json(loans))
}

/// Active loans due within the next days
#[utoipa::path(
    get,
    path = "/loans/due-soon",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(DueSoonQuery),
    responses(
        (status = 200, description = "Loans due soon", body = Vec<LoanDetails>)
    )
)]
pub async fn due_soon(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<DueSoonQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_staff()?;

    let loans = state.services.loans.due_soon(query.days).await?;
    Ok(Json(loans))
}

/// Open loans of the caller
#[utoipa::path(
    get,
    path = "/loans/mine",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own open loans", body = Vec<LoanDetails>)
    )
)]
pub async fn my_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.get_user_loans(claims.user_id).await?;
    Ok(Json(loans))
}

/// Loan statistics
#[utoipa::path(
    get,
    path = "/loans/statistics",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loan statistics", body = LoanStats)
    )
)]
pub async fn loan_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<LoanStats>> {
    claims.require_staff()?;

    let stats = state.services.loans.stats().await?;
    Ok(Json(stats))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_staff()?;

    let loan = state.services.loans.return_loan(loan_id).await?;
    Ok(Json(loan))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID"),
        RenewQuery
    ),
    responses(
        (status = 200, description = "Loan renewed", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan not active or overdue")
    )
)]
pub async fn renew_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
    Query(query): Query<RenewQuery>,
) -> AppResult<Json<LoanDetails>> {
    let current = state.services.loans.get_loan(loan_id).await?;
    require_owner_or_staff(&claims, current.user_id)?;

    let loan = state
        .services
        .loans
        .renew_loan(loan_id, query.additional_days)
        .await?;
    Ok(Json(loan))
}

/// Pay the fine of a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/pay-fine",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Fine cleared", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "No fine to pay")
    )
)]
pub async fn pay_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    let current = state.services.loans.get_loan(loan_id).await?;
    require_owner_or_staff(&claims, current.user_id)?;

    let loan = state.services.loans.pay_fine(loan_id).await?;
    Ok(Json(loan))
}

/// Mark late active loans as overdue and charge fines
#[utoipa::path(
    post,
    path = "/loans/sweep-overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn sweep_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    claims.require_admin()?;

    let report = state.services.loans.sweep_overdue().await?;
    Ok(Json(report))
}

/// Return several loans at once
#[utoipa::path(
    post,
    path = "/loans/bulk-return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BulkReturnRequest,
    responses(
        (status = 200, description = "Bulk return report", body = BulkReturnReport),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn bulk_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BulkReturnRequest>,
) -> AppResult<Json<BulkReturnReport>> {
    claims.require_admin()?;

    let report = state.services.loans.bulk_return(&request.loan_ids).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn claims(user_id: i64, role: Role) -> UserClaims {
        UserClaims {
            sub: "someone".into(),
            user_id,
            role,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_member_acts_on_own_loans_only() {
        assert!(require_owner_or_staff(&claims(3, Role::Member), 3).is_ok());
        assert!(matches!(
            require_owner_or_staff(&claims(3, Role::Member), 4),
            Err(AppError::Authorization(_))
        ));
        assert!(require_owner_or_staff(&claims(1, Role::Librarian), 4).is_ok());
        assert!(require_owner_or_staff(&claims(1, Role::Admin), 4).is_ok());
    }
}
