//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, users};

/// Registers the `bearer_auth` scheme referenced by secured paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Library Management System REST API: catalog, members, loans and fines",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::refresh,
        auth::me,
        auth::change_password,
        // Books
        books::list_books,
        books::get_book,
        books::get_book_by_isbn,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::list_categories,
        books::popular_books,
        books::out_of_stock,
        books::books_by_year,
        books::availability,
        books::book_stats,
        // Users
        users::list_users,
        users::get_user,
        users::get_my_profile,
        users::update_my_profile,
        users::update_user,
        users::deactivate_user,
        users::update_role,
        users::delete_user,
        users::user_stats,
        users::get_user_loans,
        users::get_user_history,
        users::can_borrow,
        // Loans
        loans::create_loan,
        loans::list_loans,
        loans::get_loan,
        loans::active_loans,
        loans::overdue_loans,
        loans::due_soon,
        loans::my_loans,
        loans::loan_stats,
        loans::return_loan,
        loans::renew_loan,
        loans::pay_fine,
        loans::sweep_overdue,
        loans::bulk_return,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::TokenResponse,
            auth::UserInfo,
            // Books
            crate::models::book::Book,
            crate::models::book::BookRequest,
            crate::models::book::BookPage,
            crate::models::book::Availability,
            crate::models::book::BookStats,
            // Users
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::RegisterUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::ChangePassword,
            crate::models::user::UpdateRole,
            crate::models::user::UserPage,
            crate::models::user::UserStats,
            users::EligibilityResponse,
            // Loans
            crate::models::loan::LoanStatus,
            crate::models::loan::Loan,
            crate::models::loan::CreateLoan,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanPage,
            crate::models::loan::LoanStats,
            crate::models::loan::SweepReport,
            crate::models::loan::BulkReturnRequest,
            crate::models::loan::BulkReturnReport,
            crate::models::loan::BulkFailure,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "users", description = "User management"),
        (name = "loans", description = "Loans, renewals and fines")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_loan_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/loans/{id}/return"));
        assert!(doc.paths.paths.contains_key("/loans/sweep-overdue"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
