//! Catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    models::book::{Availability, Book, BookPage, BookQuery, BookRequest, BookStats, YearRangeQuery},
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PopularQuery {
    /// Number of books (default 10)
    pub limit: Option<i64>,
}

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = BookPage),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookPage>> {
    let page = state.services.catalog.search_books(&query).await?;
    Ok(Json(page))
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Get book by ISBN
#[utoipa::path(
    get,
    path = "/books/isbn/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "ISBN")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_by_isbn(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(isbn): Path<String>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_by_isbn(&isbn).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookRequest,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Librarian or administrator role required"),
        (status = 409, description = "ISBN already exists")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BookRequest>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_staff()?;

    let book = state.services.catalog.create_book(&request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = BookRequest,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found"),
        (status = 409, description = "ISBN already exists"),
        (status = 422, description = "Total copies below loaned copies")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<BookRequest>,
) -> AppResult<Json<Book>> {
    claims.require_staff()?;

    let book = state.services.catalog.update_book(id, &request).await?;
    Ok(Json(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Book has copies on loan or loan history")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List catalog categories
#[utoipa::path(
    get,
    path = "/books/categories",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Distinct categories", body = Vec<String>)
    )
)]
pub async fn list_categories(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<String>>> {
    let categories = state.services.catalog.categories().await?;
    Ok(Json(categories))
}

/// Most borrowed books
#[utoipa::path(
    get,
    path = "/books/popular",
    tag = "books",
    security(("bearer_auth" = [])),
    params(PopularQuery),
    responses(
        (status = 200, description = "Books ordered by loan count", body = Vec<Book>)
    )
)]
pub async fn popular_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<PopularQuery>,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.catalog.popular(query.limit).await?;
    Ok(Json(books))
}

/// Books with no copy on the shelf
#[utoipa::path(
    get,
    path = "/books/out-of-stock",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Out of stock books", body = Vec<Book>),
        (status = 403, description = "Librarian or administrator role required")
    )
)]
pub async fn out_of_stock(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Book>>> {
    claims.require_staff()?;

    let books = state.services.catalog.out_of_stock().await?;
    Ok(Json(books))
}

/// Books published within a year range
#[utoipa::path(
    get,
    path = "/books/by-year",
    tag = "books",
    security(("bearer_auth" = [])),
    params(YearRangeQuery),
    responses(
        (status = 200, description = "Books in range", body = Vec<Book>),
        (status = 400, description = "Invalid range")
    )
)]
pub async fn books_by_year(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<YearRangeQuery>,
) -> AppResult<Json<Vec<Book>>> {
    let books = state
        .services
        .catalog
        .by_year_range(query.from, query.to)
        .await?;
    Ok(Json(books))
}

/// Copy availability of a book
#[utoipa::path(
    get,
    path = "/books/{id}/availability",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Availability", body = Availability),
        (status = 404, description = "Book not found")
    )
)]
pub async fn availability(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Availability>> {
    let availability = state.services.catalog.availability(id).await?;
    Ok(Json(availability))
}

/// Catalog statistics
#[utoipa::path(
    get,
    path = "/books/statistics",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Catalog statistics", body = BookStats),
        (status = 403, description = "Librarian or administrator role required")
    )
)]
pub async fn book_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BookStats>> {
    claims.require_staff()?;

    let stats = state.services.catalog.stats().await?;
    Ok(Json(stats))
}
