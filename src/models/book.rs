//! Book model and copy-count bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::Rejection;

/// Catalog entry. `0 <= available_copies <= total_copies` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: Option<String>,
    pub published_year: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Copies currently out on loan
    pub fn loaned_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    /// Take one copy off the shelf for a new loan
    pub fn reserve_copy(&mut self) -> Result<(), Rejection> {
        if !self.is_available() {
            return Err(Rejection::Unavailable);
        }
        self.available_copies -= 1;
        Ok(())
    }

    /// Put one copy back on the shelf, never above `total_copies`
    pub fn release_copy(&mut self) {
        if self.available_copies < self.total_copies {
            self.available_copies += 1;
        }
    }

    /// Change the number of owned copies; loaned copies stay loaned.
    pub fn resize(&mut self, new_total: i32) -> Result<(), Rejection> {
        let available = self.available_copies + (new_total - self.total_copies);
        if available < 0 {
            return Err(Rejection::CopiesBelowLoaned);
        }
        self.total_copies = new_total;
        self.available_copies = available;
        Ok(())
    }

    pub fn ensure_deletable(&self) -> Result<(), Rejection> {
        if self.loaned_copies() > 0 {
            return Err(Rejection::BookOnLoan);
        }
        Ok(())
    }
}

/// Create or replace book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BookRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Author must be 1 to 100 characters"))]
    pub author: String,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10 to 17 characters"))]
    pub isbn: String,
    #[validate(length(max = 100, message = "Publisher must not exceed 100 characters"))]
    pub publisher: Option<String>,
    pub published_year: Option<i32>,
    #[validate(length(max = 50, message = "Category must not exceed 50 characters"))]
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: i32,
}

/// Book search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Free text over title, author and ISBN
    pub q: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    /// Only books with at least one copy on the shelf
    pub available: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct YearRangeQuery {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookPage {
    pub items: Vec<Book>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Availability {
    pub book_id: i64,
    pub available: bool,
    pub available_copies: i32,
    pub total_copies: i32,
}

impl From<&Book> for Availability {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.id,
            available: book.is_available(),
            available_copies: book.available_copies,
            total_copies: book.total_copies,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookStats {
    pub total: i64,
    pub available: i64,
    pub out_of_stock: i64,
    pub categories: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(total: i32, available: i32) -> Book {
        Book {
            id: 1,
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            isbn: "9780441013593".into(),
            publisher: None,
            published_year: Some(1965),
            category: Some("Science Fiction".into()),
            description: None,
            total_copies: total,
            available_copies: available,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reserve_last_copy() {
        let mut b = book(1, 1);
        assert!(b.reserve_copy().is_ok());
        assert_eq!(b.available_copies, 0);
        assert_eq!(b.reserve_copy(), Err(Rejection::Unavailable));
        assert_eq!(b.available_copies, 0);
    }

    #[test]
    fn test_release_is_capped() {
        let mut b = book(2, 1);
        b.release_copy();
        assert_eq!(b.available_copies, 2);
        b.release_copy();
        assert_eq!(b.available_copies, 2);
    }

    #[test]
    fn test_resize_keeps_loaned_copies() {
        let mut b = book(3, 1);
        b.resize(5).unwrap();
        assert_eq!((b.total_copies, b.available_copies), (5, 3));
        b.resize(2).unwrap();
        assert_eq!((b.total_copies, b.available_copies), (2, 0));
        assert_eq!(b.resize(1), Err(Rejection::CopiesBelowLoaned));
        assert_eq!((b.total_copies, b.available_copies), (2, 0));
    }

    #[test]
    fn test_delete_requires_all_copies_home() {
        assert_eq!(book(2, 1).ensure_deletable(), Err(Rejection::BookOnLoan));
        assert!(book(2, 2).ensure_deletable().is_ok());
    }

    #[test]
    fn test_book_request_validation() {
        let request = BookRequest {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            isbn: "123".into(),
            publisher: None,
            published_year: None,
            category: None,
            description: None,
            total_copies: 0,
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("isbn"));
        assert!(fields.contains_key("total_copies"));
    }
}
