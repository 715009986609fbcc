//! Catalog management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{Availability, Book, BookPage, BookQuery, BookRequest, BookStats},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<BookPage> {
        let (items, total) = self.repository.books.search(query).await?;
        Ok(BookPage {
            items,
            total,
            page: query.page.unwrap_or(1).max(1),
            per_page: query.per_page.unwrap_or(20).clamp(1, 100),
        })
    }

    /// Get book by ID
    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn get_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        self.repository.books.get_by_isbn(isbn.trim()).await
    }

    /// Create a new book
    pub async fn create_book(&self, request: &BookRequest) -> AppResult<Book> {
        request.validate()?;

        if self.repository.books.isbn_exists(&request.isbn, None).await? {
            return Err(AppError::Conflict(format!(
                "Book with ISBN {} already exists",
                request.isbn
            )));
        }

        let book = self.repository.books.create(request).await?;
        tracing::info!(book_id = book.id, isbn = %book.isbn, "Book created");
        Ok(book)
    }

    /// Update an existing book
    pub async fn update_book(&self, id: i64, request: &BookRequest) -> AppResult<Book> {
        request.validate()?;

        if self.repository.books.isbn_exists(&request.isbn, Some(id)).await? {
            return Err(AppError::Conflict(format!(
                "Book with ISBN {} already exists",
                request.isbn
            )));
        }

        self.repository.books.update(id, request).await
    }

    /// Delete a book
    pub async fn delete_book(&self, id: i64) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        self.repository.books.categories().await
    }

    pub async fn popular(&self, limit: Option<i64>) -> AppResult<Vec<Book>> {
        self.repository
            .books
            .popular(limit.unwrap_or(10).clamp(1, 100))
            .await
    }

    pub async fn out_of_stock(&self) -> AppResult<Vec<Book>> {
        self.repository.books.out_of_stock().await
    }

    pub async fn by_year_range(&self, from: i32, to: i32) -> AppResult<Vec<Book>> {
        if from > to {
            return Err(AppError::Validation(
                "Start year must not be after end year".to_string(),
            ));
        }
        self.repository.books.by_year_range(from, to).await
    }

    pub async fn availability(&self, id: i64) -> AppResult<Availability> {
        let book = self.repository.books.get_by_id(id).await?;
        Ok(Availability::from(&book))
    }

    pub async fn stats(&self) -> AppResult<BookStats> {
        self.repository.books.stats().await
    }
}
