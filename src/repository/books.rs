//! Books repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult, Rejection},
    models::book::{Book, BookQuery, BookRequest, BookStats},
};

const BOOK_COLUMNS: &str = "id, title, author, isbn, publisher, published_year, category, \
     description, total_copies, available_copies, created_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get book by ISBN
    pub async fn get_by_isbn(&self, isbn: &str) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE isbn = $1", BOOK_COLUMNS))
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    /// Check if ISBN already exists
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND id != COALESCE($2, -1))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Search books with pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref q) = query.q {
            params.push(format!("%{}%", q.to_lowercase()));
            conditions.push(format!(
                "(LOWER(title) LIKE ${0} OR LOWER(author) LIKE ${0} OR isbn LIKE ${0})",
                params.len()
            ));
        }

        if let Some(ref category) = query.category {
            params.push(category.to_lowercase());
            conditions.push(format!("LOWER(category) = ${}", params.len()));
        }

        if let Some(ref author) = query.author {
            params.push(format!("%{}%", author.to_lowercase()));
            conditions.push(format!("LOWER(author) LIKE ${}", params.len()));
        }

        match query.available {
            Some(true) => conditions.push("available_copies > 0".to_string()),
            Some(false) => conditions.push("available_copies = 0".to_string()),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT {} FROM books
            {}
            ORDER BY title, id
            LIMIT {} OFFSET {}
            "#,
            BOOK_COLUMNS, where_clause, per_page, offset
        );
        let mut select_builder = sqlx::query_as::<_, Book>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let books = select_builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Create a new book; every copy starts on the shelf
    pub async fn create(&self, book: &BookRequest) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (
                title, author, isbn, publisher, published_year, category,
                description, total_copies, available_copies
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.published_year)
        .bind(&book.category)
        .bind(&book.description)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Replace book fields. Copy counts move together so loaned copies stay loaned.
    pub async fn update(&self, id: i64, request: &BookRequest) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        book.resize(request.total_copies)?;

        let updated = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = $1, author = $2, isbn = $3, publisher = $4, published_year = $5,
                category = $6, description = $7, total_copies = $8, available_copies = $9
            WHERE id = $10
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&request.title)
        .bind(&request.author)
        .bind(&request.isbn)
        .bind(&request.publisher)
        .bind(request.published_year)
        .bind(&request.category)
        .bind(&request.description)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Delete a book that has every copy home and no loan history
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        book.ensure_deletable()?;

        let has_history: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if has_history {
            return Err(Rejection::BookHasLoanHistory.into());
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Distinct non-empty categories, sorted
    pub async fn categories(&self) -> AppResult<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT category FROM books
            WHERE category IS NOT NULL AND category != ''
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    /// Most borrowed books over all time
    pub async fn popular(&self, limit: i64) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT b.* FROM books b
            JOIN (SELECT book_id, COUNT(*) AS n FROM loans GROUP BY book_id) c ON c.book_id = b.id
            ORDER BY c.n DESC, b.id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    pub async fn out_of_stock(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE available_copies = 0 ORDER BY title, id",
            BOOK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Books published between `from` and `to`, inclusive
    pub async fn by_year_range(&self, from: i32, to: i32) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {} FROM books
            WHERE published_year BETWEEN $1 AND $2
            ORDER BY published_year, title, id
            "#,
            BOOK_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    pub async fn stats(&self) -> AppResult<BookStats> {
        let (total, available, out_of_stock, categories): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE available_copies > 0),
                COUNT(*) FILTER (WHERE available_copies = 0),
                COUNT(DISTINCT category)
            FROM books
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(BookStats {
            total,
            available,
            out_of_stock,
            categories,
        })
    }
}
