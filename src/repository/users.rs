//! Users repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::user::{Role, UpdateProfile, User, UserQuery, UserStats},
};

const USER_COLUMNS: &str =
    "id, username, email, password, first_name, last_name, role, is_active, created_at";

/// Insert payload; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Admin-side field changes, already validated and hashed
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl From<&UpdateProfile> for UserChanges {
    fn from(profile: &UpdateProfile) -> Self {
        Self {
            email: profile.email.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by username (authentication)
    pub async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(username) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Check if username already exists
    pub async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER($1) AND id != COALESCE($2, -1))",
        )
        .bind(username)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Check if email already exists
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND id != COALESCE($2, -1))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Search users with pagination
    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref q) = query.q {
            params.push(format!("%{}%", q.to_lowercase()));
            conditions.push(format!(
                "(LOWER(username) LIKE ${0} OR LOWER(first_name) LIKE ${0} OR LOWER(last_name) LIKE ${0})",
                params.len()
            ));
        }

        if let Some(role) = query.role {
            params.push(role.as_str().to_string());
            conditions.push(format!("role = ${}", params.len()));
        }

        if let Some(is_active) = query.is_active {
            params.push(is_active.to_string());
            conditions.push(format!("is_active = ${}::boolean", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM users {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT {} FROM users
            {}
            ORDER BY last_name, first_name, id
            LIMIT {} OFFSET {}
            "#,
            USER_COLUMNS, where_clause, per_page, offset
        );
        let mut select_builder = sqlx::query_as::<_, User>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let users = select_builder.fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    /// Create a new user
    pub async fn create(&self, user: &NewUser) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, first_name, last_name, role, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Apply the given changes; absent fields keep their value
    pub async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($1, username),
                email = COALESCE($2, email),
                password = COALESCE($3, password),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                role = COALESCE($6, role),
                is_active = COALESCE($7, is_active)
            WHERE id = $8
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.password)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(changes.role)
        .bind(changes.is_active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        Ok(user)
    }

    /// Deactivate a user; existing loans are untouched
    pub async fn deactivate(&self, id: i64) -> AppResult<User> {
        self.update(
            id,
            &UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_role(&self, id: i64, role: Role) -> AppResult<User> {
        self.update(
            id,
            &UserChanges {
                role: Some(role),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_password(&self, id: i64, hash: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    /// Hard delete. Users referenced by any loan are kept.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let has_loans: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        if has_loans {
            return Err(AppError::Conflict(
                "User has loan history and cannot be deleted; deactivate instead".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    pub async fn stats(&self) -> AppResult<UserStats> {
        let (total, active, members, librarians, admins): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE is_active),
                    COUNT(*) FILTER (WHERE role = 'MEMBER'),
                    COUNT(*) FILTER (WHERE role = 'LIBRARIAN'),
                    COUNT(*) FILTER (WHERE role = 'ADMIN')
                FROM users
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(UserStats {
            total,
            active,
            members,
            librarians,
            admins,
        })
    }
}
