//! User directory service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::user::{Role, UpdateProfile, UpdateUser, User, UserPage, UserQuery, UserStats},
    repository::{users::UserChanges, Repository},
    services::auth::hash_password,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search users
    pub async fn search_users(&self, query: &UserQuery) -> AppResult<UserPage> {
        let (items, total) = self.repository.users.search(query).await?;
        Ok(UserPage {
            items,
            total,
            page: query.page.unwrap_or(1).max(1),
            per_page: query.per_page.unwrap_or(20).clamp(1, 100),
        })
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Update user's own profile
    pub async fn update_profile(&self, user_id: i64, profile: &UpdateProfile) -> AppResult<User> {
        profile.validate()?;

        if let Some(ref email) = profile.email {
            if self.repository.users.email_exists(email, Some(user_id)).await? {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }

        self.repository
            .users
            .update(user_id, &UserChanges::from(profile))
            .await
    }

    /// Administrative update of any account field
    pub async fn update_user(&self, id: i64, request: &UpdateUser) -> AppResult<User> {
        request.validate()?;

        if let Some(ref username) = request.username {
            if self.repository.users.username_exists(username, Some(id)).await? {
                return Err(AppError::Conflict("Username already exists".to_string()));
            }
        }
        if let Some(ref email) = request.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }

        let role = request
            .role
            .as_deref()
            .map(str::parse::<Role>)
            .transpose()?;
        let password = request.password.as_deref().map(hash_password).transpose()?;

        let changes = UserChanges {
            username: request.username.clone(),
            email: request.email.clone(),
            password,
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            role,
            is_active: request.is_active,
        };

        let user = self.repository.users.update(id, &changes).await?;
        tracing::info!(user_id = id, "User updated");
        Ok(user)
    }

    /// Soft delete: the account can no longer sign in or borrow
    pub async fn deactivate(&self, id: i64) -> AppResult<User> {
        let user = self.repository.users.deactivate(id).await?;
        tracing::info!(user_id = id, "User deactivated");
        Ok(user)
    }

    pub async fn change_role(&self, id: i64, role: &str) -> AppResult<User> {
        let role: Role = role.parse()?;
        let user = self.repository.users.set_role(id, role).await?;
        tracing::info!(user_id = id, role = %role, "User role changed");
        Ok(user)
    }

    /// Delete a user
    pub async fn delete_user(&self, id: i64) -> AppResult<()> {
        self.repository.users.delete(id).await?;
        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }

    pub async fn stats(&self) -> AppResult<UserStats> {
        self.repository.users.stats().await
    }
}
