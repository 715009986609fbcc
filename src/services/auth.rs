//! Authentication service: registration, login and session tokens

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{ChangePassword, RegisterUser, Role, User, UserClaims},
    repository::{users::NewUser, Repository},
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new member account and sign it in
    pub async fn register(&self, request: &RegisterUser) -> AppResult<(String, User)> {
        request.validate()?;

        if self.repository.users.username_exists(&request.username, None).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        if self.repository.users.email_exists(&request.email, None).await? {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                username: request.username.trim().to_string(),
                email: request.email.trim().to_string(),
                password: hash_password(&request.password)?,
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                role: Role::Member,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    /// Authenticate user by username and return JWT token
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| {
                tracing::debug!(username, "Login for unknown user");
                AppError::Authentication("Invalid username or password".to_string())
            })?;

        if !verify_password(&user.password, password)? {
            tracing::debug!(user_id = user.id, "Login with wrong password");
            return Err(AppError::Authentication(
                "Invalid username or password".to_string(),
            ));
        }

        if !user.is_active {
            return Err(AppError::Authentication("Account is deactivated".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    /// Issue a fresh token for a still valid session
    pub async fn refresh(&self, claims: &UserClaims) -> AppResult<String> {
        let user = self.current_user(claims).await?;
        self.create_token_for_user(&user)
    }

    /// Resolve the account behind a token; deactivated accounts lose their session
    pub async fn current_user(&self, claims: &UserClaims) -> AppResult<User> {
        let user = self
            .repository
            .users
            .get_by_id(claims.user_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::Authentication("User no longer exists".to_string()),
                other => other,
            })?;

        if !user.is_active {
            return Err(AppError::Authentication("Account is deactivated".to_string()));
        }
        Ok(user)
    }

    pub async fn change_password(&self, user_id: i64, request: &ChangePassword) -> AppResult<()> {
        request.validate()?;

        let user = self.repository.users.get_by_id(user_id).await?;
        if !verify_password(&user.password, &request.current_password)? {
            return Err(AppError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = hash_password(&request.new_password)?;
        self.repository.users.update_password(user_id, &hash).await?;
        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Decode and validate a bearer token
    pub fn decode_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    /// Create JWT token for a user
    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "battery staple").unwrap());
    }

    #[test]
    fn test_garbage_hash_is_internal_error() {
        assert!(matches!(
            verify_password("not-a-hash", "x"),
            Err(AppError::Internal(_))
        ));
    }
}
