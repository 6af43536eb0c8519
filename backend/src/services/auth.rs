//! Staff authentication and account provisioning

use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{validate_email, validate_password, Actor, Role, User};
use validator::Validate;

use crate::config::{BootstrapAdminConfig, JwtConfig};
use crate::error::{AppError, AppResult};
use crate::repository::{NewUser, Repository};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn actor(&self) -> AppResult<Actor> {
        let user_id = self
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;
        Ok(Actor::new(user_id, self.role))
    }
}

/// Access token returned on login
#[derive(Debug, Serialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: User,
}

/// Signs and validates access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    expiry_seconds: i64,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            expiry_seconds: config.access_token_expiry,
        }
    }

    pub fn issue(&self, user: &User) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            exp: (now + Duration::seconds(self.expiry_seconds)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_seconds
    }
}

/// Input for creating a staff account
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    pub username: String,
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn Repository>,
    tokens: TokenIssuer,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(repo: Arc<dyn Repository>, tokens: TokenIssuer) -> Self {
        Self {
            repo,
            tokens,
            hash_cost: DEFAULT_COST,
        }
    }

    /// Use a cheaper bcrypt cost (tests)
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Authenticate with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<AuthToken> {
        let credentials = self
            .repo
            .find_user_by_username(username.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &credentials.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }
        if !credentials.user.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        let access_token = self.tokens.issue(&credentials.user)?;
        tracing::info!(user_id = credentials.user.id, "User logged in");

        Ok(AuthToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.expiry_seconds(),
            user: credentials.user,
        })
    }

    /// Create an inspector or administrator account
    pub async fn create_user(&self, input: CreateUserInput) -> AppResult<User> {
        input
            .validate()
            .map_err(|e| AppError::from(shared::first_validation_error(&e)))?;
        validate_password(&input.password).map_err(|m| AppError::validation("password", m))?;
        let email = input
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            validate_email(email).map_err(|m| AppError::validation("email", m))?;
        }

        let password_hash = hash(&input.password, self.hash_cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let user = self
            .repo
            .insert_user(NewUser {
                username: input.username.trim().to_string(),
                name: input.name.trim().to_string(),
                email,
                role: input.role,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = user.id, role = user.role.as_str(), "User created");
        Ok(user)
    }

    /// Create the configured administrator when no accounts exist yet
    pub async fn ensure_bootstrap_admin(
        &self,
        bootstrap: Option<&BootstrapAdminConfig>,
    ) -> AppResult<Option<User>> {
        let Some(bootstrap) = bootstrap else {
            return Ok(None);
        };
        if self.repo.count_users().await? > 0 {
            return Ok(None);
        }

        let user = self
            .create_user(CreateUserInput {
                username: bootstrap.username.clone(),
                password: bootstrap.password.clone(),
                name: "Administrator".to_string(),
                email: None,
                role: Role::Admin,
            })
            .await?;
        tracing::info!(username = %user.username, "Bootstrap administrator created");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    fn service() -> AuthService {
        let tokens = TokenIssuer::new(&JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expiry: 3600,
        });
        AuthService::new(Arc::new(MemoryRepository::new()), tokens).with_hash_cost(4)
    }

    fn inspector_input() -> CreateUserInput {
        CreateUserInput {
            username: "inspector7".to_string(),
            password: "correct-horse".to_string(),
            name: "Inspector Seven".to_string(),
            email: Some("seven@halal.example.com".to_string()),
            role: Role::Inspector,
        }
    }

    #[tokio::test]
    async fn test_login_issues_token_for_actor() {
        let auth = service();
        let user = auth.create_user(inspector_input()).await.unwrap();

        let token = auth.login("inspector7", "correct-horse").await.unwrap();
        let claims = auth.tokens().validate(&token.access_token).unwrap();
        let actor = claims.actor().unwrap();
        assert_eq!(actor.user_id, user.id);
        assert_eq!(actor.role, Role::Inspector);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let auth = service();
        auth.create_user(inspector_input()).await.unwrap();

        let err = auth.login("inspector7", "wrong-password").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        let err = auth.login("nobody", "correct-horse").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let auth = service();
        auth.create_user(inspector_input()).await.unwrap();
        let err = auth.create_user(inspector_input()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_when_empty() {
        let auth = service();
        let bootstrap = BootstrapAdminConfig {
            username: "admin".to_string(),
            password: "change-me-now".to_string(),
        };

        let created = auth.ensure_bootstrap_admin(Some(&bootstrap)).await.unwrap();
        assert_eq!(created.map(|u| u.role), Some(Role::Admin));
        assert!(auth.ensure_bootstrap_admin(Some(&bootstrap)).await.unwrap().is_none());
    }

    #[test]
    fn test_tampered_token_is_unauthorized() {
        let tokens = TokenIssuer::new(&JwtConfig {
            secret: "a".to_string(),
            access_token_expiry: 60,
        });
        let other = TokenIssuer::new(&JwtConfig {
            secret: "b".to_string(),
            access_token_expiry: 60,
        });
        let user = User {
            id: 1,
            username: "admin".to_string(),
            name: "Admin".to_string(),
            email: None,
            role: Role::Admin,
            is_active: true,
            created_at: Utc::now(),
        };
        let token = tokens.issue(&user).unwrap();
        assert!(matches!(other.validate(&token), Err(AppError::Unauthorized(_))));
    }
}
