pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::dto::{AuthResponse, RegisterRequest};
use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::auth::repo_types::{NewUser, Plan, Role, User};
use crate::config::JwtConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = cfg.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }

    /// Access + refresh pair for `user`.
    pub fn issue(&self, user: User) -> ApiResult<AuthResponse> {
        let access_token = self.sign_access(user.id).map_err(|e| {
            error!(error = %e, "jwt sign access failed");
            ApiError::Internal(e.to_string())
        })?;
        let refresh_token = self.sign_refresh(user.id).map_err(|e| {
            error!(error = %e, "jwt sign refresh failed");
            ApiError::Internal(e.to_string())
        })?;
        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: user.into(),
        })
    }
}

/// Validate, hash and insert a new account on the free plan.
pub async fn register_user(state: &AppState, req: RegisterRequest) -> ApiResult<User> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::validation("Password too short"));
    }

    let hash = hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;
    let role = if state.config.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let user = state
        .store
        .create_user(NewUser {
            email,
            name,
            password_hash: hash,
            role,
            credits: Plan::Free.credit_allotment(),
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, role = ?user.role, "user registered");
    Ok(user)
}

/// Check credentials. Unknown email and wrong password are indistinguishable.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> ApiResult<User> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let ok = verify_password(password, user.password_hash.as_deref()).map_err(|e| {
        error!(error = %e, user_id = %user.id, "verify_password failed");
        ApiError::Internal(e.to_string())
    })?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }
    Ok(user)
}
