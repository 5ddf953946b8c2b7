use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use futures::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::services::db_models::{Role, User};
use crate::services::db_utils::AppState;
use crate::services::messages::FetchUser;

const TOKEN_TTL_DAYS: i64 = 30;

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::Internal(format!("failed to hash password: {err}")))
}

/// Constant-time comparison happens inside the argon2 verifier. An
/// unparsable stored hash counts as a mismatch.
pub fn verify_password(stored_hash: &str, plain: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub name: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| ApiError::Internal(format!("failed to sign token: {err}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| ApiError::Auth("invalid or expired token"))
    }
}

fn claims_from_request(req: &HttpRequest) -> Result<Claims, ApiError> {
    let state = req
        .app_data::<Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state is not configured".into()))?;

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .ok_or(ApiError::Auth("missing authorization header"))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Auth("authorization header is not a bearer token"))?;

    state.jwt.verify(token)
}

/// Any signed-in user. Verifies the bearer token without touching the store.
pub struct AuthedUser(pub Claims);

impl AuthedUser {
    pub fn user_id(&self) -> Result<i64, ApiError> {
        self.0
            .sub
            .parse()
            .map_err(|_| ApiError::Auth("invalid or expired token"))
    }
}

impl FromRequest for AuthedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_request(req).map(AuthedUser))
    }
}

/// Admin gate: valid token plus a fresh role lookup, so a demoted user
/// cannot keep administrating on an old token.
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            let authed = AuthedUser(claims_from_request(&req)?);
            let user_id = authed.user_id()?;

            let state = req
                .app_data::<Data<AppState>>()
                .ok_or_else(|| ApiError::Internal("application state is not configured".into()))?;

            let user = match state.pg_db.send(FetchUser(user_id)).await? {
                Ok(user) => user,
                Err(ApiError::NotFound(_)) => return Err(ApiError::Auth("permission denied")),
                Err(other) => return Err(other),
            };

            if user.role != Role::Admin {
                return Err(ApiError::Auth("permission denied"));
            }

            Ok(AdminUser(user))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::db_models::Role;

    fn sample_user() -> User {
        let now = Utc::now().naive_utc();
        User {
            id: 42,
            name: "Maria".into(),
            email: "maria@example.com".into(),
            password: "irrelevant".into(),
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();

        assert_ne!(hash, "correct horse");
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "incorrect horse"));
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn token_round_trip_keeps_identity_claims() {
        let jwt = JwtService::from_secret("test-secret-which-is-long-enough");
        let token = jwt.sign(&sample_user()).unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.name, "Maria");
        assert_eq!(claims.email, "maria@example.com");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_DAYS * 24 * 60 * 60);
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = JwtService::from_secret("secret-a")
            .sign(&sample_user())
            .unwrap();

        let err = JwtService::from_secret("secret-b").verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[test]
    fn authed_user_exposes_the_numeric_subject() {
        let jwt = JwtService::from_secret("test-secret-which-is-long-enough");
        let token = jwt.sign(&sample_user()).unwrap();
        let authed = AuthedUser(jwt.verify(&token).unwrap());

        assert_eq!(authed.user_id().unwrap(), 42);

        let mut mangled = authed.0.clone();
        mangled.sub = "not-a-number".into();
        assert!(matches!(
            AuthedUser(mangled).user_id(),
            Err(ApiError::Auth(_))
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let jwt = JwtService::from_secret("test-secret-which-is-long-enough");
        let mut token = jwt.sign(&sample_user()).unwrap();
        token.pop();

        assert!(jwt.verify(&token).is_err());
    }
}
