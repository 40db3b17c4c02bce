use std::time::Duration;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::config::{Settings, SupabaseSettings};
use crate::error::{AppError, AppResult};

pub const JWT_AUDIENCE: &str = "authenticated";

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// First non-blank of the session value and the locally configured id wins.
/// The winner must be a UUID.
pub fn resolve_user_id(session_value: Option<&str>, local_user_id: Option<&str>) -> AppResult<Uuid> {
    let candidate = [session_value, local_user_id]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::Unauthenticated(
                "Not signed in. Sign in or set SUPABASE_USER_ID for local use.".to_string(),
            )
        })?;

    Uuid::parse_str(candidate)
        .map_err(|_| AppError::Unauthenticated("User id is not a valid UUID".to_string()))
}

/// How a bearer token is turned into a user id.
pub enum TokenVerifier {
    /// HS256 tokens signed with the project's JWT secret.
    Jwt {
        key: DecodingKey,
        validation: Validation,
    },
    /// Ask the auth service who the token belongs to.
    Remote {
        client: reqwest::Client,
        user_url: String,
        api_key: String,
    },
    Disabled,
}

impl TokenVerifier {
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        if let Some(secret) = &settings.jwt_secret {
            return Ok(Self::jwt(secret));
        }
        match settings.supabase() {
            Some(supabase) => Self::remote(supabase),
            None => Ok(Self::Disabled),
        }
    }

    pub fn jwt(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[JWT_AUDIENCE]);
        Self::Jwt {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn remote(supabase: &SupabaseSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::Remote {
            client,
            user_url: format!("{}/auth/v1/user", supabase.url.trim_end_matches('/')),
            api_key: supabase.anon_key.clone(),
        })
    }

    /// Returns the user id the token was issued for.
    pub async fn verify(&self, token: &str) -> AppResult<String> {
        match self {
            Self::Jwt { key, validation } => decode::<Claims>(token, key, validation)
                .map(|data| data.claims.sub)
                .map_err(|e| {
                    tracing::debug!(error = %e, "Rejected bearer token");
                    AppError::Unauthenticated("Invalid token".to_string())
                }),
            Self::Remote {
                client,
                user_url,
                api_key,
            } => {
                let response = client
                    .get(user_url)
                    .header("apikey", api_key)
                    .bearer_auth(token)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    tracing::debug!(status = %response.status(), "Auth service rejected token");
                    return Err(AppError::Unauthenticated("Invalid token".to_string()));
                }
                let user: AuthUser = response.json().await?;
                Ok(user.id)
            }
            Self::Disabled => Err(AppError::Unauthenticated(
                "Token verification is not configured".to_string(),
            )),
        }
    }
}

/// `Ok(None)` when the header is absent; a header that isn't a bearer token
/// is rejected outright.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthenticated("Invalid authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| AppError::Unauthenticated("Invalid authorization header".to_string()))
}

pub async fn extract_current_user(state: &AppState, headers: &HeaderMap) -> AppResult<Uuid> {
    match bearer_token(headers)? {
        Some(token) => {
            let subject = state.verifier.verify(token).await?;
            resolve_user_id(Some(&subject), None)
        }
        None => resolve_user_id(None, state.local_user_id.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        aud: &'a str,
        exp: usize,
    }

    fn token(secret: &str, sub: &str, aud: &str) -> String {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        encode(
            &Header::default(),
            &TestClaims { sub, aud, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn session_value_wins_over_local_id() {
        let session = Uuid::new_v4();
        let local = Uuid::new_v4();
        let resolved =
            resolve_user_id(Some(&session.to_string()), Some(&local.to_string())).unwrap();
        assert_eq!(resolved, session);
    }

    #[test]
    fn blank_session_falls_back_to_local_id() {
        let local = Uuid::new_v4();
        let resolved = resolve_user_id(Some("  "), Some(&local.to_string())).unwrap();
        assert_eq!(resolved, local);
    }

    #[test]
    fn missing_or_malformed_identity_is_unauthenticated() {
        assert!(matches!(resolve_user_id(None, None), Err(AppError::Unauthenticated(_))));
        assert!(matches!(
            resolve_user_id(None, Some("not-a-uuid")),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).unwrap().is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AppError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn jwt_verifier_checks_signature_and_audience() {
        let sub = Uuid::new_v4().to_string();
        let verifier = TokenVerifier::jwt("secret");

        let ok = verifier.verify(&token("secret", &sub, JWT_AUDIENCE)).await.unwrap();
        assert_eq!(ok, sub);

        let wrong_key = verifier.verify(&token("other", &sub, JWT_AUDIENCE)).await;
        assert!(matches!(wrong_key, Err(AppError::Unauthenticated(_))));

        let wrong_aud = verifier.verify(&token("secret", &sub, "anon")).await;
        assert!(matches!(wrong_aud, Err(AppError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn remote_verifier_asks_auth_service() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer good"))
            .and(header("apikey", "anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": id,
                "aud": "authenticated",
                "email": "ada@example.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let verifier = TokenVerifier::remote(&SupabaseSettings {
            url: server.uri(),
            anon_key: "anon".into(),
            service_role_key: Some("service".into()),
            access_token: None,
        })
        .unwrap();

        assert_eq!(verifier.verify("good").await.unwrap(), id.to_string());
        assert!(matches!(
            verifier.verify("bad").await,
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn disabled_verifier_rejects_tokens() {
        assert!(matches!(
            TokenVerifier::Disabled.verify("anything").await,
            Err(AppError::Unauthenticated(_))
        ));
    }
}
