use std::path::PathBuf;

use crate::error::{AppError, AppResult};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_FRONTEND_DIR: &str = "frontend/dist";

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: Option<String>,
    pub access_token: Option<String>,
}

impl SupabaseSettings {
    /// The key sent as `apikey`. The service-role key bypasses RLS and wins
    /// when both are configured.
    pub fn api_key(&self) -> &str {
        self.service_role_key.as_deref().unwrap_or(&self.anon_key)
    }

    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or_else(|| self.api_key())
    }
}

#[derive(Debug, Clone)]
pub enum StorageSettings {
    Supabase(SupabaseSettings),
    Sqlite { database_url: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    pub local_user_id: Option<String>,
    pub jwt_secret: Option<String>,
    pub bind_addr: String,
    pub frontend_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = get("SUPABASE_URL");
        let anon_key = get("SUPABASE_ANON_KEY");

        let storage = match (url, anon_key) {
            (Some(url), Some(anon_key)) => StorageSettings::Supabase(SupabaseSettings {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
                service_role_key: get("SUPABASE_SERVICE_ROLE_KEY"),
                access_token: get("SUPABASE_ACCESS_TOKEN"),
            }),
            (None, None) => match get("DATABASE_URL") {
                Some(database_url) if database_url.starts_with("sqlite:") => {
                    StorageSettings::Sqlite { database_url }
                }
                Some(other) => {
                    return Err(AppError::Config(format!(
                        "DATABASE_URL must be a sqlite: URL, got {}",
                        other
                    )));
                }
                None => {
                    return Err(AppError::Config(
                        "Missing SUPABASE_URL / SUPABASE_ANON_KEY (or DATABASE_URL for a local SQLite store)"
                            .to_string(),
                    ));
                }
            },
            _ => {
                return Err(AppError::Config(
                    "SUPABASE_URL and SUPABASE_ANON_KEY must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            storage,
            local_user_id: get("SUPABASE_USER_ID"),
            jwt_secret: get("SUPABASE_JWT_SECRET"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            frontend_dir: get("FRONTEND_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FRONTEND_DIR)),
        })
    }

    pub fn supabase(&self) -> Option<&SupabaseSettings> {
        match &self.storage {
            StorageSettings::Supabase(s) => Some(s),
            StorageSettings::Sqlite { .. } => None,
        }
    }
}
