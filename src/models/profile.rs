use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DISPLAY_NAME_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
    Chicago,
}

impl CitationStyle {
    pub const ALL: [CitationStyle; 3] = [Self::Apa, Self::Mla, Self::Chicago];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apa => "apa",
            Self::Mla => "mla",
            Self::Chicago => "chicago",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(raw))
    }

    /// Stored styles are free text; anything unknown renders as APA.
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub citation_style: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Profile {
    pub fn style(&self) -> CitationStyle {
        CitationStyle::from_stored(self.citation_style.as_deref())
    }
}

/// Columns to write on a profile update. `None` leaves a column untouched;
/// `timezone: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub citation_style: Option<CitationStyle>,
    pub timezone: Option<Option<String>>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.citation_style.is_none() && self.timezone.is_none()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(name) = &self.display_name {
            body.insert("display_name".into(), name.clone().into());
        }
        if let Some(style) = self.citation_style {
            body.insert("citation_style".into(), style.as_str().into());
        }
        if let Some(tz) = &self.timezone {
            body.insert(
                "timezone".into(),
                tz.clone().map(serde_json::Value::from).unwrap_or_default(),
            );
        }
        serde_json::Value::Object(body)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub citation_style: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub display_name: String,
    pub citation_style: CitationStyle,
    pub timezone: Option<String>,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            citation_style: profile.style(),
            id: profile.id,
            display_name: profile.display_name,
            timezone: profile.timezone,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdateResponse {
    pub changed: bool,
    pub profile: ProfileResponse,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub profile: Option<ProfileResponse>,
}
