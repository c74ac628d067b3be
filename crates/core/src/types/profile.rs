//! User profile as returned by the profile endpoint.
//!
//! The identity fields (`id`, `username`, `email`) are required, so a body
//! missing any of them fails to deserialize instead of producing a
//! half-populated profile. Everything else is optional.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;
use super::status::Gender;

/// The authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: Email,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Birth date, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    /// Birth time as entered by the user (`HH:MM`); kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub authorities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Whether every birth attribute needed to personalize reports is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.birth_date.is_some()
            && has_text(self.birth_time.as_deref())
            && has_text(self.birth_city.as_deref())
            && has_text(self.birth_country.as_deref())
    }

    /// Name to greet the user with: nickname, then first name, then username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.first_name.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(&self.username)
    }

    /// Shallow-merge `update` onto this profile.
    ///
    /// Only fields present in the update are overwritten; identity and
    /// account metadata are never touched.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        merge(&mut self.first_name, update.first_name.as_ref());
        merge(&mut self.last_name, update.last_name.as_ref());
        merge(&mut self.gender, update.gender.as_ref());
        merge(&mut self.nickname, update.nickname.as_ref());
        merge(&mut self.image_url, update.image_url.as_ref());
        merge(&mut self.birth_date, update.birth_date.as_ref());
        merge(&mut self.birth_time, update.birth_time.as_ref());
        merge(&mut self.birth_city, update.birth_city.as_ref());
        merge(&mut self.birth_country, update.birth_country.as_ref());
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

fn merge<T: Clone>(target: &mut Option<T>, source: Option<&T>) {
    if let Some(value) = source {
        *target = Some(value.clone());
    }
}

/// Partial profile: the body of a profile update and the argument of a
/// local cache merge. Absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_country: Option<String>,
}

impl ProfileUpdate {
    /// True when the update would not change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&UserProfile> for ProfileUpdate {
    /// Every user-editable field of `profile`, e.g. to merge a server
    /// response into a cached copy.
    fn from(profile: &UserProfile) -> Self {
        Self {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            gender: profile.gender,
            nickname: profile.nickname.clone(),
            image_url: profile.image_url.clone(),
            birth_date: profile.birth_date,
            birth_time: profile.birth_time.clone(),
            birth_city: profile.birth_city.clone(),
            birth_country: profile.birth_country.clone(),
        }
    }
}
