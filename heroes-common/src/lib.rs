// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use regex::Regex;

/// Domain used for the placeholder email attached to every provisioned identity.
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "telegram.bot";
pub const PROFILE_COLLECTION: &str = "users";
pub const DEFAULT_GAME_URL: &str = "https://t.me/TapHeroesBot/TapHeroes";

pub const START_COMMAND: &str = "start";
pub const PLAY_COMMAND: &str = "play";

pub type PlatformUserId = i64;
pub type IdentityKey = String;

/// The sender of an inbound chat command, as reported by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    pub platform_user_id: PlatformUserId,
    pub display_name: String,
}

impl PlatformUser {
    pub fn new(platform_user_id: PlatformUserId, display_name: impl Into<String>) -> Self {
        Self {
            platform_user_id,
            display_name: display_name.into(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        identity_key_for(self.platform_user_id)
    }
}

/// A backing account in the identity service. Created once, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub identity_key: IdentityKey,
    pub display_name: String,
    pub email: Option<String>,
}

/// A partial profile write. `None` fields are left untouched by a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub display_name: Option<String>,
    pub platform_user_id: Option<PlatformUserId>,
    pub premium_flag: Option<bool>,
}

impl ProfileFields {
    /// Fields written when an identity is first provisioned.
    pub fn for_new_user(user: &PlatformUser) -> Self {
        Self {
            display_name: Some(user.display_name.clone()),
            platform_user_id: Some(user.platform_user_id),
            premium_flag: Some(false),
        }
    }

    /// Overlay `self` onto `existing`, keeping every field `self` does not carry.
    pub fn merged_over(&self, existing: &ProfileFields) -> ProfileFields {
        ProfileFields {
            display_name: self
                .display_name
                .clone()
                .or_else(|| existing.display_name.clone()),
            platform_user_id: self.platform_user_id.or(existing.platform_user_id),
            premium_flag: self.premium_flag.or(existing.premium_flag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub identity_key: IdentityKey,
    pub display_name: String,
    pub platform_user_id: PlatformUserId,
    pub premium_flag: bool,
}

impl ProfileRecord {
    /// Materialize a record from stored fields. Returns `None` while the
    /// required fields have not been written yet.
    pub fn from_fields(identity_key: impl Into<IdentityKey>, fields: &ProfileFields) -> Option<Self> {
        Some(Self {
            identity_key: identity_key.into(),
            display_name: fields.display_name.clone()?,
            platform_user_id: fields.platform_user_id?,
            premium_flag: fields.premium_flag.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub target_url: String,
}

/// A single outbound chat reply: text, optionally with one link button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub button: Option<LinkButton>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            button: None,
        }
    }

    pub fn with_button(
        text: impl Into<String>,
        label: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            button: Some(LinkButton {
                label: label.into(),
                target_url: target_url.into(),
            }),
        }
    }
}

pub fn identity_key_for(platform_user_id: PlatformUserId) -> IdentityKey {
    platform_user_id.to_string()
}

/// Deterministic, password-less email for the identity behind `identity_key`.
pub fn placeholder_email(identity_key: &str) -> String {
    format!("{identity_key}@{PLACEHOLDER_EMAIL_DOMAIN}")
}

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_is_decimal_platform_id() {
        assert_eq!(identity_key_for(42), "42");
        assert_eq!(identity_key_for(-1001234), "-1001234");
        assert_eq!(PlatformUser::new(7, "Ana").identity_key(), "7");
    }

    #[test]
    fn placeholder_email_uses_fixed_domain() {
        assert_eq!(placeholder_email(&identity_key_for(42)), "42@telegram.bot");
    }

    #[test]
    fn new_user_fields_default_to_non_premium() {
        let fields = ProfileFields::for_new_user(&PlatformUser::new(42, "Ana"));
        assert_eq!(fields.display_name.as_deref(), Some("Ana"));
        assert_eq!(fields.platform_user_id, Some(42));
        assert_eq!(fields.premium_flag, Some(false));
    }

    #[test]
    fn merge_keeps_fields_absent_from_the_write() {
        let existing = ProfileFields {
            display_name: Some("Ana".to_string()),
            platform_user_id: Some(42),
            premium_flag: Some(true),
        };
        let write = ProfileFields {
            display_name: Some("Ana Maria".to_string()),
            ..ProfileFields::default()
        };

        let merged = write.merged_over(&existing);
        assert_eq!(merged.display_name.as_deref(), Some("Ana Maria"));
        assert_eq!(merged.platform_user_id, Some(42));
        assert_eq!(merged.premium_flag, Some(true));
    }

    #[test]
    fn merge_is_idempotent_for_identical_writes() {
        let write = ProfileFields::for_new_user(&PlatformUser::new(42, "Ana"));
        let once = write.merged_over(&ProfileFields::default());
        let twice = write.merged_over(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn profile_record_requires_name_and_platform_id() {
        let partial = ProfileFields {
            premium_flag: Some(true),
            ..ProfileFields::default()
        };
        assert!(ProfileRecord::from_fields("42", &partial).is_none());

        let fields = ProfileFields {
            display_name: Some("Ana".to_string()),
            platform_user_id: Some(42),
            premium_flag: None,
        };
        let record = ProfileRecord::from_fields("42", &fields).unwrap();
        assert_eq!(record.identity_key, "42");
        assert!(!record.premium_flag);
    }

    #[test]
    fn reply_constructors() {
        assert_eq!(Reply::text("hola").button, None);

        let reply = Reply::with_button("play", "Jugar ahora", DEFAULT_GAME_URL);
        let button = reply.button.unwrap();
        assert_eq!(button.label, "Jugar ahora");
        assert_eq!(button.target_url, DEFAULT_GAME_URL);
    }

    #[test]
    fn expand_env_vars_blanks_unset_variables() {
        let expanded = expand_env_vars("token=${HEROES_COMMON_TEST_UNSET_VARIABLE};");
        assert_eq!(expanded, "token=;");
        assert_eq!(expand_env_vars("no placeholders"), "no placeholders");
    }
}
