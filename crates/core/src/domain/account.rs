use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Suppression length used when the stored value cannot be interpreted.
pub const DEFAULT_SUPPRESSION_MINUTES: i64 = 10;
/// Longest suppression a stored value may request (one week).
pub const MAX_SUPPRESSION_MINUTES: i64 = 7 * 24 * 60;

const SUPPRESSION_DISABLED: &str = "none";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub String);

impl PersonId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

/// Owner-chosen cooldown after an auto-response. The raw stored text is kept so
/// that a malformed value degrades to the default window instead of failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuppressionSetting {
    Disabled,
    Minutes(String),
}

impl SuppressionSetting {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(SUPPRESSION_DISABLED) {
            Self::Disabled
        } else {
            Self::Minutes(trimmed.to_owned())
        }
    }

    pub fn as_stored(&self) -> &str {
        match self {
            Self::Disabled => SUPPRESSION_DISABLED,
            Self::Minutes(raw) => raw,
        }
    }

    /// Window length in minutes, or `None` when suppression is switched off.
    pub fn window_minutes(&self) -> Option<i64> {
        match self {
            Self::Disabled => None,
            Self::Minutes(raw) => Some(
                raw.parse::<i64>()
                    .ok()
                    .filter(|minutes| (1..=MAX_SUPPRESSION_MINUTES).contains(minutes))
                    .unwrap_or(DEFAULT_SUPPRESSION_MINUTES),
            ),
        }
    }
}

impl Default for SuppressionSetting {
    fn default() -> Self {
        Self::Minutes(DEFAULT_SUPPRESSION_MINUTES.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct UserConfig {
    pub id: PersonId,
    pub tokens: TokenPair,
    pub primary_id: Option<PersonId>,
    pub primary_email: String,
    pub primary_enabled: bool,
    pub auto_response: String,
    pub mention_all_enabled: bool,
    pub suppression: SuppressionSetting,
    pub response_enabled: bool,
}

impl UserConfig {
    /// Record for an account that just completed authorization for the first time.
    pub fn onboarded(id: PersonId, tokens: TokenPair) -> Self {
        Self {
            id,
            tokens,
            primary_id: None,
            primary_email: String::new(),
            primary_enabled: false,
            auto_response: String::new(),
            mention_all_enabled: true,
            suppression: SuppressionSetting::default(),
            response_enabled: false,
        }
    }

    /// Replaces both tokens and leaves every setting untouched.
    pub fn with_tokens(mut self, tokens: TokenPair) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn can_send_test(&self) -> bool {
        self.primary_id.is_some() && !self.auto_response.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::{PersonId, SuppressionSetting, TokenPair, UserConfig, DEFAULT_SUPPRESSION_MINUTES};

    fn tokens(access: &str, refresh: &str) -> TokenPair {
        TokenPair { access_token: access.to_owned().into(), refresh_token: refresh.to_owned().into() }
    }

    #[test]
    fn suppression_none_sentinel_is_case_insensitive() {
        assert_eq!(SuppressionSetting::parse("None"), SuppressionSetting::Disabled);
        assert_eq!(SuppressionSetting::parse(" none "), SuppressionSetting::Disabled);
        assert_eq!(SuppressionSetting::Disabled.window_minutes(), None);
    }

    #[test]
    fn suppression_falls_back_to_default_for_garbage_or_out_of_range() {
        assert_eq!(SuppressionSetting::parse("15").window_minutes(), Some(15));
        assert_eq!(
            SuppressionSetting::parse("soon").window_minutes(),
            Some(DEFAULT_SUPPRESSION_MINUTES)
        );
        assert_eq!(SuppressionSetting::parse("0").window_minutes(), Some(DEFAULT_SUPPRESSION_MINUTES));
        assert_eq!(
            SuppressionSetting::parse("-5").window_minutes(),
            Some(DEFAULT_SUPPRESSION_MINUTES)
        );
        assert_eq!(
            SuppressionSetting::parse("999999").window_minutes(),
            Some(DEFAULT_SUPPRESSION_MINUTES)
        );
    }

    #[test]
    fn with_tokens_preserves_settings() {
        let mut account = UserConfig::onboarded(PersonId::new("P-1"), tokens("a1", "r1"));
        account.auto_response = "out of office".to_owned();
        account.primary_id = Some(PersonId::new("P-9"));
        account.response_enabled = true;

        let refreshed = account.with_tokens(tokens("a2", "r2"));

        assert_eq!(refreshed.tokens.access_token.expose_secret(), "a2");
        assert_eq!(refreshed.tokens.refresh_token.expose_secret(), "r2");
        assert_eq!(refreshed.auto_response, "out of office");
        assert_eq!(refreshed.primary_id, Some(PersonId::new("P-9")));
        assert!(refreshed.response_enabled);
    }

    #[test]
    fn onboarded_defaults_match_first_login() {
        let account = UserConfig::onboarded(PersonId::new("P-1"), tokens("a", "r"));
        assert!(account.mention_all_enabled);
        assert!(!account.response_enabled);
        assert!(!account.primary_enabled);
        assert_eq!(account.suppression.as_stored(), "10");
        assert!(!account.can_send_test());
    }
}
