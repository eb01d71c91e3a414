use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's stored credential for one provider. Unique per (user, provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProviderSetting {
    pub id: String,
    pub user_id: String,
    pub provider_id: String,
    /// Sealed key material; never the plaintext key
    pub api_key_encrypted: Option<String>,
    pub api_base_override: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProviderSetting {
    pub fn new(user_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            provider_id: provider_id.into(),
            api_key_encrypted: None,
            api_base_override: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_encrypted_key(mut self, sealed: impl Into<String>) -> Self {
        self.api_key_encrypted = Some(sealed.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key_encrypted.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Active with a non-empty key. Missing and inactive settings are treated alike.
    pub fn is_usable(&self) -> bool {
        self.is_active && self.has_api_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usability_rule() {
        let setting = UserProviderSetting::new("u1", "p1");
        assert!(!setting.is_usable());

        let setting = setting.with_encrypted_key("");
        assert!(!setting.is_usable());

        let mut setting = setting.with_encrypted_key("sealed");
        assert!(setting.is_usable());

        setting.is_active = false;
        assert!(!setting.is_usable());
        assert!(setting.has_api_key());
    }
}
