use serde::{Deserialize, Serialize};

/// Verified claims from a bearer token. This is a closed structure: fields
/// are typed and validated once at the authentication boundary, and nothing
/// downstream re-inspects the raw token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable external subject id, distinct from the internal user id.
    pub sub: String,
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Claims {
    /// Display name for directory sync, falling back to the subject id when
    /// the provider sends no profile claims.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.sub)
    }

    pub fn email_or_empty(&self) -> &str {
        self.email.as_deref().unwrap_or("")
    }
}

/// The `aud` claim arrives as either a single string or an array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(a) => a == audience,
            Audience::Many(all) => all.iter().any(|a| a == audience),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_accepts_string_or_array() {
        let one: Claims =
            serde_json::from_value(serde_json::json!({
                "sub": "auth0|abc", "iss": "https://id.example.com/",
                "aud": "coursebook", "exp": 4102444800i64
            }))
            .unwrap();
        assert!(one.aud.contains("coursebook"));

        let many: Claims =
            serde_json::from_value(serde_json::json!({
                "sub": "auth0|abc", "iss": "https://id.example.com/",
                "aud": ["other", "coursebook"], "exp": 4102444800i64
            }))
            .unwrap();
        assert!(many.aud.contains("coursebook"));
        assert!(!many.aud.contains("missing"));
    }

    #[test]
    fn display_name_falls_back_to_subject() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "auth0|abc", "iss": "i", "aud": "a", "exp": 0
        }))
        .unwrap();
        assert_eq!(claims.display_name(), "auth0|abc");
        assert_eq!(claims.email_or_empty(), "");
    }
}
