use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionLinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Load(#[from] config::ConfigError),

    #[error(
        "session backend required: set SESSION_USE_MEMORY=true for local dev, \
         or SESSION_SERVICE_URL for session service (e.g. http://localhost:8081)"
    )]
    NoSessionBackend,
}

/// Errors raised by a session backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session service error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid session service URL: {0}")]
    InvalidUrl(String),

    #[error("session must have {0}")]
    MissingIdentity(&'static str),

    #[error("Session not found: {app_name}/{user_id}/{session_id}")]
    NotFound {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    #[error("Session already exists: {app_name}/{user_id}/{session_id}")]
    AlreadyExists {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    #[error("Invalid payload from session service: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// HTTP status this error corresponds to, when it has one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Api { code, .. } => Some(*code),
            StoreError::NotFound { .. } => Some(404),
            StoreError::AlreadyExists { .. } => Some(409),
            StoreError::MissingIdentity(_) => Some(400),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_404_is_not_found() {
        let err = StoreError::Api {
            code: 404,
            message: "no such session".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Session service error (404): no such session");
    }

    #[test]
    fn test_local_errors_map_to_status() {
        let missing = StoreError::NotFound {
            app_name: "a".to_string(),
            user_id: "u".to_string(),
            session_id: "s".to_string(),
        };
        assert!(missing.is_not_found());
        assert_eq!(StoreError::MissingIdentity("user_id").status(), Some(400));
        assert_eq!(StoreError::InvalidUrl("x".to_string()).status(), None);
    }

    #[test]
    fn test_missing_backend_message_names_both_settings() {
        let err = SessionLinkError::from(ConfigError::NoSessionBackend);
        let message = err.to_string();
        assert!(message.starts_with("session backend required"));
        assert!(message.contains("SESSION_USE_MEMORY=true"));
        assert!(message.contains("SESSION_SERVICE_URL"));
    }
}
