//! Credentials demanded from ONVIF clients of the emulated cameras

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct OnvifAuthConfig {
    pub username: String,
    pub password: String,
}

impl OnvifAuthConfig {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

// Keep the password out of logs
impl std::fmt::Debug for OnvifAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnvifAuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
