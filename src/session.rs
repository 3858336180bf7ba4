use crate::config::Config;

/// Login state of the connected shell. Record operations require `LoggedIn`.
/// This is a presence gate for the staff screen, not an access-control layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    LoggedOut,
    LoggedIn {
        user: String,
    },
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Session::LoggedIn { .. })
    }

    /// Both values must be non-empty; when the admin pair is configured they
    /// must also match it. A failed attempt leaves the session unchanged.
    pub fn login(&mut self, config: &Config, user: &str, password: &str) -> Result<(), String> {
        let user = user.trim();
        if user.is_empty() || password.is_empty() {
            return Err("user and password are required".to_string());
        }
        if let Some(expected) = &config.admin_user {
            if expected != user {
                return Err("invalid user or password".to_string());
            }
        }
        if let Some(expected) = &config.admin_password {
            if expected != password {
                return Err("invalid user or password".to_string());
            }
        }
        *self = Session::LoggedIn {
            user: user.to_string(),
        };
        Ok(())
    }

    pub fn logout(&mut self) {
        *self = Session::LoggedOut;
    }
}
