use crate::error::AppError;

/// How the relay reaches the upstream chat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatServiceMode {
    /// POST to `chat_service_url` and relay its streamed body.
    Http,
    /// Local stand-in that streams a placeholder reply word by word.
    Echo,
}

impl std::str::FromStr for ChatServiceMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ChatServiceMode::Http),
            "echo" | "mock" => Ok(ChatServiceMode::Echo),
            other => Err(AppError::Config(format!(
                "Invalid CHAT_SERVICE_MODE: {} (expected http or echo)",
                other
            ))),
        }
    }
}

/// Longest session lifetime accepted from the environment.
pub const MAX_SESSION_EXPIRY_DAYS: i64 = 3650;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub chat_service_url: Option<String>,
    pub chat_service_mode: ChatServiceMode,
    pub upstream_connect_timeout_secs: u64,
    pub echo_chunk_delay_ms: u64,
    pub session_expiry_days: i64,
    pub session_cleanup_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub cookie_secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            chat_service_url: None,
            chat_service_mode: ChatServiceMode::Echo,
            upstream_connect_timeout_secs: 10,
            echo_chunk_delay_ms: 100,
            session_expiry_days: 30,
            session_cleanup_interval_secs: 3600,
            request_timeout_secs: 30,
            cookie_secure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Config::default();

        let chat_service_url = std::env::var("CHAT_SERVICE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        // An explicit mode wins; otherwise a configured URL means http.
        let chat_service_mode = match std::env::var("CHAT_SERVICE_MODE") {
            Ok(mode) => mode.parse()?,
            Err(_) if chat_service_url.is_some() => ChatServiceMode::Http,
            Err(_) => ChatServiceMode::Echo,
        };

        if chat_service_mode == ChatServiceMode::Http && chat_service_url.is_none() {
            return Err(AppError::Config(
                "CHAT_SERVICE_MODE=http requires CHAT_SERVICE_URL".to_string(),
            ));
        }

        let config = Config {
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_var("SERVER_PORT", defaults.server_port)?,
            chat_service_url,
            chat_service_mode,
            upstream_connect_timeout_secs: parse_var(
                "UPSTREAM_CONNECT_TIMEOUT_SECS",
                defaults.upstream_connect_timeout_secs,
            )?,
            echo_chunk_delay_ms: parse_var("ECHO_CHUNK_DELAY_MS", defaults.echo_chunk_delay_ms)?,
            session_expiry_days: parse_var("SESSION_EXPIRY_DAYS", defaults.session_expiry_days)?,
            session_cleanup_interval_secs: parse_var(
                "SESSION_CLEANUP_INTERVAL_SECS",
                defaults.session_cleanup_interval_secs,
            )?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            cookie_secure: parse_var("COOKIE_SECURE", defaults.cookie_secure)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server would otherwise trip over at runtime.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_SESSION_EXPIRY_DAYS).contains(&self.session_expiry_days) {
            return Err(AppError::Config(format!(
                "SESSION_EXPIRY_DAYS must be between 1 and {}, got {}",
                MAX_SESSION_EXPIRY_DAYS, self.session_expiry_days
            )));
        }
        if self.session_cleanup_interval_secs == 0 {
            return Err(AppError::Config(
                "SESSION_CLEANUP_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Cookie lifetime, which matches the session lifetime.
    pub fn session_max_age_secs(&self) -> i64 {
        self.session_expiry_days * 24 * 60 * 60
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("http".parse::<ChatServiceMode>().unwrap(), ChatServiceMode::Http);
        assert_eq!(" Echo ".parse::<ChatServiceMode>().unwrap(), ChatServiceMode::Echo);
        assert!("carrier-pigeon".parse::<ChatServiceMode>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server_address(), "127.0.0.1:3000");
        assert_eq!(config.session_max_age_secs(), 60 * 60 * 24 * 30);
        assert_eq!(config.chat_service_mode, ChatServiceMode::Echo);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_lifetime_is_bounded() {
        for days in [0, -1, MAX_SESSION_EXPIRY_DAYS + 1, i64::MAX] {
            let config = Config {
                session_expiry_days: days,
                ..Config::default()
            };
            assert!(matches!(config.validate(), Err(AppError::Config(_))), "{} accepted", days);
        }

        let longest = Config {
            session_expiry_days: MAX_SESSION_EXPIRY_DAYS,
            ..Config::default()
        };
        assert!(longest.validate().is_ok());
        assert!(longest.session_max_age_secs() > 0);
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let config = Config {
            session_cleanup_interval_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
