pub mod alerts;
pub mod domain;
pub mod export;
pub mod html;
pub mod sentiment;
pub mod storage;

#[cfg(test)]
mod test_http;

pub mod config {
    use anyhow::Context;

    const DEFAULT_DATABASE_URL: &str = "sqlite://sentiment_data.db";
    const DEFAULT_ALERTS_FILE: &str = "sentiment_alerts.json";
    const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
    const DEFAULT_SMTP_PORT: u16 = 587;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: String,
        pub alerts_file: String,
        pub export_dir: String,
        pub newsapi_key: Option<String>,
        pub finnhub_key: Option<String>,
        pub twitter_bearer_token: Option<String>,
        pub smtp: SmtpSettings,
        pub sentry_dsn: Option<String>,
    }

    #[derive(Debug, Clone)]
    pub struct SmtpSettings {
        pub server: String,
        pub port: u16,
        pub user: Option<String>,
        pub password: Option<String>,
        pub from_email: Option<String>,
    }

    impl SmtpSettings {
        /// Credentials are required before any email is attempted.
        pub fn credentials(&self) -> Option<(&str, &str)> {
            match (self.user.as_deref(), self.password.as_deref()) {
                (Some(user), Some(password)) => Some((user, password)),
                _ => None,
            }
        }

        pub fn sender(&self) -> Option<&str> {
            self.from_email.as_deref().or(self.user.as_deref())
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let port = match non_empty_var("SMTP_PORT") {
                Some(s) => s
                    .parse::<u16>()
                    .with_context(|| format!("SMTP_PORT is not a valid port: {s}"))?,
                None => DEFAULT_SMTP_PORT,
            };

            Ok(Self {
                database_url: non_empty_var("DATABASE_URL")
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                alerts_file: non_empty_var("ALERTS_FILE")
                    .unwrap_or_else(|| DEFAULT_ALERTS_FILE.to_string()),
                export_dir: non_empty_var("EXPORT_DIR").unwrap_or_else(|| ".".to_string()),
                newsapi_key: api_key_var("NEWSAPI_KEY"),
                finnhub_key: api_key_var("FINNHUB_KEY"),
                twitter_bearer_token: api_key_var("TWITTER_BEARER_TOKEN"),
                smtp: SmtpSettings {
                    server: non_empty_var("SMTP_SERVER")
                        .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
                    port,
                    user: non_empty_var("EMAIL_USER"),
                    password: non_empty_var("EMAIL_PASSWORD"),
                    from_email: non_empty_var("FROM_EMAIL"),
                },
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }
    }

    fn non_empty_var(name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    // Placeholder keys copied from .env templates ("your_newsapi_key_here") are not keys.
    fn api_key_var(name: &str) -> Option<String> {
        non_empty_var(name).filter(|s| !is_placeholder_key(s))
    }

    pub fn is_placeholder_key(value: &str) -> bool {
        let lower = value.to_ascii_lowercase();
        lower.starts_with("your_") && lower.ends_with("_here")
    }

}
