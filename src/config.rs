use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. This struct is designed to be
/// immutable once loaded, ensuring consistency across all threads and services
/// (session store, repository, router). It is carried inside the shared AppState
/// rather than read from ambient globals, so every handler receives its
/// configuration through explicit dependency injection.
#[derive(Clone)]
pub struct AppConfig {
    // Runtime environment marker. Controls log formatting and cookie hardening.
    pub env: Env,
    // Locale applied to anonymous visitors and freshly created sessions.
    pub default_locale: String,
    // The set of locales /set-language/{locale} will accept. Anything else is rejected.
    pub supported_locales: Vec<String>,
    // Lifetime of a server-side session, in minutes. Expired sessions are treated
    // as absent by the guard.
    pub session_ttl_minutes: i64,
}

/// Env
///
/// Defines the runtime context, used to switch between development conveniences
/// (pretty logs) and production-grade output (JSON logs, Secure cookies).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Provides a safe, non-panicking AppConfig instance primarily used for test setup.
    /// This allows tests to instantiate the configuration without touching
    /// environment variables.
    fn default() -> Self {
        Self {
            env: Env::Local,
            default_locale: "en".to_string(),
            supported_locales: vec!["en".to_string(), "fr".to_string(), "nl".to_string()],
            session_ttl_minutes: 120,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// The canonical function for initializing the application configuration at startup.
    /// It reads all parameters from environment variables and implements the fail-fast
    /// principle: a malformed value aborts startup instead of silently falling back.
    ///
    /// # Panics
    /// Panics if `SESSION_TTL_MINUTES` is set but not a positive integer. Missing
    /// variables fall back to the defaults above, which are safe in any environment.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let default_locale = env::var("APP_LOCALE").unwrap_or_else(|_| "en".to_string());

        // Comma-separated list, e.g. APP_LOCALES=en,fr,nl. The default locale is
        // always included so a misconfigured list cannot lock out every visitor.
        let mut supported_locales: Vec<String> = env::var("APP_LOCALES")
            .unwrap_or_else(|_| "en,fr,nl".to_string())
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if !supported_locales.contains(&default_locale) {
            supported_locales.push(default_locale.clone());
        }

        let session_ttl_minutes = env::var("SESSION_TTL_MINUTES")
            .map(|v| {
                v.parse::<i64>()
                    .expect("FATAL: SESSION_TTL_MINUTES must be a positive integer")
            })
            .unwrap_or(120);
        assert!(
            session_ttl_minutes > 0,
            "FATAL: SESSION_TTL_MINUTES must be a positive integer"
        );

        Self {
            env,
            default_locale,
            supported_locales,
            session_ttl_minutes,
        }
    }
}
