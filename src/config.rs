use anyhow::{Context, Result};
use clap::Parser;

/// Lending MCP bridge - exposes the lending API as MCP tools over stdio
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Deployment environment name
    #[arg(long, env = "BATMC_ENV", default_value = "dev")]
    pub env: String,

    /// Lending API base URL
    #[arg(long, env = "BATMC_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Identity provider base URL
    #[arg(long, env = "BATMC_SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Identity provider anonymous key
    #[arg(long, env = "BATMC_SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_anon_key: Option<String>,

    /// Account email
    #[arg(long, env = "BATMC_USER_EMAIL")]
    pub user_email: Option<String>,

    /// Account password
    #[arg(long, env = "BATMC_USER_PASSWORD", hide_env_values = true)]
    pub user_password: Option<String>,

    /// Display name of the account owner
    #[arg(long, env = "BATMC_USER_NAME", default_value = "Chester")]
    pub user_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BATMC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "BATMC_HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub http_connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "BATMC_HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_request_timeout: u64,
}

#[derive(Clone)]
pub struct Config {
    pub env: String,

    // Lending API
    pub api_url: String,

    // Identity provider
    pub supabase_url: String,
    pub supabase_anon_key: String,

    // Account
    pub user_email: String,
    pub user_password: String,
    pub user_name: String,

    // Timeouts
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("env", &self.env)
            .field("api_url", &self.api_url)
            .field("supabase_url", &self.supabase_url)
            .field("user_email", &self.user_email)
            .field("user_name", &self.user_name)
            .field("http_connect_timeout", &self.http_connect_timeout)
            .field("http_request_timeout", &self.http_request_timeout)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        Ok(Config {
            env: args.env,
            api_url: trim_url(&args.api_url),
            supabase_url: args
                .supabase_url
                .map(|s| trim_url(&s))
                .context("BATMC_SUPABASE_URL is required (use --supabase-url or set the env var)")?,
            supabase_anon_key: args.supabase_anon_key.context(
                "BATMC_SUPABASE_ANON_KEY is required (use --supabase-anon-key or set the env var)",
            )?,
            user_email: args
                .user_email
                .context("BATMC_USER_EMAIL is required (use --user-email or set the env var)")?,
            user_password: args.user_password.context(
                "BATMC_USER_PASSWORD is required (use --user-password or set the env var)",
            )?,
            user_name: args.user_name,
            http_connect_timeout: args.http_connect_timeout,
            http_request_timeout: args.http_request_timeout,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("BATMC_SUPABASE_ANON_KEY", &self.supabase_anon_key),
            ("BATMC_USER_EMAIL", &self.user_email),
            ("BATMC_USER_PASSWORD", &self.user_password),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }

        for (name, url) in [
            ("BATMC_API_URL", &self.api_url),
            ("BATMC_SUPABASE_URL", &self.supabase_url),
        ] {
            if !is_http_url(url) {
                anyhow::bail!("{} must be an http(s) URL: {}", name, url);
            }
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
