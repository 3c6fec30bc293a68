//! Configuration loading
//!
//! Hosts load a [`FaultlineConfig`] from environment variables and hand it to
//! [`Reporter::from_config`](crate::report::Reporter::from_config) and the
//! error page middleware. The core library never reads the environment on
//! its own.
//!
//! | Variable                   | Meaning                                     | Default       |
//! |----------------------------|---------------------------------------------|---------------|
//! | `{prefix}ENV`              | `production` hides error details            | `development` |
//! | `{prefix}DSN`              | Sentry DSN; unset discards reports          | unset         |
//! | `{prefix}APP_PREFIXES`     | Comma separated in-app module/file prefixes | empty         |
//! | `{prefix}PANICS_ONLY`      | Report panics but not handler errors        | `false`       |
//! | `{prefix}SCRUB_HEADERS`    | Drop sensitive headers from reports         | `true`        |
//! | `{prefix}RELEASE`          | Release tag attached to reports             | unset         |

pub mod env;

use crate::render::Environment;
use crate::report::transport::Dsn;
use crate::Result;

pub use env::EnvReader;

/// Default environment variable prefix
pub const DEFAULT_PREFIX: &str = "FAULTLINE_";

/// Trait for configuration types that load from the environment
///
/// # Example
///
/// ```rust,ignore
/// let config = FaultlineConfig::load(DEFAULT_PREFIX)?;
/// ```
pub trait ConfigBuilder: Sized + Default {
    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load configuration from environment variables under `prefix`
    fn from_env(prefix: &str) -> Result<Self>;

    /// Merge `other` into this configuration
    ///
    /// Scalar fields are taken from `other`, optional fields only when set,
    /// and lists are extended.
    fn merge(&mut self, other: Self) -> &mut Self;

    /// Load from the environment and validate
    fn load(prefix: &str) -> Result<Self> {
        let config = Self::from_env(prefix)?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for error pages and reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultlineConfig {
    pub environment: Environment,
    pub dsn: Option<String>,
    pub app_prefixes: Vec<String>,
    pub panics_only: bool,
    pub scrub_headers: bool,
    pub release: Option<String>,
}

impl Default for FaultlineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            dsn: None,
            app_prefixes: Vec::new(),
            panics_only: false,
            scrub_headers: true,
            release: None,
        }
    }
}

impl ConfigBuilder for FaultlineConfig {
    fn validate(&self) -> Result<()> {
        if let Some(dsn) = &self.dsn {
            Dsn::parse(dsn)?;
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        let env = EnvReader::new(prefix);

        Ok(Self {
            environment: env
                .string("env")?
                .map(|name| Environment::from_name(&name))
                .unwrap_or(defaults.environment),
            dsn: env.string("dsn")?,
            app_prefixes: env.list("app_prefixes")?,
            panics_only: env.flag("panics_only")?.unwrap_or(defaults.panics_only),
            scrub_headers: env.flag("scrub_headers")?.unwrap_or(defaults.scrub_headers),
            release: env.string("release")?,
        })
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        self.environment = other.environment;
        if other.dsn.is_some() {
            self.dsn = other.dsn;
        }
        self.app_prefixes.extend(other.app_prefixes);
        self.panics_only = other.panics_only;
        self.scrub_headers = other.scrub_headers;
        if other.release.is_some() {
            self.release = other.release;
        }
        self
    }
}
