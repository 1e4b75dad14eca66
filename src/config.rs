use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::errors::AuditError;

/// Default location of the Magento deployment configuration, relative to the
/// Magento root.
pub const DEFAULT_ENV_PHP: &str = "app/etc/env.php";

/// `'key' => 'value'` at the start of an array item.
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    MySql,
    Postgres,
}

impl Driver {
    fn scheme(self) -> &'static str {
        match self {
            Driver::MySql => "mysql",
            Driver::Postgres => "postgres",
        }
    }

    fn parse(name: &str) -> Result<Self, AuditError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Driver::MySql),
            "postgres" | "postgresql" => Ok(Driver::Postgres),
            other => Err(AuditError::Config(format!(
                "Unsupported database driver '{}' (expected mysql or postgres)",
                other
            ))),
        }
    }
}

/// Where the connection settings were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    DatabaseUrl,
    Environment,
    EnvPhp(String),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::DatabaseUrl => write!(f, "DATABASE_URL"),
            ConfigSource::Environment => write!(f, "DB_* environment variables"),
            ConfigSource::EnvPhp(path) => write!(f, "{}", path),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub driver: Driver,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    pub password: String,
    pub source: ConfigSource,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl Config {
    /// Resolves connection settings: `DATABASE_URL`, then `DB_*` variables,
    /// then the Magento `env.php` at `env_php`.
    pub fn load(env_php: &Path) -> Result<Self, AuditError> {
        dotenvy::dotenv().ok();

        let config = Self::resolve(env_php, |name| std::env::var(name).ok())?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded from {}", config.source);
        tracing::debug!(
            "Target: {:?} {}@{}:{}/{}",
            config.driver,
            config.username,
            config.host,
            config.port.map(|p| p.to_string()).unwrap_or_default(),
            config.database
        );

        Ok(config)
    }

    /// Source selection behind [`Config::load`], reading variables through
    /// `lookup`.
    fn resolve<F>(env_php: &Path, lookup: F) -> Result<Self, AuditError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty(&lookup, "DATABASE_URL") {
            Self::from_url(&url)
        } else if non_empty(&lookup, "DB_HOST").is_some() {
            Self::from_lookup(lookup)
        } else if env_php.exists() {
            Self::from_env_php(env_php)
        } else {
            Err(AuditError::Config(format!(
                "No database configuration found. Set DATABASE_URL or DB_HOST/DB_NAME/DB_USER/DB_PASSWORD, \
                 or run from the Magento root so that {} can be read",
                env_php.display()
            )))
        }
    }

    /// Parses a `mysql://` or `postgres://` connection URL.
    pub fn from_url(raw: &str) -> Result<Self, AuditError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| AuditError::Config(format!("DATABASE_URL is not a valid URL: {}", e)))?;

        let driver = match url.scheme() {
            "mysql" | "mariadb" => Driver::MySql,
            "postgres" | "postgresql" => Driver::Postgres,
            other => {
                return Err(AuditError::Config(format!(
                    "DATABASE_URL must start with mysql:// or postgres:// (got {}://)",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AuditError::Config("DATABASE_URL is missing a host".to_string()))?
            .to_string();
        let database = url.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(AuditError::Config(
                "DATABASE_URL is missing a database name".to_string(),
            ));
        }
        if url.username().is_empty() {
            return Err(AuditError::Config(
                "DATABASE_URL is missing a username".to_string(),
            ));
        }

        Ok(Self {
            driver,
            host,
            port: url.port(),
            database: decode(&database)?,
            username: decode(url.username())?,
            password: url.password().map(decode).transpose()?.unwrap_or_default(),
            source: ConfigSource::DatabaseUrl,
        })
    }

    /// Reads `DB_HOST`, `DB_NAME`, `DB_USER`, `DB_PASSWORD` and the optional
    /// `DB_PORT` / `DB_DRIVER`.
    fn from_lookup<F>(lookup: F) -> Result<Self, AuditError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            non_empty(&lookup, name).ok_or_else(|| {
                AuditError::Config(format!("{} environment variable required", name))
            })
        };

        let driver = match non_empty(&lookup, "DB_DRIVER") {
            Some(name) => Driver::parse(&name)?,
            None => Driver::MySql,
        };
        let port = non_empty(&lookup, "DB_PORT")
            .map(|p| {
                p.trim().parse::<u16>().map_err(|_| {
                    AuditError::Config("DB_PORT must be a valid number between 1-65535".to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            driver,
            host: required("DB_HOST")?,
            port,
            database: required("DB_NAME")?,
            username: required("DB_USER")?,
            // An empty password is a legitimate setting for local databases.
            password: lookup("DB_PASSWORD").ok_or_else(|| {
                AuditError::Config("DB_PASSWORD environment variable required".to_string())
            })?,
            source: ConfigSource::Environment,
        })
    }

    /// Reads the default connection of a Magento `app/etc/env.php`.
    pub fn from_env_php(path: &Path) -> Result<Self, AuditError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("Could not read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse_env_php(&contents)?;
        config.source = ConfigSource::EnvPhp(path.display().to_string());
        Ok(config)
    }

    fn parse_env_php(contents: &str) -> Result<Self, AuditError> {
        let missing_block =
            || AuditError::Config("Database configuration not found in env.php".to_string());

        let block = find_array_after(contents, &["db", "connection", "default"])
            .ok_or_else(missing_block)?;
        let entries = top_level_strings(block);
        let field = |key: &str| -> Option<String> {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let required = |key: &str| {
            field(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                AuditError::Config(format!(
                    "env.php database connection is missing '{}'",
                    key
                ))
            })
        };

        let raw_host = required("host")?;
        let (host, port) = split_host_port(&raw_host)?;

        Ok(Self {
            driver: Driver::MySql,
            host,
            port,
            database: required("dbname")?,
            username: required("username")?,
            password: field("password").ok_or_else(|| {
                AuditError::Config("env.php database connection is missing 'password'".to_string())
            })?,
            source: ConfigSource::EnvPhp(DEFAULT_ENV_PHP.to_string()),
        })
    }

    /// Connection URL with percent-encoded credentials.
    pub fn connection_url(&self) -> Result<String, AuditError> {
        let invalid = |what: &str| AuditError::Config(format!("Invalid database {}", what));

        let mut url = Url::parse(&format!("{}://localhost/", self.driver.scheme()))
            .map_err(|_| invalid("driver"))?;
        url.set_host(Some(&self.host)).map_err(|_| invalid("host"))?;
        url.set_port(self.port).map_err(|_| invalid("port"))?;
        // `set_username`/`set_password` leave `%` unescaped.
        url.set_username(&urlencoding::encode(&self.username))
            .map_err(|_| invalid("username"))?;
        if !self.password.is_empty() {
            url.set_password(Some(&urlencoding::encode(&self.password)))
                .map_err(|_| invalid("password"))?;
        }
        url.path_segments_mut()
            .map_err(|_| invalid("name"))?
            .pop_if_empty()
            .push(&self.database);
        Ok(url.into())
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn decode(raw: &str) -> Result<String, AuditError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| AuditError::Config(format!("DATABASE_URL is not valid UTF-8: {}", e)))
}

fn split_host_port(raw: &str) -> Result<(String, Option<u16>), AuditError> {
    match raw.rsplit_once(':') {
        // Unix socket paths and bare IPv6 addresses are passed through as-is.
        Some((host, port)) if !host.contains(':') && !raw.starts_with('/') => {
            let port = port.parse::<u16>().map_err(|_| {
                AuditError::Config(format!("Invalid port in env.php host '{}'", raw))
            })?;
            Ok((host.to_string(), Some(port)))
        }
        _ => Ok((raw.to_string(), None)),
    }
}

/// Follows a chain of `'key' => [ ... ]` nestings and returns the body of the
/// innermost array.
fn find_array_after<'a>(contents: &'a str, path: &[&str]) -> Option<&'a str> {
    let mut scope = contents;
    for key in path {
        let pattern = format!(r#"['"]{}['"]\s*=>\s*(\[|array\s*\()"#, regex::escape(key));
        let re = Regex::new(&pattern).ok()?;
        let m = re.captures(scope)?;
        let open = m.get(1)?;
        let close = if open.as_str() == "[" { ']' } else { ')' };
        let body_start = open.end();
        let body_len = matching_close(&scope[body_start..], close)?;
        scope = &scope[body_start..body_start + body_len];
    }
    Some(scope)
}

/// Byte offset of the bracket closing the array whose body starts at `body`.
fn matching_close(body: &str, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => depth -= 1,
            c if c == close => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Top-level `'key' => 'value'` pairs of an array body; nested arrays are
/// skipped.
fn top_level_strings(body: &str) -> Vec<(String, String)> {
    let re = ENTRY_RE.get_or_init(|| {
        Regex::new(r#"^\s*['"](\w+)['"]\s*=>\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#)
            .expect("valid regex")
    });

    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut item_start = 0usize;

    let flush = |item: &str, entries: &mut Vec<(String, String)>| {
        if let Some(caps) = re.captures(item) {
            let value = match (caps.get(2), caps.get(3)) {
                (Some(single), _) => unescape(single.as_str(), '\''),
                (None, Some(double)) => unescape(double.as_str(), '"'),
                (None, None) => String::new(),
            };
            entries.push((caps[1].to_string(), value));
        }
    };

    for (idx, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                flush(&body[item_start..idx], &mut entries);
                item_start = idx + 1;
            }
            _ => {}
        }
    }
    flush(&body[item_start..], &mut entries);
    entries
}

/// PHP string unescaping. Single-quoted strings only escape `\'` and `\\`;
/// any other backslash is literal.
fn unescape(raw: &str, quote: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(next) if quote == '"' || next == quote || next == '\\' => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}
