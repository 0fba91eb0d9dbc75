//! Statically compiled table of dialect variants
//!
//! Dialects are resolved once per configured data source, either by name or
//! from the connection URL's subprotocol, and the returned `Arc` is cached by
//! the caller.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::config::DialectConfig;
use crate::dialect::{
    DatabaseDialect, GenericDialect, MySqlDialect, OracleDialect, PostgresDialect,
    SqlServerDialect,
};
use crate::error::{Error, Result};

/// Constructor of one dialect variant
pub type DialectFactory = fn(DialectConfig) -> Arc<dyn DatabaseDialect>;

/// Registration entry for one dialect variant
#[derive(Debug, Clone, Copy)]
pub struct DialectProvider {
    /// Canonical dialect name
    pub name: &'static str,
    /// Additional names accepted case-insensitively
    pub aliases: &'static [&'static str],
    /// URL subprotocols served by this dialect
    pub subprotocols: &'static [&'static str],
    /// Constructor
    pub create: DialectFactory,
}

fn generic(config: DialectConfig) -> Arc<dyn DatabaseDialect> {
    Arc::new(GenericDialect::new(config))
}

fn postgres(config: DialectConfig) -> Arc<dyn DatabaseDialect> {
    Arc::new(PostgresDialect::new(config))
}

fn mysql(config: DialectConfig) -> Arc<dyn DatabaseDialect> {
    Arc::new(MySqlDialect::new(config))
}

fn sqlserver(config: DialectConfig) -> Arc<dyn DatabaseDialect> {
    Arc::new(SqlServerDialect::new(config))
}

fn oracle(config: DialectConfig) -> Arc<dyn DatabaseDialect> {
    Arc::new(OracleDialect::new(config))
}

/// Built-in dialect variants
pub const BUILTIN_PROVIDERS: [DialectProvider; 5] = [
    DialectProvider {
        name: GenericDialect::NAME,
        aliases: &["ansi"],
        subprotocols: &[],
        create: generic,
    },
    DialectProvider {
        name: PostgresDialect::NAME,
        aliases: &["postgres", "postgresql", "pg"],
        subprotocols: &["postgresql", "postgres", "pgsql"],
        create: postgres,
    },
    DialectProvider {
        name: MySqlDialect::NAME,
        aliases: &["mariadb"],
        subprotocols: &["mysql", "mariadb"],
        create: mysql,
    },
    DialectProvider {
        name: SqlServerDialect::NAME,
        aliases: &["mssql", "sql server", "sql_server"],
        subprotocols: &["sqlserver", "mssql", "jtds"],
        create: sqlserver,
    },
    DialectProvider {
        name: OracleDialect::NAME,
        aliases: &[],
        subprotocols: &["oracle"],
        create: oracle,
    },
];

static REGISTRY: OnceLock<DialectRegistry> = OnceLock::new();

/// Lookup of dialect providers by name and URL subprotocol
#[derive(Debug)]
pub struct DialectRegistry {
    providers: Vec<DialectProvider>,
    by_name: HashMap<String, usize>,
    by_subprotocol: HashMap<String, usize>,
    fallback: Option<usize>,
}

impl DialectRegistry {
    /// Process-wide registry of the built-in dialects
    pub fn global() -> &'static DialectRegistry {
        REGISTRY.get_or_init(|| Self::with_providers(BUILTIN_PROVIDERS))
    }

    /// Registry over an explicit provider list.
    ///
    /// Later providers win on name or subprotocol clashes. The provider named
    /// `Generic`, if present, is the fallback for unrecognized URLs.
    pub fn with_providers(providers: impl IntoIterator<Item = DialectProvider>) -> Self {
        let providers: Vec<DialectProvider> = providers.into_iter().collect();
        let mut by_name = HashMap::new();
        let mut by_subprotocol = HashMap::new();
        let mut fallback = None;
        for (i, provider) in providers.iter().enumerate() {
            by_name.insert(provider.name.to_lowercase(), i);
            for alias in provider.aliases {
                by_name.insert(alias.to_lowercase(), i);
            }
            for sub in provider.subprotocols {
                by_subprotocol.insert(sub.to_lowercase(), i);
            }
            if provider.name == GenericDialect::NAME {
                fallback = Some(i);
            }
        }
        Self {
            providers,
            by_name,
            by_subprotocol,
            fallback,
        }
    }

    /// Canonical names of registered dialects
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.iter().map(|p| p.name)
    }

    /// Build the dialect registered under `name` (or an alias)
    pub fn find_by_name(&self, name: &str, config: DialectConfig) -> Result<Arc<dyn DatabaseDialect>> {
        let provider = self
            .by_name
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.providers[i])
            .ok_or_else(|| {
                Error::config(format!(
                    "unknown dialect '{}'; available: {}",
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            })?;
        debug!("Using dialect {} for name '{}'", provider.name, name);
        Ok((provider.create)(config))
    }

    /// Build the dialect serving the subprotocol of `config.url`
    pub fn find_for_url(&self, config: DialectConfig) -> Result<Arc<dyn DatabaseDialect>> {
        let sub = subprotocol(&config.url);
        if let Some(provider) = sub
            .as_deref()
            .and_then(|s| self.by_subprotocol.get(s))
            .map(|&i| &self.providers[i])
        {
            debug!("Using dialect {} for subprotocol {:?}", provider.name, sub);
            return Ok((provider.create)(config));
        }
        let fallback = self
            .fallback
            .map(|i| &self.providers[i])
            .ok_or_else(|| Error::config("no dialect matches the URL and no generic fallback is registered"))?;
        info!(
            "No dialect registered for subprotocol {:?}; using {}",
            sub, fallback.name
        );
        Ok((fallback.create)(config))
    }

    /// Validate `config` and build the dialect it names, or the one its URL implies
    pub fn resolve(&self, config: DialectConfig) -> Result<Arc<dyn DatabaseDialect>> {
        config.check()?;
        match config.dialect.clone() {
            Some(name) => self.find_by_name(&name, config),
            None => self.find_for_url(config),
        }
    }
}

/// Resolve a dialect through the global registry
pub fn resolve(config: DialectConfig) -> Result<Arc<dyn DatabaseDialect>> {
    DialectRegistry::global().resolve(config)
}

/// Subprotocol of a connection URL, lower-cased.
///
/// `jdbc:oracle:thin:@host` yields `oracle`, `postgres://host/db` yields
/// `postgres`.
pub fn subprotocol(url: &str) -> Option<String> {
    let url = url.trim();
    let sub = match url.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("jdbc:") => url[5..].split(':').next(),
        _ => url.split_once("://").map(|(scheme, _)| scheme),
    }?;
    let sub = sub.trim().to_lowercase();
    (!sub.is_empty()).then_some(sub)
}
