//! Tenant-scope push-down for shared-schema SQL stores.
//!
//! In a shared schema, all tenants live in the same tables and a tenant
//! column separates them. A SQL-backed [`RecordStore`](super::RecordStore)
//! uses [`SharedSchemaPushdown`] to turn the [`TenantScope`] of a
//! [`ScopedQuery`](super::ScopedQuery) into a server-side predicate, and
//! optionally into a row-level-security session setting.

use serde::{Deserialize, Serialize};

use super::TenantScope;
use crate::error::PushdownError;
use crate::tenant::TenantId;

/// Configuration for shared-schema push-down.
///
/// # Example
///
/// ```
/// use palisade_isolation::store::SharedSchemaConfig;
///
/// let config = SharedSchemaConfig {
///     use_row_level_security: true,
///     tenant_column: "org_id".to_string(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedSchemaConfig {
    /// Whether the database also enforces isolation with RLS policies.
    #[serde(default)]
    pub use_row_level_security: bool,

    /// The name of the tenant column in tables.
    #[serde(default = "default_tenant_column")]
    pub tenant_column: String,

    /// The session setting read by RLS policies.
    #[serde(default = "default_session_setting")]
    pub session_setting: String,

    /// Allowed characters in tenant IDs (regex pattern).
    #[serde(default = "default_tenant_id_pattern")]
    pub tenant_id_pattern: String,
}

fn default_tenant_column() -> String {
    "tenant_id".to_string()
}

fn default_session_setting() -> String {
    "app.current_tenant".to_string()
}

fn default_tenant_id_pattern() -> String {
    r"^[a-zA-Z0-9_\-]+$".to_string()
}

impl Default for SharedSchemaConfig {
    fn default() -> Self {
        Self {
            use_row_level_security: false,
            tenant_column: default_tenant_column(),
            session_setting: default_session_setting(),
            tenant_id_pattern: default_tenant_id_pattern(),
        }
    }
}

impl SharedSchemaConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables Row-Level Security.
    pub fn with_rls(mut self) -> Self {
        self.use_row_level_security = true;
        self
    }

    /// Sets the tenant column name.
    pub fn with_tenant_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_column = column.into();
        self
    }
}

/// A parameterized SQL predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPredicate {
    /// The predicate text with positional placeholders.
    pub sql: String,
    /// Values bound to the placeholders, in order.
    pub params: Vec<String>,
}

/// Renders tenant scopes as SQL for a shared schema.
///
/// # Query Modification
///
/// ```sql
/// -- caller predicate
/// status = $2
///
/// -- executed predicate
/// (tenant_id = $1) AND (status = $2)
/// ```
///
/// The tenant clause always comes first and the caller's clause is wrapped in
/// parentheses, so an `OR` in the caller's text cannot escape the scope.
#[derive(Debug, Clone)]
pub struct SharedSchemaPushdown {
    config: SharedSchemaConfig,
    tenant_pattern: regex::Regex,
}

impl SharedSchemaPushdown {
    /// Creates a push-down renderer with the given configuration.
    pub fn new(config: SharedSchemaConfig) -> Result<Self, regex::Error> {
        let tenant_pattern = regex::Regex::new(&config.tenant_id_pattern)?;
        Ok(Self {
            config,
            tenant_pattern,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SharedSchemaConfig {
        &self.config
    }

    /// Returns `true` if the tenant id is safe to use as a column value.
    pub fn is_valid_tenant_id(&self, tenant_id: &TenantId) -> bool {
        !tenant_id.is_empty() && self.tenant_pattern.is_match(tenant_id.as_str())
    }

    /// Renders the tenant clause for a scope, or `None` when unrestricted.
    pub fn tenant_predicate(&self, scope: &TenantScope, table_alias: Option<&str>) -> Option<SqlPredicate> {
        let tenant_id = scope.tenant_id()?;
        let column = match table_alias {
            Some(alias) => format!("{}.{}", alias, self.config.tenant_column),
            None => self.config.tenant_column.clone(),
        };
        Some(SqlPredicate {
            sql: format!("{column} = $1"),
            params: vec![tenant_id.to_string()],
        })
    }

    /// Conjoins the tenant clause with a caller predicate.
    ///
    /// The caller's placeholders must start at `$2` when the scope is
    /// restricted; `$1` is reserved for the tenant id.
    pub fn scoped_where(&self, scope: &TenantScope, caller: Option<&str>) -> Option<String> {
        match (self.tenant_predicate(scope, None), caller) {
            (Some(tenant), Some(caller)) => Some(format!("({}) AND ({})", tenant.sql, caller)),
            (Some(tenant), None) => Some(tenant.sql),
            (None, Some(caller)) => Some(format!("({caller})")),
            (None, None) => None,
        }
    }

    /// Generates the session statement an RLS policy reads.
    ///
    /// Returns `None` when RLS is disabled. The unrestricted scope resets the
    /// setting, which RLS policies must treat as "no rows" unless the
    /// connection role bypasses RLS. Tenant ids outside the configured
    /// pattern are refused, since the id is spliced into the statement.
    pub fn session_statement(&self, scope: &TenantScope) -> Result<Option<String>, PushdownError> {
        if !self.config.use_row_level_security {
            return Ok(None);
        }
        let statement = match scope.tenant_id() {
            Some(tenant_id) => {
                if !self.is_valid_tenant_id(tenant_id) {
                    return Err(PushdownError::InvalidTenantId {
                        tenant_id: tenant_id.to_string(),
                        pattern: self.config.tenant_id_pattern.clone(),
                    });
                }
                format!(
                    "SET LOCAL {} = '{}'",
                    self.config.session_setting,
                    escape_sql_string(tenant_id.as_str())
                )
            }
            None => format!("RESET {}", self.config.session_setting),
        };
        Ok(Some(statement))
    }

    /// Generates the RLS policy DDL for a table.
    pub fn policy_ddl(&self, table_name: &str) -> String {
        format!(
            "ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;\n\
             CREATE POLICY tenant_isolation ON {table} USING ({column} = current_setting('{setting}'));\n",
            table = table_name,
            column = self.config.tenant_column,
            setting = self.config.session_setting,
        )
    }
}

/// Escapes a string for safe inclusion in SQL.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pushdown() -> SharedSchemaPushdown {
        SharedSchemaPushdown::new(SharedSchemaConfig::default()).unwrap()
    }

    fn acme() -> TenantScope {
        TenantScope::Tenant(TenantId::new("acme"))
    }

    #[test]
    fn test_config_default() {
        let config = SharedSchemaConfig::default();
        assert_eq!(config.tenant_column, "tenant_id");
        assert_eq!(config.session_setting, "app.current_tenant");
        assert!(!config.use_row_level_security);
    }

    #[test]
    fn test_config_builder() {
        let config = SharedSchemaConfig::new().with_rls().with_tenant_column("org_id");
        assert!(config.use_row_level_security);
        assert_eq!(config.tenant_column, "org_id");
    }

    #[test]
    fn test_tenant_predicate() {
        let p = pushdown().tenant_predicate(&acme(), None).unwrap();
        assert_eq!(p.sql, "tenant_id = $1");
        assert_eq!(p.params, vec!["acme".to_string()]);

        let aliased = pushdown().tenant_predicate(&acme(), Some("i")).unwrap();
        assert_eq!(aliased.sql, "i.tenant_id = $1");

        assert!(pushdown().tenant_predicate(&TenantScope::Unrestricted, None).is_none());
    }

    #[test]
    fn test_scoped_where_wraps_caller() {
        let sql = pushdown().scoped_where(&acme(), Some("status = $2 OR 1 = 1")).unwrap();
        assert_eq!(sql, "(tenant_id = $1) AND (status = $2 OR 1 = 1)");

        assert_eq!(pushdown().scoped_where(&acme(), None).unwrap(), "tenant_id = $1");
        assert_eq!(
            pushdown().scoped_where(&TenantScope::Unrestricted, Some("x = $1")).unwrap(),
            "(x = $1)"
        );
        assert!(pushdown().scoped_where(&TenantScope::Unrestricted, None).is_none());
    }

    #[test]
    fn test_session_statement() {
        assert_eq!(pushdown().session_statement(&acme()), Ok(None));

        let rls = SharedSchemaPushdown::new(SharedSchemaConfig::new().with_rls()).unwrap();
        assert_eq!(
            rls.session_statement(&acme()).unwrap().unwrap(),
            "SET LOCAL app.current_tenant = 'acme'"
        );
        assert_eq!(
            rls.session_statement(&TenantScope::Unrestricted).unwrap().unwrap(),
            "RESET app.current_tenant"
        );
    }

    #[test]
    fn test_session_statement_refuses_invalid_tenant_id() {
        let rls = SharedSchemaPushdown::new(SharedSchemaConfig::new().with_rls()).unwrap();
        let scope = TenantScope::Tenant(TenantId::new("acme'; DROP TABLE invoice; --"));

        let err = rls.session_statement(&scope).unwrap_err();
        assert!(matches!(
            err,
            PushdownError::InvalidTenantId { ref tenant_id, .. } if tenant_id.starts_with("acme'")
        ));
    }

    #[test]
    fn test_session_statement_escapes_quotes_when_pattern_allows() {
        let config = SharedSchemaConfig {
            tenant_id_pattern: r"^[a-z']+$".to_string(),
            ..SharedSchemaConfig::new().with_rls()
        };
        let rls = SharedSchemaPushdown::new(config).unwrap();
        assert_eq!(
            rls.session_statement(&TenantScope::Tenant(TenantId::new("o'brien")))
                .unwrap()
                .unwrap(),
            "SET LOCAL app.current_tenant = 'o''brien'"
        );
    }

    #[test]
    fn test_tenant_id_validation() {
        let p = pushdown();
        assert!(p.is_valid_tenant_id(&TenantId::new("tenant_123")));
        assert!(!p.is_valid_tenant_id(&TenantId::new("tenant with spaces")));
        assert!(!p.is_valid_tenant_id(&TenantId::new("")));
    }

    #[test]
    fn test_policy_ddl() {
        let ddl = pushdown().policy_ddl("invoice");
        assert!(ddl.contains("ALTER TABLE invoice ENABLE ROW LEVEL SECURITY"));
        assert!(ddl.contains("USING (tenant_id = current_setting('app.current_tenant'))"));
    }
}
