//! `(tenant_id, namespace)` scope.
//!
//! The source system behind this core threads tenant scope through an
//! implicit, dynamically-scoped request-local value. Rust has no
//! equivalent of that without a thread-local hack that would fight the
//! `Send`/async ecosystem, so [`Scope`] is passed explicitly as the first
//! argument of every engine operation; [`Scoped`] exists purely for
//! ergonomics when one call site repeatedly invokes the same engine with
//! the same scope.
//!
//! Every read or write in every engine filters by `tenant_id` AND
//! `namespace` — there is no operation in this core that reads or writes
//! across scopes, except the few explicitly-justified bulk administrative
//! queries called out at their call sites (e.g. scanning all schedules at
//! startup).
//!
//! Empty strings are never silently substituted with the default scope at
//! *read* time — only [`Scope::normalize_for_write`] performs that
//! substitution, and only for newly created rows.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TENANT_ID: &str = "default";
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub namespace: String,
}

impl Scope {
    pub fn new(tenant_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            namespace: namespace.into(),
        }
    }

    /// The scope used when a caller hasn't set one.
    pub fn default_scope() -> Self {
        Self::new(DEFAULT_TENANT_ID, DEFAULT_NAMESPACE)
    }

    /// Substitute empty fields with the default scope. Call this only when
    /// about to *write* a new row — never to paper over an empty scope on
    /// a read, which should instead return "not found" for that (tenant,
    /// namespace).
    pub fn normalize_for_write(self) -> Self {
        Self {
            tenant_id: if self.tenant_id.is_empty() {
                DEFAULT_TENANT_ID.to_string()
            } else {
                self.tenant_id
            },
            namespace: if self.namespace.is_empty() {
                DEFAULT_NAMESPACE.to_string()
            } else {
                self.namespace
            },
        }
    }
}

/// Pre-binds a [`Scope`] to a value (typically an engine handle) so call
/// sites that always operate in one scope don't have to repeat it.
#[derive(Debug, Clone)]
pub struct Scoped<T> {
    pub scope: Scope,
    pub inner: T,
}

impl<T> Scoped<T> {
    pub fn new(scope: Scope, inner: T) -> Self {
        Self { scope, inner }
    }
}

impl<T> std::ops::Deref for Scoped<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_for_write_fills_empty_tenant() {
        let s = Scope::new("", "ns").normalize_for_write();
        assert_eq!(s.tenant_id, DEFAULT_TENANT_ID);
        assert_eq!(s.namespace, "ns");
    }

    #[test]
    fn normalize_for_write_leaves_populated_scope_untouched() {
        let s = Scope::new("acme", "prod").normalize_for_write();
        assert_eq!(s.tenant_id, "acme");
        assert_eq!(s.namespace, "prod");
    }

    #[test]
    fn scoped_derefs_to_inner() {
        let scoped = Scoped::new(Scope::default_scope(), vec![1, 2, 3]);
        assert_eq!(scoped.len(), 3);
    }
}
