//! LDAP-backed [`DirectoryConnector`].
//!
//! Uses the synchronous `ldap3` client: one connection per environment, a
//! simple or anonymous bind, and base-scope searches for each lookup.

use std::time::Duration;

use cosmic_core::{
    Attributes, BindMethod, Credentials, Directory, DirectoryConnector, DirectoryError,
    DirectoryResult, DirectorySettings,
};
use ldap3::{LdapConn, LdapConnSettings, LdapError, Scope, SearchEntry};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Result code returned for a missing entry.
const NO_SUCH_OBJECT: u32 = 32;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens LDAP connections described by the `ldap` configuration section.
#[derive(Debug, Clone)]
pub struct LdapConnector {
    timeout: Duration,
}

impl Default for LdapConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl LdapConnector {
    /// A connector with a ten second connect timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the connect timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Server URL for `settings`. A host that already carries a scheme is used as is.
pub fn server_url(settings: &DirectorySettings) -> String {
    if settings.host.contains("://") {
        settings.host.clone()
    } else {
        format!("ldap://{}:{}", settings.host, settings.port)
    }
}

/// Bind DN for `username`: full DNs are kept, bare names go through the user template.
fn bind_dn(settings: &DirectorySettings, username: &str) -> String {
    if username.contains('=') {
        username.to_string()
    } else {
        settings.user_path(username)
    }
}

fn bind_failed(settings: &DirectorySettings, e: impl ToString) -> DirectoryError {
    DirectoryError::BindFailed {
        host: settings.host.clone(),
        reason: e.to_string(),
    }
}

impl DirectoryConnector for LdapConnector {
    fn bind(
        &self,
        settings: &DirectorySettings,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<Box<dyn Directory>> {
        let credentials = match settings.method {
            BindMethod::Simple => Some(
                credentials
                    .ok_or_else(|| bind_failed(settings, "simple bind requires credentials"))?,
            ),
            BindMethod::Anonymous => None,
        };

        let url = server_url(settings);
        debug!(url = %url, method = ?settings.method, "Connecting to directory");

        let conn_settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let mut conn =
            LdapConn::with_settings(conn_settings, &url).map_err(|e| bind_failed(settings, e))?;

        if let Some(credentials) = credentials {
            let dn = bind_dn(settings, &credentials.username);
            conn.simple_bind(&dn, &credentials.password)
                .and_then(|result| result.success())
                .map_err(|e| bind_failed(settings, e))?;
            debug!(dn = %dn, "Bound to directory");
        }

        Ok(Box::new(LdapDirectory {
            conn: Mutex::new(conn),
        }))
    }
}

/// A bound LDAP connection.
struct LdapDirectory {
    conn: Mutex<LdapConn>,
}

impl Directory for LdapDirectory {
    fn lookup(&self, path: &str, attributes: &[String]) -> DirectoryResult<Attributes> {
        let mut conn = self.conn.lock();
        let (entries, _) = conn
            .search(path, Scope::Base, "(objectClass=*)", attributes)
            .and_then(|result| result.success())
            .map_err(|e| match e {
                LdapError::LdapResult { result } if result.rc == NO_SUCH_OBJECT => {
                    DirectoryError::EntryNotFound(path.to_string())
                }
                other => DirectoryError::Other(other.to_string()),
            })?;

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::EntryNotFound(path.to_string()))?;
        Ok(SearchEntry::construct(entry).attrs.into_iter().collect())
    }
}

impl Drop for LdapDirectory {
    fn drop(&mut self) {
        if let Err(e) = self.conn.get_mut().unbind() {
            warn!(error = %e, "Directory unbind failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_uses_host_and_port() {
        let mut settings = DirectorySettings::new("ldap.example.com");
        assert_eq!(server_url(&settings), "ldap://ldap.example.com:389");

        settings.port = 1636;
        assert_eq!(server_url(&settings), "ldap://ldap.example.com:1636");

        settings.host = "ldaps://secure.example.com".to_string();
        assert_eq!(server_url(&settings), "ldaps://secure.example.com");
    }

    #[test]
    fn bare_usernames_go_through_the_template() {
        let mut settings = DirectorySettings::new("ldap.example.com");
        settings.base = Some("dc=example,dc=com".to_string());

        assert_eq!(bind_dn(&settings, "ann"), "uid=ann,dc=example,dc=com");
        assert_eq!(
            bind_dn(&settings, "cn=admin,dc=example,dc=com"),
            "cn=admin,dc=example,dc=com"
        );
    }

    #[test]
    fn simple_bind_without_credentials_is_refused_before_connecting() {
        // Nothing listens on this host; the refusal must not depend on the network.
        let settings = DirectorySettings::new("ldap.invalid");
        let result = LdapConnector::new().bind(&settings, None);

        match result {
            Err(DirectoryError::BindFailed { host, reason }) => {
                assert_eq!(host, "ldap.invalid");
                assert!(reason.contains("requires credentials"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("simple bind without credentials succeeded"),
        }
    }

    #[test]
    fn unreachable_server_is_a_bind_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut settings = DirectorySettings::new("127.0.0.1");
        settings.port = port;
        let credentials = Credentials::new("ann", "secret");
        let result = LdapConnector::new()
            .timeout(Duration::from_secs(2))
            .bind(&settings, Some(&credentials));

        match result {
            Err(DirectoryError::BindFailed { host, reason }) => {
                assert_eq!(host, "127.0.0.1");
                assert!(!reason.is_empty());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("bind to a closed port succeeded"),
        }
    }
}
