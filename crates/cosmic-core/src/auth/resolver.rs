//! Per-service credential resolution.
//!
//! The scheme is chosen by the service's `auth_type` field, falling back to
//! `credentials` when a static `credentials` section is present:
//!
//! | scheme | source |
//! |--------|--------|
//! | `credentials` | `credentials.{username,password}`, prompting once for what is missing |
//! | `credentials_from_env` | attributes of a directory entry (`credentials_from_env.path`) |
//! | `ldap_credentials` | the environment's own directory bind credentials |
//! | `keys` | the literal `keys` list of key-file paths |
//! | `keys_from_env` | key material read from a directory entry (default: the operator's) |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::directory::{Credentials, DirectorySession};
use super::prompt::Prompter;
use crate::config::normalize_key;
use crate::error::{AuthError, AuthResult};

/// Supported per-service authentication schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Static or prompted username/password.
    Credentials,
    /// Username/password read from a directory entry.
    CredentialsFromEnv,
    /// The environment's directory bind credentials.
    LdapCredentials,
    /// Literal key-file paths.
    Keys,
    /// Key material read from a directory entry.
    KeysFromEnv,
}

impl AuthScheme {
    /// Parses an `auth_type` value; symbol spelling (`:keys`) is accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match normalize_key(value).as_str() {
            "credentials" => Some(Self::Credentials),
            "credentials_from_env" => Some(Self::CredentialsFromEnv),
            "ldap_credentials" => Some(Self::LdapCredentials),
            "keys" => Some(Self::Keys),
            "keys_from_env" => Some(Self::KeysFromEnv),
            _ => None,
        }
    }

    /// The configuration spelling of this scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::CredentialsFromEnv => "credentials_from_env",
            Self::LdapCredentials => "ldap_credentials",
            Self::Keys => "keys",
            Self::KeysFromEnv => "keys_from_env",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whose answer a prompted username/password pair is cached under.
///
/// Environment-level answers live apart from service answers, so a plugin
/// named `ldap` or `environment` never sees the operator's credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PromptKey {
    /// The operator, for top-level `auth_type: credentials`.
    Environment,
    /// The directory bind, for top-level `auth_type: ldap`.
    Directory,
    /// A service, by lower-cased plugin name.
    Service(String),
}

impl PromptKey {
    /// A service key.
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service(name.into())
    }

    /// Text shown to the operator when prompting.
    pub fn label(&self) -> &str {
        match self {
            Self::Environment => "environment",
            Self::Directory => "ldap",
            Self::Service(name) => name,
        }
    }
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Credentials resolved for one service.
///
/// Stored under the service's `auth` configuration key for the rest of the run.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Account name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Paths of key files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// Raw key material.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_data: Vec<String>,
}

impl AuthRecord {
    /// A username/password record.
    pub fn from_credentials(credentials: Credentials) -> Self {
        Self {
            username: Some(credentials.username),
            password: Some(credentials.password),
            ..Self::default()
        }
    }

    /// Username and password, when both are present.
    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials::new(
            self.username.clone()?,
            self.password.clone()?,
        ))
    }
}

impl fmt::Debug for AuthRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRecord")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keys", &self.keys)
            .field("key_data", &self.key_data.len())
            .finish()
    }
}

/// How the environment itself authenticated.
#[derive(Debug, Default)]
pub enum EnvironmentAuth {
    /// No environment-level authentication.
    #[default]
    None,
    /// Bound to a directory.
    Directory(DirectorySession),
    /// Operator-supplied username/password.
    Credentials(Credentials),
}

impl EnvironmentAuth {
    /// The directory session, when directory-authenticated.
    pub fn directory(&self) -> Option<&DirectorySession> {
        match self {
            Self::Directory(session) => Some(session),
            _ => None,
        }
    }

    /// The operator's identity, if the environment knows it.
    pub fn operator(&self) -> Option<&str> {
        match self {
            Self::Directory(session) => session.credentials().map(|c| c.username.as_str()),
            Self::Credentials(credentials) => Some(credentials.username.as_str()),
            Self::None => None,
        }
    }

    /// The operator's identity, falling back to the login name of the process.
    pub fn identity(&self) -> Option<String> {
        self.operator().map(str::to_owned).or_else(login_name)
    }
}

fn login_name() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
}

// ─── Scheme-specific sections ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CredentialsSection {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFromEnvSection {
    path: String,
    #[serde(default = "default_username_attribute")]
    username_attribute: String,
    #[serde(default = "default_password_attribute")]
    password_attribute: String,
}

fn default_username_attribute() -> String {
    "uid".to_string()
}

fn default_password_attribute() -> String {
    "userPassword".to_string()
}

#[derive(Debug, Deserialize)]
struct KeysFromEnvSection {
    #[serde(default)]
    path: Option<String>,
    #[serde(default = "default_key_attributes")]
    attributes: Vec<String>,
}

impl Default for KeysFromEnvSection {
    fn default() -> Self {
        Self {
            path: None,
            attributes: default_key_attributes(),
        }
    }
}

fn default_key_attributes() -> Vec<String> {
    vec!["sshPublicKey".to_string()]
}

// =============================================================================
// AuthResolver
// =============================================================================

/// Resolves credentials for services.
///
/// Prompted answers are cached per service for the lifetime of the resolver;
/// [`forget`](Self::forget) discards one so the next resolution prompts again.
pub struct AuthResolver {
    prompter: Arc<dyn Prompter>,
    answers: Mutex<HashMap<PromptKey, Credentials>>,
}

impl AuthResolver {
    /// Creates a resolver that prompts through `prompter`.
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self {
            prompter,
            answers: Mutex::new(HashMap::new()),
        }
    }

    /// Determines the scheme configured for `service`.
    ///
    /// Returns `Ok(None)` when the service needs no authentication.
    pub fn scheme(service: &str, config: &Map<String, Value>) -> AuthResult<Option<AuthScheme>> {
        match config.get("auth_type") {
            Some(Value::String(raw)) => AuthScheme::parse(raw).map(Some).ok_or_else(|| {
                AuthError::UnsupportedScheme {
                    service: service.to_string(),
                    scheme: raw.clone(),
                }
            }),
            Some(Value::Null) | None if config.contains_key("credentials") => {
                Ok(Some(AuthScheme::Credentials))
            }
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(AuthError::UnsupportedScheme {
                service: service.to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    /// Resolves credentials for `service` from its configuration sub-tree.
    pub fn resolve(
        &self,
        service: &str,
        config: &Map<String, Value>,
        environment: &EnvironmentAuth,
    ) -> AuthResult<Option<AuthRecord>> {
        let Some(scheme) = Self::scheme(service, config)? else {
            return Ok(None);
        };
        debug!(service = %service, scheme = %scheme, "Resolving credentials");

        let record = match scheme {
            AuthScheme::Credentials => {
                let section: CredentialsSection =
                    section(service, config, "credentials")?.unwrap_or_default();
                let credentials =
                    self.credentials_for(
                    &PromptKey::service(service),
                    section.username,
                    section.password,
                )?;
                AuthRecord::from_credentials(credentials)
            }
            AuthScheme::CredentialsFromEnv => {
                let directory = require_directory(service, scheme, environment)?;
                let section: CredentialsFromEnvSection =
                    section(service, config, "credentials_from_env")?.ok_or_else(|| {
                        AuthError::MissingField {
                            service: service.to_string(),
                            field: "credentials_from_env.path".to_string(),
                        }
                    })?;
                let mut values = directory
                    .read(
                        &section.path,
                        &[section.username_attribute, section.password_attribute],
                    )?
                    .into_iter();
                AuthRecord {
                    username: values.next(),
                    password: values.next(),
                    ..AuthRecord::default()
                }
            }
            AuthScheme::LdapCredentials => {
                let directory = require_directory(service, scheme, environment)?;
                let credentials = directory.credentials().cloned().ok_or_else(|| {
                    AuthError::DirectoryUnavailable {
                        service: service.to_string(),
                        scheme: scheme.to_string(),
                    }
                })?;
                AuthRecord::from_credentials(credentials)
            }
            AuthScheme::Keys => {
                let keys: Vec<String> =
                    section(service, config, "keys")?.ok_or_else(|| AuthError::MissingField {
                        service: service.to_string(),
                        field: "keys".to_string(),
                    })?;
                AuthRecord {
                    keys,
                    ..AuthRecord::default()
                }
            }
            AuthScheme::KeysFromEnv => {
                let directory = require_directory(service, scheme, environment)?;
                let section: KeysFromEnvSection =
                    section(service, config, "keys_from_env")?.unwrap_or_default();
                let path = match section.path {
                    Some(path) => path,
                    None => {
                        let operator = environment.identity().ok_or_else(|| {
                            AuthError::MissingField {
                                service: service.to_string(),
                                field: "keys_from_env.path".to_string(),
                            }
                        })?;
                        directory.settings().user_path(&operator)
                    }
                };
                AuthRecord {
                    key_data: directory.read_all(&path, &section.attributes)?,
                    ..AuthRecord::default()
                }
            }
        };
        Ok(Some(record))
    }

    /// Completes a username/password pair, prompting for the missing parts.
    ///
    /// Only the first call for a given `key` prompts; later calls reuse the
    /// cached answer until [`forget`](Self::forget) is called.
    pub fn credentials_for(
        &self,
        key: &PromptKey,
        username: Option<String>,
        password: Option<String>,
    ) -> AuthResult<Credentials> {
        if let (Some(username), Some(password)) = (&username, &password) {
            return Ok(Credentials::new(username.clone(), password.clone()));
        }
        if let Some(cached) = self.answers.lock().get(key).cloned() {
            debug!(prompt = %key, "Reusing prompted credentials");
            return Ok(cached);
        }

        let username = match username {
            Some(username) => username,
            None => self.prompter.username(key.label())?,
        };
        let password = match password {
            Some(password) => password,
            None => self.prompter.password(key.label(), &username)?,
        };
        let credentials = Credentials::new(username, password);
        self.answers.lock().insert(key.clone(), credentials.clone());
        Ok(credentials)
    }

    /// Discards any cached prompt answer for `key`.
    pub fn forget(&self, key: &PromptKey) {
        self.answers.lock().remove(key);
    }
}

impl fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResolver")
            .field("cached_answers", &self.answers.lock().len())
            .finish_non_exhaustive()
    }
}

fn require_directory<'a>(
    service: &str,
    scheme: AuthScheme,
    environment: &'a EnvironmentAuth,
) -> AuthResult<&'a DirectorySession> {
    environment
        .directory()
        .ok_or_else(|| AuthError::DirectoryUnavailable {
            service: service.to_string(),
            scheme: scheme.to_string(),
        })
}

fn section<T: DeserializeOwned>(
    service: &str,
    config: &Map<String, Value>,
    field: &str,
) -> AuthResult<Option<T>> {
    match config.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| AuthError::InvalidField {
                service: service.to_string(),
                field: field.to_string(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::{DirectorySettings, StaticDirectory};
    use crate::testing::ScriptedPrompter;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        match crate::config::normalize_value(value) {
            Value::Object(map) => map,
            _ => panic!("expected a mapping"),
        }
    }

    fn directory_env(directory: &StaticDirectory, bind_as: Option<Credentials>) -> EnvironmentAuth {
        let mut settings = DirectorySettings::new("dir.example.com");
        settings.base = Some("dc=example,dc=com".into());
        EnvironmentAuth::Directory(DirectorySession::new(
            settings,
            bind_as,
            Box::new(directory.clone()),
        ))
    }

    #[test]
    fn scheme_selection() {
        let keys = config(json!({ "auth_type": ":keys" }));
        assert_eq!(AuthResolver::scheme("x", &keys).unwrap(), Some(AuthScheme::Keys));

        let implicit = config(json!({ "credentials": { "username": "a" } }));
        assert_eq!(
            AuthResolver::scheme("x", &implicit).unwrap(),
            Some(AuthScheme::Credentials)
        );

        assert_eq!(AuthResolver::scheme("x", &config(json!({}))).unwrap(), None);

        let bogus = config(json!({ "auth_type": "kerberos" }));
        assert!(matches!(
            AuthResolver::scheme("x", &bogus),
            Err(AuthError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn static_credentials_do_not_prompt() {
        let prompter = Arc::new(ScriptedPrompter::new("ann", "pw"));
        let resolver = AuthResolver::new(prompter.clone());
        let cfg = config(json!({
            "auth_type": "credentials",
            "credentials": { "username": "svc", "password": "s3cret" }
        }));

        let record = resolver
            .resolve("jira", &cfg, &EnvironmentAuth::None)
            .unwrap()
            .unwrap();

        assert_eq!(record.credentials(), Some(Credentials::new("svc", "s3cret")));
        assert_eq!(prompter.prompts(), 0);
    }

    #[test]
    fn missing_credentials_prompt_exactly_once() {
        let prompter = Arc::new(ScriptedPrompter::new("ann", "pw"));
        let resolver = AuthResolver::new(prompter.clone());
        let cfg = config(json!({ "auth_type": "credentials" }));

        let first = resolver.resolve("jira", &cfg, &EnvironmentAuth::None).unwrap();
        let second = resolver.resolve("jira", &cfg, &EnvironmentAuth::None).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.unwrap().username.as_deref(), Some("ann"));
        assert_eq!(prompter.username_prompts(), 1);
        assert_eq!(prompter.password_prompts(), 1);

        resolver.forget(&PromptKey::service("jira"));
        resolver.resolve("jira", &cfg, &EnvironmentAuth::None).unwrap();
        assert_eq!(prompter.username_prompts(), 2);
    }

    #[test]
    fn configured_username_only_prompts_for_password() {
        let prompter = Arc::new(ScriptedPrompter::new("ignored", "pw"));
        let resolver = AuthResolver::new(prompter.clone());
        let cfg = config(json!({ "credentials": { "username": "svc" } }));

        let record = resolver
            .resolve("f5", &cfg, &EnvironmentAuth::None)
            .unwrap()
            .unwrap();

        assert_eq!(record.credentials(), Some(Credentials::new("svc", "pw")));
        assert_eq!(prompter.username_prompts(), 0);
        assert_eq!(prompter.password_prompts(), 1);
    }

    #[test]
    fn keys_are_copied_without_directory_lookup() {
        let directory = StaticDirectory::new();
        let resolver = AuthResolver::new(Arc::new(ScriptedPrompter::new("a", "b")));
        let cfg = config(json!({ "auth_type": "keys", "keys": ["a", "b"] }));

        let record = resolver
            .resolve("ssh", &cfg, &directory_env(&directory, None))
            .unwrap()
            .unwrap();

        assert_eq!(record.keys, vec!["a", "b"]);
        assert_eq!(directory.lookups(), 0);
    }

    #[test]
    fn keys_without_list_is_missing_field() {
        let resolver = AuthResolver::new(Arc::new(ScriptedPrompter::new("a", "b")));
        let cfg = config(json!({ "auth_type": "keys" }));
        assert!(matches!(
            resolver.resolve("ssh", &cfg, &EnvironmentAuth::None),
            Err(AuthError::MissingField { .. })
        ));
    }

    #[test]
    fn credentials_from_env_reads_directory_attributes() {
        let directory = StaticDirectory::new().with_entry(
            "cn=jira-bot,dc=example,dc=com",
            [("uid", "jira-bot"), ("userPassword", "botpw")],
        );
        let resolver = AuthResolver::new(Arc::new(ScriptedPrompter::new("a", "b")));
        let cfg = config(json!({
            "auth_type": "credentials_from_env",
            "credentials_from_env": { "path": "cn=jira-bot" }
        }));

        let record = resolver
            .resolve("jira", &cfg, &directory_env(&directory, None))
            .unwrap()
            .unwrap();
        assert_eq!(record.credentials(), Some(Credentials::new("jira-bot", "botpw")));

        assert!(matches!(
            resolver.resolve("jira", &cfg, &EnvironmentAuth::None),
            Err(AuthError::DirectoryUnavailable { .. })
        ));
    }

    #[test]
    fn ldap_credentials_reuse_bind_credentials() {
        let directory = StaticDirectory::new();
        let resolver = AuthResolver::new(Arc::new(ScriptedPrompter::new("a", "b")));
        let cfg = config(json!({ "auth_type": "ldap_credentials" }));
        let bind = Credentials::new("ops", "secret");

        let record = resolver
            .resolve("nagios", &cfg, &directory_env(&directory, Some(bind.clone())))
            .unwrap()
            .unwrap();
        assert_eq!(record.credentials(), Some(bind));

        let env = EnvironmentAuth::Credentials(Credentials::new("ops", "secret"));
        assert!(matches!(
            resolver.resolve("nagios", &cfg, &env),
            Err(AuthError::DirectoryUnavailable { .. })
        ));
    }

    #[test]
    fn keys_from_env_defaults_to_operator_entry() {
        let directory = StaticDirectory::new()
            .with_entry(
                "uid=ops,dc=example,dc=com",
                [("sshPublicKey", "ssh-ed25519 AAA1"), ("sshPublicKey", "ssh-rsa BBB2")],
            )
            .with_entry("cn=deploy,dc=example,dc=com", [("deployKey", "ssh-ed25519 CCC3")]);
        let resolver = AuthResolver::new(Arc::new(ScriptedPrompter::new("a", "b")));
        let env = directory_env(&directory, Some(Credentials::new("ops", "secret")));

        let own = resolver
            .resolve("ssh", &config(json!({ "auth_type": "keys_from_env" })), &env)
            .unwrap()
            .unwrap();
        assert_eq!(own.key_data, vec!["ssh-ed25519 AAA1", "ssh-rsa BBB2"]);

        let explicit = resolver
            .resolve(
                "ssh",
                &config(json!({
                    "auth_type": "keys_from_env",
                    "keys_from_env": { "path": "cn=deploy", "attributes": ["deployKey"] }
                })),
                &env,
            )
            .unwrap()
            .unwrap();
        assert_eq!(explicit.key_data, vec!["ssh-ed25519 CCC3"]);
    }

    #[test]
    fn record_debug_hides_secrets() {
        let record = AuthRecord::from_credentials(Credentials::new("ops", "hunter2"));
        assert!(!format!("{record:?}").contains("hunter2"));
    }
}
