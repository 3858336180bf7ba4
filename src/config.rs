use crate::record::SchemaVersion;
use anyhow::{anyhow, Context};
use envconfig::Envconfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// Workspace opened at startup; otherwise wait for `workspace.select`.
    #[envconfig(from = "TECHNOS_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[envconfig(from = "TECHNOS_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    #[envconfig(nested = true)]
    pub credential_fields: CredentialFields,

    #[envconfig(from = "TECHNOS_RECORD_SCHEMA", default = "department")]
    pub record_schema: SchemaVersion,

    #[envconfig(from = "TECHNOS_ADMIN_USER")]
    pub admin_user: Option<String>,

    #[envconfig(from = "TECHNOS_ADMIN_PASSWORD")]
    pub admin_password: Option<String>,
}

/// Discrete alternative to a service-account file.
#[derive(Envconfig, Clone, Debug, Default)]
pub struct CredentialFields {
    #[envconfig(from = "TECHNOS_PROJECT_ID")]
    pub project_id: Option<String>,

    #[envconfig(from = "TECHNOS_CLIENT_EMAIL")]
    pub client_email: Option<String>,

    #[envconfig(from = "TECHNOS_PRIVATE_KEY_ID")]
    pub private_key_id: Option<String>,

    #[envconfig(from = "TECHNOS_PRIVATE_KEY")]
    pub private_key: Option<String>,
}

#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct StoreCredentials {
    pub project_id: String,
    pub client_email: String,
    pub private_key_id: String,
    pub private_key: String,
}

// Keeps the key out of logs.
impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl StoreCredentials {
    fn check(self, source: &str) -> anyhow::Result<Self> {
        let blank = [
            ("project_id", &self.project_id),
            ("client_email", &self.client_email),
            ("private_key_id", &self.private_key_id),
            ("private_key", &self.private_key),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect::<Vec<_>>();
        if !blank.is_empty() {
            return Err(anyhow!("{source}: empty credential fields: {}", blank.join(", ")));
        }
        Ok(self)
    }
}

pub fn load_credentials_file(path: &Path) -> anyhow::Result<StoreCredentials> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials file {}", path.to_string_lossy()))?;
    let creds: StoreCredentials = serde_json::from_str(&text).with_context(|| {
        format!("credentials file {} is not a service-account JSON", path.to_string_lossy())
    })?;
    creds.check("credentials file")
}

impl Config {
    /// The credentials file wins when configured; otherwise every discrete
    /// field must be set.
    pub fn credentials(&self) -> anyhow::Result<StoreCredentials> {
        if let Some(path) = &self.credentials_file {
            return load_credentials_file(path);
        }
        let f = &self.credential_fields;
        match (&f.project_id, &f.client_email, &f.private_key_id, &f.private_key) {
            (Some(project_id), Some(client_email), Some(private_key_id), Some(private_key)) => {
                StoreCredentials {
                    project_id: project_id.clone(),
                    client_email: client_email.clone(),
                    private_key_id: private_key_id.clone(),
                    // Env files usually carry the PEM with literal \n sequences.
                    private_key: private_key.replace("\\n", "\n"),
                }
                .check("environment")
            }
            (None, None, None, None) => Err(anyhow!(
                "no store credentials configured: set TECHNOS_CREDENTIALS_FILE or TECHNOS_PROJECT_ID, TECHNOS_CLIENT_EMAIL, TECHNOS_PRIVATE_KEY_ID and TECHNOS_PRIVATE_KEY"
            )),
            _ => Err(anyhow!(
                "incomplete store credentials: TECHNOS_PROJECT_ID, TECHNOS_CLIENT_EMAIL, TECHNOS_PRIVATE_KEY_ID and TECHNOS_PRIVATE_KEY must all be set"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn discrete() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TECHNOS_PROJECT_ID", "banco-technos"),
            ("TECHNOS_CLIENT_EMAIL", "svc@banco-technos.iam"),
            ("TECHNOS_PRIVATE_KEY_ID", "abc123"),
            ("TECHNOS_PRIVATE_KEY", "-----BEGIN KEY-----\\nxyz\\n-----END KEY-----"),
        ]
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("config");
        assert_eq!(config.record_schema, SchemaVersion::Department);
        assert!(config.workspace.is_none());
        assert!(config.credentials().is_err());
    }

    #[test]
    fn discrete_fields_resolve_credentials() {
        let config = Config::init_from_hashmap(&env(&discrete())).expect("config");
        let creds = config.credentials().expect("credentials");
        assert_eq!(creds.project_id, "banco-technos");
        assert!(creds.private_key.contains("\nxyz\n"));
    }

    #[test]
    fn partial_discrete_fields_are_an_error() {
        let config = Config::init_from_hashmap(&env(&discrete()[..2])).expect("config");
        let e = config.credentials().expect_err("should fail");
        assert!(e.to_string().contains("incomplete"));
    }

    #[test]
    fn credentials_file_takes_precedence() {
        let dir = std::env::temp_dir().join(format!(
            "technos-creds-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("service-account.json");
        std::fs::write(
            &path,
            r#"{
                "type": "service_account",
                "project_id": "from-file",
                "private_key_id": "k1",
                "private_key": "-----BEGIN KEY-----\nabc\n-----END KEY-----\n",
                "client_email": "svc@from-file.iam",
                "client_id": "1"
            }"#,
        )
        .expect("write creds");

        let path_str = path.to_string_lossy().to_string();
        let mut vars: Vec<(&str, &str)> = discrete();
        vars.push(("TECHNOS_CREDENTIALS_FILE", &path_str));
        let config = Config::init_from_hashmap(&env(&vars)).expect("config");
        assert_eq!(config.credentials().expect("creds").project_id, "from-file");
    }

    #[test]
    fn credentials_file_with_blank_key_is_rejected() {
        let dir = std::env::temp_dir().join(format!(
            "technos-creds-blank-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("sa.json");
        std::fs::write(
            &path,
            r#"{"project_id":"p","private_key_id":"k","private_key":"","client_email":"e"}"#,
        )
        .expect("write creds");
        let e = load_credentials_file(&path).expect_err("should fail");
        assert!(e.to_string().contains("private_key"));
    }

    #[test]
    fn schema_is_read_from_env() {
        let config =
            Config::init_from_hashmap(&env(&[("TECHNOS_RECORD_SCHEMA", "registration")]))
                .expect("config");
        assert_eq!(config.record_schema, SchemaVersion::Registration);
    }
}
