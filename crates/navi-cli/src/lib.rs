// Copyright 2025 Navi Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Navi CLI
//!
//! Command-line front end for the navi storage processor client.
//!
//! This crate holds the pieces of the `navi` binary that do not depend on
//! argument parsing: layering connection settings from flags, environment
//! and config file into a [`ClientConfig`], and rendering results as JSON.

use anyhow::{anyhow, bail, Context, Result};
use navi_dispatch::{ClientConfig, ControllerNodeStatus, Credentials};
use navi_parser::{ParsedRecord, ParserRegistry};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const ENV_USER: &str = "NAVI_USER";
pub const ENV_PASSWORD: &str = "NAVI_PASSWORD";
pub const ENV_SCOPE: &str = "NAVI_SCOPE";
pub const ENV_SECFILE: &str = "NAVI_SECFILE";

/// Connection settings given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub config: Option<PathBuf>,
    pub spa: Option<String>,
    pub spb: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub scope: Option<u32>,
    pub secfile: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub binary: Option<PathBuf>,
    pub attempts: Option<u32>,
}

/// Builds the client configuration.
///
/// Flags win over environment variables, which win over the config file.
/// `env` looks up an environment variable.
pub fn build_config<F>(options: &ConnectionOptions, env: F) -> Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &options.config {
        Some(path) => ClientConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if let Some(spa) = &options.spa {
        config.spa_address = Some(spa.clone());
    }
    if let Some(spb) = &options.spb {
        config.spb_address = Some(spb.clone());
    }
    if options.timeout_secs.is_some() {
        config.timeout_secs = options.timeout_secs;
    }
    if let Some(binary) = &options.binary {
        config.binary = Some(binary.clone());
    }
    if let Some(attempts) = options.attempts {
        config.max_attempts = attempts;
    }
    config.credentials = resolve_credentials(options, &env, config.credentials)?;

    config.validate()?;
    Ok(config)
}

/// Picks credentials from flags, then environment, then `fallback`.
pub fn resolve_credentials<F>(
    options: &ConnectionOptions,
    env: &F,
    fallback: Credentials,
) -> Result<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let user = options.user.clone().or_else(|| env(ENV_USER));
    let password = options.password.clone().or_else(|| env(ENV_PASSWORD));
    let secfile = options
        .secfile
        .clone()
        .or_else(|| env(ENV_SECFILE).map(PathBuf::from));
    let scope = match options.scope {
        Some(scope) => scope,
        None => match env(ENV_SCOPE) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number, got '{}'", ENV_SCOPE, raw))?,
            None => 0,
        },
    };

    match (user, password, secfile) {
        (Some(_), _, Some(_)) => bail!("Use either a user name or a security file, not both"),
        (Some(user), Some(password), None) => Ok(Credentials::UserPassword {
            user,
            password,
            scope,
        }),
        (Some(user), None, None) => bail!("No password given for user '{}'", user),
        (None, Some(_), _) => bail!("A password needs a user name"),
        (None, None, Some(path)) => Ok(Credentials::SecurityFile(path)),
        (None, None, None) => Ok(fallback),
    }
}

/// Loads the parser registry from `path`, or the builtin one.
pub fn load_parsers(path: Option<&Path>) -> Result<ParserRegistry> {
    match path {
        Some(path) => ParserRegistry::from_path(path)
            .with_context(|| format!("Failed to load parsers from {}", path.display())),
        None => Ok(ParserRegistry::builtin()?),
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

pub fn records_to_json(records: &[ParsedRecord], pretty: bool) -> Result<String> {
    to_json(records, pretty)
}

pub fn nodes_to_json(nodes: &[ControllerNodeStatus], pretty: bool) -> Result<String> {
    to_json(nodes, pretty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        env_from(&[])
    }

    fn options() -> ConnectionOptions {
        ConnectionOptions {
            spa: Some("10.0.0.1".to_string()),
            spb: Some("10.0.0.2".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_build_config() {
        let opts = ConnectionOptions {
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
            scope: Some(1),
            timeout_secs: Some(60),
            attempts: Some(2),
            ..options()
        };
        let config = build_config(&opts, no_env()).unwrap();
        assert_eq!(config.spa_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(config.timeout_secs, Some(60));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(
            config.credentials,
            Credentials::UserPassword {
                user: "admin".to_string(),
                password: "secret".to_string(),
                scope: 1,
            }
        );
    }

    #[test]
    fn test_env_credentials() {
        let env = env_from(&[
            (ENV_USER, "ops"),
            (ENV_PASSWORD, "pw"),
            (ENV_SCOPE, "2"),
        ]);
        let config = build_config(&options(), env).unwrap();
        assert_eq!(
            config.credentials,
            Credentials::UserPassword {
                user: "ops".to_string(),
                password: "pw".to_string(),
                scope: 2,
            }
        );
    }

    #[test]
    fn test_flag_beats_env() {
        let env = env_from(&[(ENV_USER, "ops"), (ENV_PASSWORD, "pw")]);
        let opts = ConnectionOptions {
            user: Some("admin".to_string()),
            ..options()
        };
        let creds = resolve_credentials(&opts, &env, Credentials::None).unwrap();
        assert!(matches!(creds, Credentials::UserPassword { ref user, .. } if user == "admin"));
    }

    #[test]
    fn test_security_file_from_env() {
        let env = env_from(&[(ENV_SECFILE, "/home/ops/.navi")]);
        let creds = resolve_credentials(&options(), &env, Credentials::None).unwrap();
        assert_eq!(creds, Credentials::SecurityFile(PathBuf::from("/home/ops/.navi")));
    }

    #[test]
    fn test_invalid_credential_combinations() {
        let user_only = ConnectionOptions {
            user: Some("admin".to_string()),
            ..options()
        };
        assert!(resolve_credentials(&user_only, &no_env(), Credentials::None).is_err());

        let both = ConnectionOptions {
            user: Some("admin".to_string()),
            password: Some("pw".to_string()),
            secfile: Some(PathBuf::from("/tmp/sec")),
            ..options()
        };
        assert!(resolve_credentials(&both, &no_env(), Credentials::None).is_err());

        let bad_scope = env_from(&[(ENV_USER, "a"), (ENV_PASSWORD, "b"), (ENV_SCOPE, "global")]);
        assert!(resolve_credentials(&options(), &bad_scope, Credentials::None).is_err());
    }

    #[test]
    fn test_config_file_layering() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "spa_address: 10.1.1.1\nspb_address: 10.1.1.2\ntimeout_secs: 30\ncredentials:\n  security_file: /etc/navi/sec"
        )
        .unwrap();

        let opts = ConnectionOptions {
            config: Some(file.path().to_path_buf()),
            spb: Some("10.9.9.9".to_string()),
            ..Default::default()
        };
        let config = build_config(&opts, no_env()).unwrap();
        assert_eq!(config.spa_address.as_deref(), Some("10.1.1.1"));
        assert_eq!(config.spb_address.as_deref(), Some("10.9.9.9"));
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(
            config.credentials,
            Credentials::SecurityFile(PathBuf::from("/etc/navi/sec"))
        );
    }

    #[test]
    fn test_missing_addresses_rejected() {
        let err = build_config(&ConnectionOptions::default(), no_env()).unwrap_err();
        assert!(err.to_string().contains("spa_address"));
    }

    #[test]
    fn test_records_to_json() {
        let registry = load_parsers(None).unwrap();
        let records = registry
            .parse_all("Pool", "Pool Name: p0\nLUNs: 1, 2\n")
            .unwrap();
        let json = records_to_json(&records, false).unwrap();
        assert!(json.starts_with(r#"[{"name":"p0","#));
        assert!(json.contains(r#""luns":[1,2]"#));
    }
}
