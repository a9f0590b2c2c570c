//! Connection profile store.
//!
//! Profiles live in a single TOML file under the per-user config directory
//! (`~/.snowctl/config`, or `$SNOWCTL_CONFIG_DIR/config`):
//!
//! ```toml
//! currentContext = "prod"
//! defaultContext = "prod"
//!
//! [contexts.prod]
//! account = "xy12345.us-east-1"
//! user = "ANALYST"
//! authMethod = "password"
//! ```
//!
//! Every command does load -> mutate -> save; nothing is cached between
//! invocations. Saves go through a temp file plus rename so a crash never
//! leaves a truncated config behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "SNOWCTL_CONFIG_DIR";

const CONFIG_DIR_NAME: &str = ".snowctl";
const CONFIG_FILE_NAME: &str = "config";

/// Authentication method for a profile
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AuthMethod {
    #[default]
    Password,
    Pat,
}

impl AuthMethod {
    /// Environment variable the secret for this method is read from.
    pub fn secret_env_var(&self) -> &'static str {
        match self {
            AuthMethod::Password => "SNOWFLAKE_PASSWORD",
            AuthMethod::Pat => "SNOWFLAKE_PAT",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Password => write!(f, "password"),
            AuthMethod::Pat => write!(f, "pat"),
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = Error;

    /// Empty input reads as `password`, matching files written before the
    /// field existed.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_lowercase().as_str() {
            "" | "password" => Ok(AuthMethod::Password),
            "pat" => Ok(AuthMethod::Pat),
            other => Err(Error::Validation(format!(
                "invalid auth method {:?}: must be password or pat",
                other
            ))),
        }
    }
}

impl TryFrom<String> for AuthMethod {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        value.parse()
    }
}

/// One named connection profile.
///
/// `name` is never written to disk. It is stamped from the map key on load,
/// on lookup, and before every save.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warehouse: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    /// Only present when the user opted in with `--store-secret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Location of the config directory and the files inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$SNOWCTL_CONFIG_DIR` if set, otherwise `<home>/.snowctl`.
    pub fn discover() -> Result<Self, Error> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(dir));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            Error::io(
                "determine home directory",
                io::Error::new(io::ErrorKind::NotFound, "home directory not found"),
            )
        })?;
        Ok(Self::new(home.join(CONFIG_DIR_NAME)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }
}

/// A schema the store used to be written in.
struct LegacySource {
    file_name: &'static str,
    parse: fn(&str) -> Result<ProfileStore, String>,
}

/// Prior on-disk schemas, oldest last. Tried in order when the current file
/// is missing.
const LEGACY_SOURCES: &[LegacySource] = &[LegacySource {
    file_name: "config.json",
    parse: parse_legacy_json,
}];

/// All profiles plus the current/default pointers.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProfileStore {
    #[serde(
        rename = "currentContext",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub current_profile: String,
    #[serde(
        rename = "defaultContext",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub default_profile: String,
    #[serde(rename = "contexts", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Load the store from disk.
    ///
    /// Missing file: try each legacy schema, migrating the first one found.
    /// Nothing on disk at all yields an empty store. A file that exists but
    /// does not parse is an error, never a silent reset.
    pub fn load(paths: &ConfigPaths) -> Result<Self, Error> {
        let path = paths.config_file();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let mut store: ProfileStore =
                    toml::from_str(&contents).map_err(|e| Error::parse("parse config", e))?;
                store.stamp_names();
                tracing::debug!(
                    path = %path.display(),
                    profiles = store.profiles.len(),
                    "loaded config"
                );
                Ok(store)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::migrate_legacy(paths),
            Err(e) => Err(Error::io("read config", e)),
        }
    }

    fn migrate_legacy(paths: &ConfigPaths) -> Result<Self, Error> {
        for source in LEGACY_SOURCES {
            let legacy_path = paths.dir().join(source.file_name);
            let contents = match fs::read_to_string(&legacy_path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io("read legacy config", e)),
            };

            let mut store =
                (source.parse)(&contents).map_err(|e| Error::parse("parse legacy config", e))?;
            store.save(paths).map_err(|e| Error::Migration(Box::new(e)))?;
            tracing::info!(
                from = %legacy_path.display(),
                to = %paths.config_file().display(),
                profiles = store.profiles.len(),
                "migrated legacy config"
            );
            return Ok(store);
        }

        tracing::debug!(dir = %paths.dir().display(), "no config found, starting empty");
        Ok(Self::default())
    }

    /// Write the store atomically: `<path>.tmp` first, then rename over
    /// `<path>`. The directory is created 0700 and the file written 0600.
    pub fn save(&mut self, paths: &ConfigPaths) -> Result<(), Error> {
        self.stamp_names();

        create_private_dir(paths.dir()).map_err(|e| Error::io("create config dir", e))?;
        let data = toml::to_string(self).map_err(|e| Error::serialize("serialize config", e))?;

        let path = paths.config_file();
        write_atomic(&path, data.as_bytes())?;
        tracing::debug!(path = %path.display(), profiles = self.profiles.len(), "saved config");
        Ok(())
    }

    /// Look up a profile; the returned copy carries `name` from the key.
    pub fn get_profile(&self, name: &str) -> Option<Profile> {
        self.profiles.get(name).map(|profile| {
            let mut profile = profile.clone();
            profile.name = name.to_string();
            profile
        })
    }

    /// Insert or replace a profile. Empty pointers are filled with `name`.
    pub fn set_profile(&mut self, name: &str, profile: &Profile) {
        let mut copied = profile.clone();
        copied.name = name.to_string();
        self.profiles.insert(name.to_string(), copied);

        self.drop_dangling_pointers();
        if self.current_profile.is_empty() {
            self.current_profile = name.to_string();
        }
        if self.default_profile.is_empty() {
            self.default_profile = name.to_string();
        }
    }

    /// Remove a profile and repoint current/default if they referenced it.
    /// Returns false when no such profile existed.
    pub fn delete_profile(&mut self, name: &str) -> bool {
        if self.profiles.remove(name).is_none() {
            return false;
        }
        self.repair_pointers();
        true
    }

    /// Clear pointers naming a key that no longer exists. Hand-edited and
    /// migrated files can carry these.
    fn drop_dangling_pointers(&mut self) {
        for pointer in [&mut self.current_profile, &mut self.default_profile] {
            if !pointer.is_empty() && !self.profiles.contains_key(pointer.as_str()) {
                tracing::debug!(pointer = %pointer, "dropping dangling pointer");
                pointer.clear();
            }
        }
    }

    /// Refill empty pointers: first from the other pointer if it survives,
    /// then from the smallest remaining name.
    fn repair_pointers(&mut self) {
        self.drop_dangling_pointers();
        if self.current_profile.is_empty() && self.profiles.contains_key(&self.default_profile) {
            self.current_profile = self.default_profile.clone();
        }
        if self.default_profile.is_empty() && self.profiles.contains_key(&self.current_profile) {
            self.default_profile = self.current_profile.clone();
        }
        if let Some(first) = self.profiles.keys().next() {
            if self.current_profile.is_empty() {
                self.current_profile = first.clone();
            }
            if self.default_profile.is_empty() {
                self.default_profile = first.clone();
            }
        }
    }

    /// Make `name` the current profile.
    pub fn use_profile(&mut self, name: &str) -> Result<(), Error> {
        if !self.profiles.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        self.current_profile = name.to_string();
        self.repair_pointers();
        Ok(())
    }

    /// Make `name` the default profile, and the current one too when no
    /// current profile is set.
    pub fn set_default_profile(&mut self, name: &str) -> Result<(), Error> {
        if !self.profiles.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        self.default_profile = name.to_string();
        if self.current_profile.is_empty() {
            self.current_profile = name.to_string();
        }
        self.repair_pointers();
        Ok(())
    }

    /// All profiles ordered by name.
    pub fn sorted_profiles(&self) -> Vec<Profile> {
        self.profiles
            .keys()
            .filter_map(|name| self.get_profile(name))
            .collect()
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Name of the profile a command should use:
    /// explicit override, then current, then default.
    pub fn active_name<'a>(&'a self, override_name: Option<&'a str>) -> Option<&'a str> {
        override_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(self.current_profile.as_str()).filter(|n| !n.is_empty()))
            .or_else(|| Some(self.default_profile.as_str()).filter(|n| !n.is_empty()))
    }

    /// Resolve the active profile or explain why there is none.
    pub fn require_active(&self, override_name: Option<&str>) -> Result<Profile, Error> {
        let Some(name) = self.active_name(override_name) else {
            return Err(Error::Validation(
                "no active connection configured. Configure one via 'snowctl connection set' \
                 and 'snowctl connection use'"
                    .to_string(),
            ));
        };
        self.get_profile(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn stamp_names(&mut self) {
        for (name, profile) in self.profiles.iter_mut() {
            profile.name = name.clone();
        }
    }
}

/// Reject names that are blank or contain a path separator.
pub fn validate_profile_name(name: &str) -> Result<(), Error> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(
            "connection name cannot be empty".to_string(),
        ));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(Error::Validation(format!(
            "connection name {:?} cannot contain path separators",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// Legacy JSON schema
// =============================================================================

/// `config.json` as written by older releases. Keys were emitted either in
/// camelCase or with the Go field names, and string fields may be empty.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LegacyStore {
    #[serde(default, alias = "CurrentContext")]
    current_context: Option<String>,
    #[serde(default, alias = "DefaultContext")]
    default_context: Option<String>,
    #[serde(default, alias = "Contexts")]
    contexts: Option<BTreeMap<String, Option<LegacyProfile>>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LegacyProfile {
    #[serde(default, alias = "Account")]
    account: Option<String>,
    #[serde(default, alias = "AccountURL", alias = "AccountUrl")]
    account_url: Option<String>,
    #[serde(default, alias = "User")]
    user: Option<String>,
    #[serde(default, alias = "Role")]
    role: Option<String>,
    #[serde(default, alias = "Warehouse")]
    warehouse: Option<String>,
    #[serde(default, alias = "Database")]
    database: Option<String>,
    #[serde(default, alias = "Schema")]
    schema: Option<String>,
    #[serde(default, alias = "Description")]
    description: Option<String>,
    #[serde(default, alias = "AuthMethod")]
    auth_method: Option<String>,
    #[serde(default, alias = "Secret")]
    secret: Option<String>,
}

fn parse_legacy_json(contents: &str) -> Result<ProfileStore, String> {
    let legacy: LegacyStore = serde_json::from_str(contents).map_err(|e| e.to_string())?;

    let mut profiles = BTreeMap::new();
    for (name, entry) in legacy.contexts.unwrap_or_default() {
        let Some(entry) = entry else { continue };
        let auth_method = entry
            .auth_method
            .unwrap_or_default()
            .parse::<AuthMethod>()
            .map_err(|e| format!("connection {:?}: {}", name, e))?;
        profiles.insert(
            name.clone(),
            Profile {
                name,
                account: entry.account.unwrap_or_default(),
                account_url: entry.account_url.unwrap_or_default(),
                user: entry.user.unwrap_or_default(),
                role: entry.role.unwrap_or_default(),
                warehouse: entry.warehouse.unwrap_or_default(),
                database: entry.database.unwrap_or_default(),
                schema: entry.schema.unwrap_or_default(),
                description: entry.description.unwrap_or_default(),
                auth_method,
                secret: entry.secret.filter(|s| !s.is_empty()),
            },
        );
    }

    Ok(ProfileStore {
        current_profile: legacy.current_context.unwrap_or_default(),
        default_profile: legacy.default_context.unwrap_or_default(),
        profiles,
    })
}

// =============================================================================
// File helpers
// =============================================================================

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `data` next to `path` and rename it into place. If the write phase
/// fails the temp file is removed and `path` is left as it was.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), Error> {
    let tmp = temp_path(path);
    if let Err(e) = write_private_file(&tmp, data) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::io("write config temp file", e));
    }
    fs::rename(&tmp, path).map_err(|e| Error::io("persist config", e))
}

fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(data)?;
    file.sync_all()
}
