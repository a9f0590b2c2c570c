use anyhow::{Context, Result};
use dialoguer::{Input, Password, Select};
use serde::Serialize;

use super::{stdin_is_interactive, EnvLookup, Runtime};
use crate::config::{validate_profile_name, AuthMethod, Profile, ProfileStore};
use crate::credentials::{resolve_secret, Secret, SecretSource};
use crate::error::Error;
use crate::progress::with_spinner;
use crate::shape::Render;
use crate::warehouse::Warehouse;

/// Flags accepted by `connection set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub name: Option<String>,
    pub account: Option<String>,
    pub account_url: Option<String>,
    pub user: Option<String>,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub description: Option<String>,
    pub auth_method: Option<String>,
    pub make_current: bool,
    pub no_prompt: bool,
    pub store_secret: bool,
    pub skip_test: bool,
}

/// One editable profile field and where its value can come from.
struct Field {
    label: &'static str,
    flag: &'static str,
    env: Option<&'static str>,
    required: bool,
    slot: fn(&mut Profile) -> &mut String,
    value: fn(&SetOptions) -> Option<&str>,
}

fn fields() -> [Field; 8] {
    [
        Field {
            label: "Account locator",
            flag: "account",
            env: Some("SNOWFLAKE_ACCOUNT"),
            required: true,
            slot: |p| &mut p.account,
            value: |o| o.account.as_deref(),
        },
        Field {
            label: "Account URL",
            flag: "account-url",
            env: Some("SNOWFLAKE_ACCOUNT_URL"),
            required: false,
            slot: |p| &mut p.account_url,
            value: |o| o.account_url.as_deref(),
        },
        Field {
            label: "Username",
            flag: "user",
            env: Some("SNOWFLAKE_USER"),
            required: true,
            slot: |p| &mut p.user,
            value: |o| o.user.as_deref(),
        },
        Field {
            label: "Default role",
            flag: "role",
            env: Some("SNOWFLAKE_ROLE"),
            required: true,
            slot: |p| &mut p.role,
            value: |o| o.role.as_deref(),
        },
        Field {
            label: "Default warehouse",
            flag: "warehouse",
            env: Some("SNOWFLAKE_WAREHOUSE"),
            required: true,
            slot: |p| &mut p.warehouse,
            value: |o| o.warehouse.as_deref(),
        },
        Field {
            label: "Default database",
            flag: "database",
            env: Some("SNOWFLAKE_DATABASE"),
            required: true,
            slot: |p| &mut p.database,
            value: |o| o.database.as_deref(),
        },
        Field {
            label: "Default schema",
            flag: "schema",
            env: Some("SNOWFLAKE_SCHEMA"),
            required: true,
            slot: |p| &mut p.schema,
            value: |o| o.schema.as_deref(),
        },
        Field {
            label: "Description",
            flag: "description",
            env: None,
            required: false,
            slot: |p| &mut p.description,
            value: |o| o.description.as_deref(),
        },
    ]
}

/// Flag if given, else the saved value, else the environment default.
/// An explicitly empty flag clears the saved value.
pub(crate) fn resolve_field(flag: Option<&str>, existing: &str, env: Option<&str>) -> String {
    let value = flag.unwrap_or(existing).trim();
    if !value.is_empty() {
        return value.to_string();
    }
    env.map(str::trim).unwrap_or_default().to_string()
}

/// Merge flags, the saved profile, and environment defaults into `base`,
/// prompting for each field when interactive.
fn collect_profile(
    mut base: Profile,
    opts: &SetOptions,
    env: &dyn Fn(&str) -> Option<String>,
    interactive: bool,
) -> Result<Profile> {
    let mut missing = Vec::new();
    for field in fields() {
        let env_value = field.env.and_then(env);
        let slot = (field.slot)(&mut base);
        let mut value = resolve_field((field.value)(opts), slot.as_str(), env_value.as_deref());
        if interactive {
            value = prompt_text(field.label, &value, field.required)?;
        }
        if field.required && value.is_empty() {
            missing.push(format!("--{}", field.flag));
        }
        *slot = value;
    }
    if !missing.is_empty() {
        return Err(Error::Validation(format!(
            "missing required values: {}; pass them as flags or run interactively",
            missing.join(", ")
        ))
        .into());
    }

    base.auth_method = match opts.auth_method.as_deref() {
        Some(raw) => raw.parse()?,
        None => base.auth_method,
    };
    if interactive && opts.auth_method.is_none() {
        base.auth_method = prompt_auth_method(base.auth_method)?;
    }
    Ok(base)
}

fn prompt_text(label: &str, default: &str, required: bool) -> Result<String> {
    let mut input = Input::<String>::new()
        .with_prompt(label)
        .allow_empty(!required);
    if !default.is_empty() {
        input = input.default(default.to_string());
    }
    let value = input
        .interact_text()
        .with_context(|| format!("read {}", label.to_lowercase()))?;
    Ok(value.trim().to_string())
}

fn prompt_auth_method(current: AuthMethod) -> Result<AuthMethod> {
    let choices = [AuthMethod::Password, AuthMethod::Pat];
    let labels: Vec<String> = choices.iter().map(|m| m.to_string()).collect();
    let selected = Select::new()
        .with_prompt("Authentication method")
        .items(&labels)
        .default(if current == AuthMethod::Pat { 1 } else { 0 })
        .interact()
        .context("read authentication method")?;
    Ok(choices[selected])
}

/// Secret from the environment or the store, else a hidden prompt when a
/// human is present.
fn acquire_secret(
    profile: &Profile,
    env: EnvLookup,
    interactive: bool,
) -> Result<(Secret, SecretSource)> {
    match resolve_secret(profile, env) {
        Ok(found) => Ok(found),
        Err(err) if !interactive => Err(err.into()),
        Err(_) => {
            let var = profile.auth_method.secret_env_var();
            let value = Password::new()
                .with_prompt(format!("{} (not saved unless --store-secret)", var))
                .interact()
                .context("read secret")?;
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{} is empty", var)).into());
            }
            Ok((Secret::new(value.trim()), SecretSource::Prompt))
        }
    }
}

async fn check_connection(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    profile: &Profile,
    secret: &Secret,
) -> Result<String> {
    let message = format!("Testing connection {}...", profile.name);
    with_spinner(
        &message,
        rt.show_progress(),
        warehouse.test_connection(profile, secret),
    )
    .await
    .with_context(|| format!("connection {:?} failed", profile.name))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetResponse {
    connection: String,
    saved_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_time: Option<String>,
    activated: bool,
}

impl Render for SetResponse {}

/// Create or update a connection profile.
pub async fn connection_set(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    opts: SetOptions,
) -> Result<()> {
    let interactive = !opts.no_prompt && stdin_is_interactive();
    if !opts.no_prompt && !interactive {
        rt.output
            .info("Input is not a terminal. Continuing with --no-prompt; supply values as flags.");
    }
    let response = save_connection(rt, warehouse, opts, interactive).await?;
    rt.output.print(&response)?;
    Ok(())
}

async fn save_connection(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    opts: SetOptions,
    interactive: bool,
) -> Result<SetResponse> {
    let name = match opts.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None if interactive => prompt_text("Connection name", "", true)?,
        None => {
            return Err(Error::Validation(
                "connection name required; pass NAME or run interactively".to_string(),
            )
            .into())
        }
    };
    validate_profile_name(&name)?;

    let mut store = ProfileStore::load(&rt.paths)?;
    let base = store.get_profile(&name).unwrap_or_else(|| Profile {
        name: name.clone(),
        ..Profile::default()
    });
    let mut profile = collect_profile(base, &opts, &rt.env, interactive)?;

    let secret = if opts.skip_test && !opts.store_secret {
        None
    } else {
        let (secret, source) = acquire_secret(&profile, rt.env, interactive)?;
        rt.output
            .verbose(&format!("Using secret from {} for {}", source, name));
        Some(secret)
    };
    if opts.store_secret {
        if let Some(secret) = &secret {
            profile.secret = Some(secret.expose().to_string());
            rt.output
                .warn("the secret is saved in plain text in the config file");
        }
    }

    let server_time = match (&secret, opts.skip_test) {
        (Some(secret), false) => Some(check_connection(rt, warehouse, &profile, secret).await?),
        _ => None,
    };

    store.set_profile(&name, &profile);
    if opts.make_current {
        store.use_profile(&name)?;
    }
    store.save(&rt.paths)?;
    tracing::info!(connection = %name, "saved connection");

    Ok(SetResponse {
        connection: name,
        saved_at: rt.paths.config_file().display().to_string(),
        server_time,
        activated: opts.make_current,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    name: String,
    is_current: bool,
    is_default: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    account: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    account_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    warehouse: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    database: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    schema: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    auth_method: AuthMethod,
}

fn list_entries(store: &ProfileStore) -> Vec<ListEntry> {
    store
        .sorted_profiles()
        .into_iter()
        .map(|p| ListEntry {
            is_current: p.name == store.current_profile,
            is_default: p.name == store.default_profile,
            name: p.name,
            account: p.account,
            account_url: p.account_url,
            user: p.user,
            role: p.role,
            warehouse: p.warehouse,
            database: p.database,
            schema: p.schema,
            description: p.description,
            auth_method: p.auth_method,
        })
        .collect()
}

/// List saved connections. Stored secrets are never shown.
pub fn connection_list(rt: &Runtime) -> Result<()> {
    let store = ProfileStore::load(&rt.paths)?;
    rt.output.print(&list_entries(&store))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct UseResponse {
    connection: String,
    account: String,
    role: String,
}

impl Render for UseResponse {}

pub fn connection_use(rt: &Runtime, name: &str) -> Result<()> {
    let mut store = ProfileStore::load(&rt.paths)?;
    store.use_profile(name)?;
    store.save(&rt.paths)?;
    let profile = store
        .get_profile(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;

    rt.output.print(&UseResponse {
        connection: profile.name,
        account: profile.account,
        role: profile.role,
    })?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct RemoveResponse {
    connection: String,
    status: &'static str,
    current: String,
    default: String,
}

impl Render for RemoveResponse {}

pub fn connection_remove(rt: &Runtime, name: &str) -> Result<()> {
    let mut store = ProfileStore::load(&rt.paths)?;
    if !store.delete_profile(name) {
        return Err(Error::NotFound(name.to_string()).into());
    }
    store.save(&rt.paths)?;
    tracing::info!(connection = %name, current = %store.current_profile, "removed connection");

    rt.output.print(&RemoveResponse {
        connection: name.to_string(),
        status: "deleted",
        current: store.current_profile.clone(),
        default: store.default_profile.clone(),
    })?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SetDefaultResponse {
    default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<String>,
}

impl Render for SetDefaultResponse {}

pub fn connection_set_default(rt: &Runtime, name: &str) -> Result<()> {
    let mut store = ProfileStore::load(&rt.paths)?;
    store.set_default_profile(name)?;
    store.save(&rt.paths)?;

    rt.output.print(&SetDefaultResponse {
        default: name.to_string(),
        current: (store.current_profile == name).then(|| name.to_string()),
    })?;
    Ok(())
}

/// Profile to test: the named one, the only one, or a selection.
fn pick_test_target(
    store: &ProfileStore,
    name: Option<&str>,
    interactive: bool,
) -> Result<Profile> {
    if let Some(name) = name {
        return Ok(store
            .get_profile(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?);
    }

    let mut profiles = store.sorted_profiles();
    match profiles.len() {
        0 => Err(Error::Validation(
            "no connections configured. Use 'snowctl connection set' first".to_string(),
        )
        .into()),
        1 => Ok(profiles.remove(0)),
        _ if !interactive => Err(Error::Validation(format!(
            "several connections are configured; pass NAME (one of: {})",
            store.profile_names().join(", ")
        ))
        .into()),
        _ => {
            let names = store.profile_names();
            let selected = Select::new()
                .with_prompt("Select a connection")
                .items(&names)
                .default(0)
                .interact()
                .context("read connection selection")?;
            Ok(profiles.remove(selected))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestResponse {
    connection: String,
    account: String,
    user: String,
    auth_env: String,
    server_time: String,
    current_set: bool,
}

impl Render for TestResponse {}

/// Log in and read the server clock; optionally make the profile current.
pub async fn connection_test(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    name: Option<&str>,
    set_current: bool,
) -> Result<()> {
    let interactive = stdin_is_interactive();
    let response = test_and_select(rt, warehouse, name, set_current, interactive).await?;
    rt.output.print(&response)?;
    Ok(())
}

async fn test_and_select(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    name: Option<&str>,
    set_current: bool,
    interactive: bool,
) -> Result<TestResponse> {
    let mut store = ProfileStore::load(&rt.paths)?;
    let profile = pick_test_target(&store, name, interactive)?;
    let (secret, source) = resolve_secret(&profile, rt.env)?;
    let server_time = check_connection(rt, warehouse, &profile, &secret).await?;

    if set_current {
        store
            .use_profile(&profile.name)
            .context("update current connection")?;
        store
            .save(&rt.paths)
            .context("update current connection")?;
    }

    Ok(TestResponse {
        connection: profile.name,
        account: profile.account,
        user: profile.user,
        auth_env: source.to_string(),
        server_time,
        current_set: set_current,
    })
}
