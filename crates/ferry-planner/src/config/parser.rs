//! Replication YAML parsing with environment variable substitution.
//!
//! Parsing is two-pass: the first, untyped pass reads the `env` mapping,
//! expands `${VAR}` references from the process environment, and
//! substitutes `${key}` occurrences across the whole document from the
//! `env` mapping itself; the second pass decodes the substituted text into
//! the typed tree. The untyped pass also captures the raw mappings used as
//! presence maps during default merging.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_yaml::Value as YamlValue;

use ferry_types::{HookMap, StreamConfig};

use crate::error::PlanError;
use crate::replication::{ConfigMaps, ReplicationConfig};
use crate::{ENV_CONFIG_PATH, ENV_REPLICATION_TASKS};

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with process environment values.
/// Unset variables expand to the empty string, shell-style.
#[must_use]
pub fn expand_process_env(input: &str) -> String {
    ENV_VAR_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// String form of a YAML scalar, for textual substitution and task env
/// values. Non-scalars have no string form.
#[must_use]
pub(crate) fn value_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Null => Some(String::new()),
        _ => None,
    }
}

/// Replace `${key}` occurrences across the document from the `env` mapping.
fn substitute_env_refs(text: &str, env: &IndexMap<String, YamlValue>) -> String {
    let mut out = text.to_string();
    for (key, value) in env {
        if let Some(replacement) = value_to_string(value) {
            out = out.replace(&format!("${{{key}}}"), &replacement);
        }
    }
    out
}

fn parse_err(source: serde_yaml::Error) -> PlanError {
    PlanError::Parse { source }
}

/// Parse a replication YAML document into a [`ReplicationConfig`].
///
/// # Errors
///
/// `ParseError` on malformed YAML; `MissingKey` when `source`, `target`,
/// or `streams` is absent (`defaults` and `hooks` are optional).
pub fn unmarshal_replication(text: &str) -> Result<ReplicationConfig, PlanError> {
    // pass 1: untyped, to read `env` before substitution
    let root: YamlValue = serde_yaml::from_str(text).map_err(parse_err)?;

    let mut env: IndexMap<String, YamlValue> = match root.get("env") {
        Some(value) => serde_yaml::from_value(value.clone()).map_err(parse_err)?,
        None => IndexMap::new(),
    };
    for value in env.values_mut() {
        if let YamlValue::String(s) = value {
            *value = YamlValue::String(expand_process_env(s));
        }
    }

    let substituted = substitute_env_refs(text, &env);

    // pass 2: typed
    let root: YamlValue = serde_yaml::from_str(&substituted).map_err(parse_err)?;

    // only true key-absence is an error; present zero values pass through
    let scalar_field = |key: &'static str| -> Result<String, PlanError> {
        let value = root.get(key).ok_or(PlanError::MissingKey { key })?;
        Ok(value_to_string(value).unwrap_or_default())
    };
    let source = scalar_field("source")?;
    let target = scalar_field("target")?;

    // a key present with a null value still counts as present
    let non_null = |key: &'static str| {
        root.get(key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or(YamlValue::Mapping(Default::default()))
    };
    if root.get("streams").is_none() {
        return Err(PlanError::MissingKey { key: "streams" });
    }
    let streams_val = non_null("streams");
    let defaults_val = non_null("defaults");
    let hooks_val = non_null("hooks");

    let defaults: StreamConfig = serde_yaml::from_value(defaults_val.clone()).map_err(parse_err)?;
    let hooks: HookMap = serde_yaml::from_value(hooks_val).map_err(parse_err)?;

    // typed streams plus the presence maps, keyed by the literal YAML keys
    let mut streams: IndexMap<String, Option<StreamConfig>> = IndexMap::new();
    let mut maps = ConfigMaps {
        defaults: defaults_val.as_mapping().cloned().unwrap_or_default(),
        streams: IndexMap::new(),
    };
    if let Some(mapping) = streams_val.as_mapping() {
        for (key, value) in mapping {
            let Some(key) = value_to_string(key) else {
                continue;
            };
            let cfg: Option<StreamConfig> = match value {
                YamlValue::Null => None,
                other => Some(serde_yaml::from_value(other.clone()).map_err(parse_err)?),
            };
            maps.streams
                .insert(key.clone(), value.as_mapping().cloned().unwrap_or_default());
            streams.insert(key, cfg);
        }
    }

    let streams_ordered: Vec<String> = streams.keys().cloned().collect();

    Ok(ReplicationConfig {
        source,
        target,
        hooks,
        defaults,
        streams,
        env,
        streams_ordered,
        original_text: substituted,
        maps,
        ..ReplicationConfig::default()
    })
}

/// Parse a replication config, honoring the pre-compiled task payload in
/// `FERRY_REPLICATION_TASKS` when present.
///
/// # Errors
///
/// Parsing errors from [`unmarshal_replication`], plus `TaskPayload` when
/// the env payload does not deserialise.
pub fn load(text: &str) -> Result<ReplicationConfig, PlanError> {
    let mut config = unmarshal_replication(text)?;

    if let Ok(payload) = std::env::var(ENV_REPLICATION_TASKS) {
        if !payload.is_empty() {
            config.tasks = serde_json::from_str(&payload)
                .map_err(|source| PlanError::TaskPayload { source })?;
            config.compiled = true;
        }
    }

    Ok(config)
}

/// Load a replication config from disk. The path is recorded in the config
/// env under `FERRY_CONFIG_PATH`.
///
/// # Errors
///
/// `Io` when the file cannot be read, otherwise as [`load`].
pub fn load_from_file(path: &Path) -> Result<ReplicationConfig, PlanError> {
    let text = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut config = load(&text)?;
    config.env.insert(
        ENV_CONFIG_PATH.to_string(),
        YamlValue::String(path.display().to_string()),
    );
    Ok(config)
}

/// Detect a JSON or YAML payload (as opposed to a file path or conn name).
#[must_use]
pub fn is_json_or_yaml(payload: &str) -> bool {
    if payload.starts_with('{') && payload.ends_with('}') {
        return true;
    }
    payload.contains(':')
        && payload.contains('\n')
        && (payload.contains('\'') || payload.contains('"'))
}
