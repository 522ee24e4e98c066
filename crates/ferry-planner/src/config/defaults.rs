//! Presence-aware default merging.
//!
//! A stream inherits a defaults field only when the field key is absent
//! from its raw YAML mapping. Presence, not zero-ness, is the criterion:
//! `mode: ""` is a deliberate blank and survives merging.

use serde_yaml::Mapping;

use ferry_types::StreamConfig;

use crate::replication::ReplicationConfig;

/// Fill unset fields of `stream` from the config's defaults block.
pub fn set_stream_defaults(name: &str, stream: &mut StreamConfig, rd: &ReplicationConfig) {
    let empty = Mapping::new();
    let present = rd.maps.streams.get(name).unwrap_or(&empty);
    let defaults = &rd.defaults;

    if !present.contains_key("mode") {
        stream.mode = defaults.mode;
    }
    if !present.contains_key("object") {
        stream.object = defaults.object.clone();
    }
    if !present.contains_key("select") {
        stream.select = defaults.select.clone();
    }
    if !present.contains_key("where") {
        stream.where_ = defaults.where_.clone();
    }
    if !present.contains_key("primary_key") {
        stream.primary_key = defaults.primary_key.clone();
    }
    if !present.contains_key("update_key") {
        stream.update_key = defaults.update_key.clone();
    }
    if !present.contains_key("sql") {
        stream.sql = defaults.sql.clone();
    }
    if !present.contains_key("schedule") {
        stream.schedule = defaults.schedule.clone();
    }
    if !present.contains_key("tags") {
        stream.tags = defaults.tags.clone();
    }
    if !present.contains_key("disabled") {
        stream.disabled = defaults.disabled;
    }
    if !present.contains_key("single") {
        stream.single = Some(defaults.single.unwrap_or(false));
    }
    if !present.contains_key("transforms") {
        stream.transforms = defaults.transforms.clone();
    }
    if !present.contains_key("columns") {
        stream.columns = defaults.columns.clone();
    }
    if !present.contains_key("hooks") {
        stream.hooks = defaults.hooks.clone();
    }

    // option bags merge one level deep
    match &mut stream.source_options {
        None => {
            stream.source_options =
                Some(defaults.source_options.clone().unwrap_or_default());
        }
        Some(opts) => {
            if let Some(default_opts) = &defaults.source_options {
                opts.merge_defaults(default_opts);
            }
        }
    }
    match &mut stream.target_options {
        None => {
            stream.target_options =
                Some(defaults.target_options.clone().unwrap_or_default());
        }
        Some(opts) => {
            if let Some(default_opts) = &defaults.target_options {
                opts.merge_defaults(default_opts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::unmarshal_replication;
    use ferry_types::{KeyRef, Mode};

    fn defaulted(yaml: &str, name: &str) -> StreamConfig {
        let rd = unmarshal_replication(yaml).unwrap();
        let mut stream = rd.streams[name].clone().unwrap_or_default();
        set_stream_defaults(name, &mut stream, &rd);
        stream
    }

    #[test]
    fn absent_fields_inherit_defaults() {
        let yaml = "\
source: pg
target: snow
defaults:
  mode: full-refresh
  object: '{target_schema}.{stream_table}'
  primary_key: [id]
  tags: [core]
streams:
  public.users:
";
        let stream = defaulted(yaml, "public.users");
        assert_eq!(stream.mode, Mode::FullRefresh);
        assert_eq!(stream.object, "{target_schema}.{stream_table}");
        assert_eq!(stream.primary_key, Some(KeyRef::Many(vec!["id".into()])));
        assert_eq!(stream.tags, vec!["core"]);
        assert_eq!(stream.single, Some(false));
    }

    #[test]
    fn present_zero_values_are_not_overwritten() {
        let yaml = "\
source: pg
target: snow
defaults:
  mode: full-refresh
  where: deleted_at is null
streams:
  public.users:
    mode: \"\"
    where: \"\"
";
        let stream = defaulted(yaml, "public.users");
        assert!(stream.mode.is_unspecified());
        assert!(stream.where_.is_empty());
    }

    #[test]
    fn stream_values_beat_defaults() {
        let yaml = "\
source: pg
target: snow
defaults:
  object: '{target_schema}.{stream_schema}_{stream_table}'
  mode: full-refresh
streams:
  dbo.legal_entity:
    object: dbo.legal_entity
";
        let stream = defaulted(yaml, "dbo.legal_entity");
        assert_eq!(stream.object, "dbo.legal_entity");
        assert_eq!(stream.mode, Mode::FullRefresh);
    }

    #[test]
    fn option_bags_deep_merge_per_field() {
        let yaml = "\
source: pg
target: snow
defaults:
  source_options:
    limit: 1000
    header: true
  target_options:
    file_max_rows: 500000
streams:
  public.users:
    source_options:
      limit: 10
";
        let stream = defaulted(yaml, "public.users");
        let src = stream.source_options.unwrap();
        assert_eq!(src.limit, Some(10), "stream field wins");
        assert_eq!(src.header, Some(true), "unset field inherits");
        let tgt = stream.target_options.unwrap();
        assert_eq!(tgt.file_max_rows, Some(500_000), "absent bag clones defaults");
    }

    #[test]
    fn null_stream_inherits_everything() {
        let yaml = "\
source: pg
target: snow
defaults:
  mode: incremental
  update_key: updated_at
  single: true
streams:
  public.events:
";
        let stream = defaulted(yaml, "public.events");
        assert_eq!(stream.mode, Mode::Incremental);
        assert_eq!(stream.update_key, "updated_at");
        assert_eq!(stream.single, Some(true));
    }
}
