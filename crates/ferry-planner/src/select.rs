//! Selection algebra: literal names, glob patterns, and tag filters
//! resolved against the expanded stream set.

use indexmap::IndexSet;
use regex::Regex;

use ferry_types::StreamConfig;

use crate::error::PlanError;
use crate::replication::ReplicationConfig;
use crate::ENV_STREAM_COUNT;

/// A resolved selection vector: the positive set (normalised keys) plus
/// the tag filters still to be applied per stream.
#[derive(Debug, Default)]
pub(crate) struct Selection {
    pub empty: bool,
    pub matched: IndexSet<String>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
}

impl Selection {
    /// Resolve the non-tag tokens against the stream set and split out the
    /// tag filters. Supplying both include and exclude tags is an error.
    ///
    /// Only name tokens and include-tag matches populate the positive set;
    /// exclude tags can only remove entries from it.
    pub fn resolve(
        rd: &ReplicationConfig,
        select_streams: &[String],
    ) -> Result<Self, PlanError> {
        let mut selection = Selection {
            empty: select_streams.is_empty(),
            ..Selection::default()
        };

        for token in select_streams {
            if let Some(tag) = token.strip_prefix("tag:") {
                selection.include_tags.push(tag.to_string());
            } else if let Some(tag) = token.strip_prefix("-tag:") {
                selection.exclude_tags.push(tag.to_string());
            } else {
                for key in rd.match_streams(token) {
                    selection.matched.insert(ReplicationConfig::normalize(&key));
                }
            }
        }

        if !selection.include_tags.is_empty() && !selection.exclude_tags.is_empty() {
            return Err(PlanError::ConflictingTags);
        }

        Ok(selection)
    }

    /// Apply the tag filters for one stream, using its defaulted tags.
    pub fn adjust_for_tags(&mut self, normalized_key: &str, stream: &StreamConfig) {
        if self
            .include_tags
            .iter()
            .any(|tag| stream.tags.iter().any(|t| t == tag))
        {
            self.matched.insert(normalized_key.to_string());
        }
        if self
            .exclude_tags
            .iter()
            .any(|tag| stream.tags.iter().any(|t| t == tag))
        {
            self.matched.shift_remove(normalized_key);
        }
    }

    pub fn is_selected(&self, normalized_key: &str) -> bool {
        self.empty || self.matched.contains(normalized_key)
    }
}

/// Case-insensitive glob match with `*` and `?`.
pub(crate) fn matches_glob(pattern: &str, text: &str) -> bool {
    let Some(re) = glob_regex(&pattern.to_lowercase()) else {
        return false;
    };
    re.is_match(&text.to_lowercase())
}

fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 2);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Check the compiled stream count against the `FERRY_STREAM_CNT`
/// assertion, when set. Accepts `N` (exact) or `>N` (at least).
pub(crate) fn assert_stream_count(
    stream_cnt: usize,
    matched: &[String],
    candidates: &[String],
) -> Result<(), PlanError> {
    let Ok(expected) = std::env::var(ENV_STREAM_COUNT) else {
        return Ok(());
    };
    if expected.is_empty() {
        return Ok(());
    }

    let detail = || {
        let mut all: Vec<&String> = matched.iter().collect();
        all.extend(candidates.iter());
        serde_json::to_string(&all).unwrap_or_default()
    };

    if let Some(at_least) = expected.strip_prefix('>') {
        let n: usize = at_least.trim().parse().unwrap_or(0);
        if stream_cnt <= n {
            return Err(PlanError::Assertion {
                expected: format!("more than {n}"),
                got: stream_cnt,
                candidates: detail(),
            });
        }
        return Ok(());
    }

    let n: usize = expected.trim().parse().unwrap_or(0);
    if stream_cnt != n {
        return Err(PlanError::Assertion {
            expected: n.to_string(),
            got: stream_cnt,
            candidates: detail(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::unmarshal_replication;

    fn config() -> ReplicationConfig {
        unmarshal_replication(
            "\
source: pg
target: snow
streams:
  public.users:
    tags: [x]
  public.orders:
    tags: [y]
  sales.leads:
    tags: [x, z]
",
        )
        .unwrap()
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn glob_matching_is_case_insensitive() {
        assert!(matches_glob("public.*", "public.users"));
        assert!(matches_glob("PUBLIC.?SERS", "public.users"));
        assert!(!matches_glob("public.*", "sales.leads"));
    }

    #[test]
    fn empty_vector_selects_everything() {
        let rd = config();
        let selection = Selection::resolve(&rd, &[]).unwrap();
        assert!(selection.is_selected("public.users"));
        assert!(selection.is_selected("anything"));
    }

    #[test]
    fn name_and_glob_tokens_build_positive_set() {
        let rd = config();
        let selection =
            Selection::resolve(&rd, &tokens(&["sales.leads", "public.*"])).unwrap();
        assert_eq!(selection.matched.len(), 3);
        assert!(selection.is_selected("public.orders"));
    }

    #[test]
    fn conflicting_tags_rejected() {
        let rd = config();
        let err = Selection::resolve(&rd, &tokens(&["tag:x", "-tag:y"])).unwrap_err();
        assert!(matches!(err, PlanError::ConflictingTags));
    }

    #[test]
    fn include_tags_admit_streams() {
        let rd = config();
        let mut selection = Selection::resolve(&rd, &tokens(&["tag:x"])).unwrap();
        for (name, cfg) in &rd.streams {
            selection.adjust_for_tags(
                &ReplicationConfig::normalize(name),
                cfg.as_ref().unwrap(),
            );
        }
        assert!(selection.is_selected("public.users"));
        assert!(!selection.is_selected("public.orders"));
        assert!(selection.is_selected("sales.leads"));
    }

    #[test]
    fn exclude_only_vector_selects_nothing() {
        let rd = config();
        let mut selection = Selection::resolve(&rd, &tokens(&["-tag:x"])).unwrap();
        for (name, cfg) in &rd.streams {
            selection.adjust_for_tags(
                &ReplicationConfig::normalize(name),
                cfg.as_ref().unwrap(),
            );
        }
        // exclusions only remove from the positive set, and nothing added it
        assert!(!selection.is_selected("public.users"));
        assert!(!selection.is_selected("public.orders"));
        assert!(!selection.is_selected("sales.leads"));
    }

    #[test]
    fn exclude_tags_remove_from_named_positive_set() {
        let rd = config();
        let mut selection =
            Selection::resolve(&rd, &tokens(&["public.*", "-tag:y"])).unwrap();
        for (name, cfg) in &rd.streams {
            selection.adjust_for_tags(
                &ReplicationConfig::normalize(name),
                cfg.as_ref().unwrap(),
            );
        }
        assert!(selection.is_selected("public.users"));
        assert!(!selection.is_selected("public.orders"));
    }

    #[test]
    fn stream_count_assertion_exact_and_at_least() {
        let matched = vec!["a".to_string()];
        let inputs = vec!["a".to_string(), "b".to_string()];

        std::env::set_var(ENV_STREAM_COUNT, "2");
        assert!(assert_stream_count(2, &matched, &inputs).is_ok());
        let err = assert_stream_count(1, &matched, &inputs).unwrap_err();
        assert!(err.to_string().contains("expected 2 streams, got 1"));

        std::env::set_var(ENV_STREAM_COUNT, ">1");
        assert!(assert_stream_count(2, &matched, &inputs).is_ok());
        assert!(assert_stream_count(1, &matched, &inputs).is_err());

        std::env::remove_var(ENV_STREAM_COUNT);
        assert!(assert_stream_count(99, &matched, &inputs).is_ok());
    }
}
