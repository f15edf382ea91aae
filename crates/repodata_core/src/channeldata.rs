use std::collections::{BTreeMap, BTreeSet};

use repodata_types::{normalize_timestamp_seconds, ChannelDataDocument, Label, Shard, Version};
use serde_json::{Map, Value};

/// Scalar fields copied from a package's channeldata entry into the
/// aggregated per-name record. A newer-version candidate's present value
/// overwrites an older one; an absent value never clobbers a prior one.
const SCALAR_FIELDS: &[&str] = &[
    "description",
    "dev_url",
    "doc_url",
    "doc_source_url",
    "home",
    "license",
    "source_url",
    "source_git_url",
    "summary",
    "icon_url",
    "icon_hash",
    "tags",
    "identifiers",
    "keywords",
    "recipe_origin",
    "version",
];

/// Boolean fields OR-ed across every candidate merged into a name.
const BOOLEAN_FIELDS: &[&str] = &[
    "binary_prefix",
    "text_prefix",
    "activate.d",
    "deactivate.d",
    "pre_link",
    "post_link",
    "pre_unlink",
];

fn is_present(value: &Value) -> bool {
    !matches!(value, Value::Null) && value != &Value::String(String::new())
}

/// Folds every indexable shard carrying `label` into a channeldata
/// document — `channeldata.json` is published once per label, aggregated
/// across every subdir that label touches — one subdir's worth of shards
/// at a time (processed in subdir order), mirroring
/// `repoworker.py::update_channeldata_for_subdir`'s incremental-update
/// shape: each round decides which candidates are worth re-merging against
/// the accumulated record *as it stood before this round*, then merges
/// the accepted candidates in, updating the record as it goes.
pub fn fold_channeldata(shards: &[Shard], label: &Label) -> ChannelDataDocument {
    let mut document = ChannelDataDocument::new();
    let mut subdirs_seen: BTreeSet<String> = BTreeSet::new();

    let mut by_subdir: BTreeMap<String, Vec<&Shard>> = BTreeMap::new();
    for shard in shards {
        if shard.channeldata.is_none() || !shard.labels.contains(label) {
            continue;
        }
        by_subdir.entry(shard.subdir.as_str().to_string()).or_default().push(shard);
    }

    for (subdir, subdir_shards) in by_subdir {
        update_channeldata_for_subdir(&mut document, &subdir_shards, &subdir);
        subdirs_seen.insert(subdir);
    }

    document.subdirs = subdirs_seen.into_iter().collect();
    document
}

struct Candidate<'a> {
    name: String,
    version: Version,
    shard: &'a Shard,
}

/// Picks the shard with the newest `timestamp` in `group`, the filename
/// breaking ties, matching `sorted(group, key=timestamp, reverse=True)`'s
/// determinism requirement without depending on input order.
fn pick_candidate<'a>(group: &[&'a Shard]) -> &'a Shard {
    group
        .iter()
        .copied()
        .max_by(|a, b| {
            let ts_a = a.channeldata.as_ref().and_then(|c| c.get("timestamp")).and_then(Value::as_i64).unwrap_or(0);
            let ts_b = b.channeldata.as_ref().and_then(|c| c.get("timestamp")).and_then(Value::as_i64).unwrap_or(0);
            ts_a.cmp(&ts_b).then_with(|| a.package.cmp(&b.package))
        })
        .expect("group is non-empty")
}

/// Whether `candidate` is worth merging, given `package_data` as it stood
/// *before this subdir's round began* — name never seen, this subdir not
/// yet recorded for it, a strictly newer timestamp than previously known,
/// or (when the name already carries run_exports) this version's
/// run_exports not yet captured.
fn should_include(package_data: &BTreeMap<String, Value>, subdir: &str, candidate: &Candidate) -> bool {
    let Some(existing) = package_data.get(&candidate.name) else { return true };
    let subdirs_has = existing
        .get("subdirs")
        .and_then(Value::as_array)
        .is_some_and(|a| a.iter().any(|v| v.as_str() == Some(subdir)));
    if !subdirs_has {
        return true;
    }
    let existing_timestamp = existing.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
    let candidate_timestamp = candidate
        .shard
        .channeldata
        .as_ref()
        .and_then(|c| c.get("timestamp"))
        .and_then(Value::as_i64)
        .map(normalize_timestamp_seconds)
        .unwrap_or(0);
    if existing_timestamp < candidate_timestamp {
        return true;
    }
    let run_exports = existing.get("run_exports").and_then(Value::as_object);
    if let Some(run_exports) = run_exports {
        if !run_exports.is_empty() && !run_exports.contains_key(candidate.version.as_str()) {
            return true;
        }
    }
    false
}

fn update_channeldata_for_subdir(document: &mut ChannelDataDocument, shards: &[&Shard], subdir: &str) {
    let package_data_before = document.packages.clone();

    let mut by_name: BTreeMap<String, Vec<&Shard>> = BTreeMap::new();
    for shard in shards {
        if let Some(name) = package_name(shard) {
            by_name.entry(name).or_default().push(shard);
        }
    }

    let mut accepted: Vec<Candidate> = Vec::new();
    for (name, group) in &by_name {
        let already_seen = package_data_before.contains_key(name);
        let has_run_exports = package_data_before
            .get(name)
            .and_then(|r| r.get("run_exports"))
            .and_then(Value::as_object)
            .is_some_and(|m| !m.is_empty());

        if !already_seen || has_run_exports {
            let mut by_version: BTreeMap<Version, Vec<&Shard>> = BTreeMap::new();
            for shard in group {
                let version = shard_version(shard);
                by_version.entry(version).or_default().push(shard);
            }
            for (version, vgroup) in by_version {
                let shard = pick_candidate(&vgroup);
                let candidate = Candidate { name: name.clone(), version, shard };
                if should_include(&package_data_before, subdir, &candidate) {
                    accepted.push(candidate);
                }
            }
        } else {
            let shard = pick_candidate(group);
            let version = shard_version(shard);
            let candidate = Candidate { name: name.clone(), version, shard };
            if should_include(&package_data_before, subdir, &candidate) {
                accepted.push(candidate);
            }
        }
    }

    accepted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));

    for candidate in accepted {
        merge_candidate(document, subdir, &candidate);
    }
}

fn merge_candidate(document: &mut ChannelDataDocument, subdir: &str, candidate: &Candidate) {
    let Some(data) = candidate.shard.channeldata.as_ref() else { return };
    let mut existing = document.packages.remove(&candidate.name).unwrap_or_else(|| Value::Object(Map::new()));
    let Value::Object(record) = &mut existing else { unreachable!() };

    let existing_version = record.get("version").and_then(Value::as_str).map(Version::parse).unwrap_or_else(|| Version::parse("0"));
    let data_newer = candidate.version > existing_version;

    for field in SCALAR_FIELDS {
        let new_present = data.get(*field).map(is_present).unwrap_or(false);
        let existing_present = record.get(*field).map(is_present).unwrap_or(false);
        if new_present && (data_newer || !existing_present) {
            record.insert((*field).to_string(), data[*field].clone());
        }
    }

    for field in BOOLEAN_FIELDS {
        let new_value = data.get(*field).and_then(Value::as_bool).unwrap_or(false);
        let existing_value = record.get(*field).and_then(Value::as_bool).unwrap_or(false);
        record.insert((*field).to_string(), Value::Bool(new_value || existing_value));
    }

    let mut subdirs: BTreeSet<String> = record
        .get("subdirs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    subdirs.insert(subdir.to_string());
    record.insert("subdirs".to_string(), Value::Array(subdirs.into_iter().map(Value::String).collect()));

    let mut run_exports = record.get("run_exports").and_then(Value::as_object).cloned().unwrap_or_default();
    if let Some(re) = data.get("run_exports") {
        if is_present(re) {
            run_exports.insert(candidate.version.as_str().to_string(), re.clone());
        }
    }
    if !run_exports.is_empty() {
        record.insert("run_exports".to_string(), Value::Object(run_exports));
    }

    let existing_timestamp = record.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
    let new_timestamp = data.get("timestamp").and_then(Value::as_i64).map(normalize_timestamp_seconds).unwrap_or(0);
    let timestamp = existing_timestamp.max(new_timestamp);
    if timestamp > 0 {
        record.insert("timestamp".to_string(), Value::Number(timestamp.into()));
    }

    document.packages.insert(candidate.name.clone(), existing);
}

fn shard_version(shard: &Shard) -> Version {
    let version_str = shard.channeldata.as_ref().and_then(|c| c.get("version")).and_then(|v| v.as_str()).unwrap_or("0");
    Version::parse(version_str)
}

fn package_name(shard: &Shard) -> Option<String> {
    if let Some(name) = shard.channeldata.as_ref().and_then(|c| c.get("name")).and_then(|v| v.as_str()) {
        return Some(name.to_string());
    }
    shard
        .repodata
        .as_ref()
        .and_then(|r| r.get("name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodata_types::{Label, Subdir};

    fn shard_with_channeldata(subdir: &str, package: &str, channeldata: Value) -> Shard {
        let mut shard = Shard::null(Subdir::new(subdir), package.to_string(), Label::main(), "https://example".into());
        shard.repodata = Some(serde_json::json!({"name": channeldata.get("name").cloned().unwrap_or(Value::Null)}));
        shard.channeldata = Some(channeldata);
        shard
    }

    #[test]
    fn later_version_scalar_overwrites_earlier() {
        let shards = vec![
            shard_with_channeldata(
                "linux-64",
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "summary": "old summary"}),
            ),
            shard_with_channeldata(
                "linux-64",
                "foo-2.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "2.0", "summary": "new summary"}),
            ),
        ];
        let doc = fold_channeldata(&shards, &Label::main());
        assert_eq!(doc.packages["foo"]["summary"], "new summary");
    }

    #[test]
    fn absent_value_does_not_clobber_prior_value() {
        let shards = vec![
            shard_with_channeldata(
                "linux-64",
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "home": "https://foo.example"}),
            ),
            shard_with_channeldata(
                "linux-64",
                "foo-2.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "2.0"}),
            ),
        ];
        let doc = fold_channeldata(&shards, &Label::main());
        assert_eq!(doc.packages["foo"]["home"], "https://foo.example");
    }

    #[test]
    fn boolean_fields_are_ored() {
        let shards = vec![
            shard_with_channeldata(
                "linux-64",
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "binary_prefix": false}),
            ),
            shard_with_channeldata(
                "linux-64",
                "foo-2.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "2.0", "binary_prefix": true}),
            ),
        ];
        let doc = fold_channeldata(&shards, &Label::main());
        assert_eq!(doc.packages["foo"]["binary_prefix"], true);
    }

    #[test]
    fn subdirs_is_sorted_union() {
        let shards = vec![
            shard_with_channeldata("linux-64", "foo-1.0-0.tar.bz2", serde_json::json!({"name": "foo", "version": "1.0"})),
            shard_with_channeldata("osx-64", "foo-1.0-0.tar.bz2", serde_json::json!({"name": "foo", "version": "1.0"})),
        ];
        let doc = fold_channeldata(&shards, &Label::main());
        assert_eq!(doc.packages["foo"]["subdirs"], serde_json::json!(["linux-64", "osx-64"]));
        assert_eq!(doc.subdirs, vec!["linux-64".to_string(), "osx-64".to_string()]);
    }

    #[test]
    fn run_exports_is_keyed_by_version() {
        let shards = vec![
            shard_with_channeldata(
                "linux-64",
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "run_exports": {"weak": ["foo >=1.0"]}}),
            ),
            shard_with_channeldata(
                "linux-64",
                "foo-2.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "2.0", "run_exports": {"weak": ["foo >=2.0"]}}),
            ),
        ];
        let doc = fold_channeldata(&shards, &Label::main());
        let run_exports = &doc.packages["foo"]["run_exports"];
        assert!(run_exports.get("1.0").is_some());
        assert!(run_exports.get("2.0").is_some());
    }

    #[test]
    fn stale_subdir_without_new_timestamp_is_skipped() {
        let shards = vec![
            shard_with_channeldata(
                "linux-64",
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "summary": "first", "timestamp": 100}),
            ),
            shard_with_channeldata(
                "osx-64",
                "foo-1.0-0.tar.bz2",
                serde_json::json!({"name": "foo", "version": "1.0", "summary": "first", "timestamp": 100}),
            ),
        ];
        let doc = fold_channeldata(&shards, &Label::main());
        // linux-64 round seeds the record; osx-64 round is included (new subdir).
        assert_eq!(doc.packages["foo"]["subdirs"], serde_json::json!(["linux-64", "osx-64"]));
    }
}
