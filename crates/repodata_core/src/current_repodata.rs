use std::collections::BTreeMap;

use repodata_types::{RepoDataDocument, Version};
use serde_json::Value;

/// Derives `current_repodata.json` from a full repodata document: per
/// CEP 16, this keeps only the newest version of each package name (by
/// build, not by individual record) and drops anything carrying
/// `track_features`, since those are meant to be installed only when
/// explicitly requested. A kept record that pins a dependency to an
/// exact version older than that dependency's own newest kept version
/// also drags that older record back in — otherwise installing the kept
/// package from `current_repodata.json` alone would be unsatisfiable.
pub fn derive_current_repodata(full: &RepoDataDocument) -> RepoDataDocument {
    let mut newest: BTreeMap<String, Version> = BTreeMap::new();

    for (_filename, record) in full.packages.iter().chain(full.packages_conda.iter()) {
        if has_track_features(record) {
            continue;
        }
        let Some(name) = record.get("name").and_then(Value::as_str) else { continue };
        let Some(version_str) = record.get("version").and_then(Value::as_str) else {
            continue;
        };
        let version = Version::parse(version_str);
        newest
            .entry(name.to_string())
            .and_modify(|current| {
                if version > *current {
                    *current = version.clone();
                }
            })
            .or_insert(version);
    }

    let mut out = RepoDataDocument::new(full.info.subdir.clone());
    out.removed = full.removed.clone();

    for (filename, record) in &full.packages {
        if keep_in_current(record, &newest) {
            out.packages.insert(filename.clone(), record.clone());
        }
    }
    for (filename, record) in &full.packages_conda {
        if keep_in_current(record, &newest) {
            out.packages_conda.insert(filename.clone(), record.clone());
        }
    }

    pull_in_transitive_pins(full, &newest, &mut out);

    out
}

/// Walks the dependency specs of every record already kept and pulls in
/// any older record an exact-version pin references but the newest-only
/// pass dropped.
fn pull_in_transitive_pins(full: &RepoDataDocument, newest: &BTreeMap<String, Version>, out: &mut RepoDataDocument) {
    let mut pins = Vec::new();
    for record in out.packages.values().chain(out.packages_conda.values()) {
        collect_exact_pins(record, &mut pins);
    }

    for (name, version) in pins {
        if newest.get(&name).is_some_and(|v| *v == Version::parse(&version)) {
            continue;
        }
        for (filename, record) in &full.packages {
            if matches_name_version(record, &name, &version) {
                out.packages.entry(filename.clone()).or_insert_with(|| record.clone());
            }
        }
        for (filename, record) in &full.packages_conda {
            if matches_name_version(record, &name, &version) {
                out.packages_conda.entry(filename.clone()).or_insert_with(|| record.clone());
            }
        }
    }
}

fn matches_name_version(record: &Value, name: &str, version: &str) -> bool {
    record.get("name").and_then(Value::as_str) == Some(name) && record.get("version").and_then(Value::as_str) == Some(version)
}

fn collect_exact_pins(record: &Value, out: &mut Vec<(String, String)>) {
    for field in ["depends", "constrains"] {
        let Some(Value::Array(specs)) = record.get(field) else { continue };
        for spec in specs {
            if let Some(spec) = spec.as_str() {
                if let Some(pin) = parse_exact_pin(spec) {
                    out.push(pin);
                }
            }
        }
    }
}

/// Recognizes dependency specs of the shape `name ==1.2.3` or `name
/// 1.2.3` as an exact version pin; anything with a range operator or
/// wildcard is a normal constraint already satisfiable by the newest
/// version, and not treated as a pin.
fn parse_exact_pin(spec: &str) -> Option<(String, String)> {
    let mut parts = spec.split_whitespace();
    let name = parts.next()?.to_string();
    let constraint = parts.next()?;
    let version = constraint.strip_prefix("==").unwrap_or(constraint);
    if version.is_empty() || version.chars().any(|c| matches!(c, '*' | '>' | '<' | '|' | ',' | '!' | '=')) {
        return None;
    }
    Some((name, version.to_string()))
}

fn has_track_features(record: &Value) -> bool {
    record
        .get("track_features")
        .map(|v| match v {
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Null => false,
            _ => true,
        })
        .unwrap_or(false)
}

fn keep_in_current(record: &Value, newest: &BTreeMap<String, Version>) -> bool {
    if has_track_features(record) {
        return false;
    }
    let Some(name) = record.get("name").and_then(Value::as_str) else { return false };
    let Some(version_str) = record.get("version").and_then(Value::as_str) else { return false };
    match newest.get(name) {
        Some(newest_version) => Version::parse(version_str) == *newest_version,
        None => false,
    }
}
