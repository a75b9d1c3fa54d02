//! The policy cache: which groups may sign with which key, rebuilt from a
//! directory of `.pub` files and a directory of YAML authorization files.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use arc_swap::ArcSwap;
use base64::Engine;

use crate::keys::Fingerprint;

/// `Fingerprint -> permitted group names`, as of the last successful
/// rebuild.
pub type PolicyMap = HashMap<Fingerprint, HashSet<String>>;

/// Holds the current `PolicyMap` behind an atomic pointer swap so readers
/// never observe a half-rebuilt map.
pub struct PolicyCache {
    current: ArcSwap<PolicyMap>,
}

impl PolicyCache {
    pub fn empty() -> Self {
        PolicyCache {
            current: ArcSwap::from_pointee(PolicyMap::new()),
        }
    }

    /// Groups permitted to use `fingerprint`, or an empty set if unknown.
    pub fn groups_for(&self, fingerprint: &Fingerprint) -> HashSet<String> {
        self.current
            .load()
            .get(fingerprint)
            .cloned()
            .unwrap_or_default()
    }

    /// Rebuild from `key_dir`/`auth_dir` and publish the result. Malformed
    /// individual files are logged and skipped; a bad file never aborts
    /// the whole rebuild.
    pub fn reload(&self, key_dir: &Path, auth_dir: &Path) {
        let names = load_key_names(key_dir);
        let map = build_policy_map(&names, auth_dir);
        tracing::info!(
            keys = names.len(),
            fingerprints = map.len(),
            "policy cache reloaded"
        );
        self.current.store(std::sync::Arc::new(map));
    }
}

/// name (file stem) -> fingerprint, from every `*.pub` file in `key_dir`.
fn load_key_names(key_dir: &Path) -> HashMap<String, Fingerprint> {
    let mut names = HashMap::new();
    let entries = match fs::read_dir(key_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %key_dir.display(), error = %err, "cannot read key directory");
            return names;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pub") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match parse_public_key_file(&path) {
            Ok(fingerprint) => {
                names.insert(stem.to_string(), fingerprint);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping malformed public key file");
            }
        }
    }
    names
}

fn parse_public_key_file(path: &Path) -> Result<Fingerprint, String> {
    let contents = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let line = contents.lines().next().ok_or("empty file")?;
    let mut fields = line.split_whitespace();
    let _algo = fields.next().ok_or("missing algorithm field")?;
    let encoded_blob = fields.next().ok_or("missing base64 blob field")?;
    let blob = base64::engine::general_purpose::STANDARD
        .decode(encoded_blob)
        .map_err(|e| e.to_string())?;
    Ok(Fingerprint::of_blob(&blob))
}

/// A single authorization file: group name -> key names, where a null
/// value means "no keys yet" rather than a parse error.
type AuthFile = BTreeMap<String, Option<Vec<String>>>;

fn build_policy_map(names: &HashMap<String, Fingerprint>, auth_dir: &Path) -> PolicyMap {
    let mut map = PolicyMap::new();

    let entries = match fs::read_dir(auth_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %auth_dir.display(), error = %err, "cannot read authorization directory");
            return map;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if !is_yaml {
            continue;
        }

        let file: AuthFile = match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_yaml::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping malformed authorization file");
                continue;
            }
        };

        for (group, key_names) in file {
            for key_name in key_names.unwrap_or_default() {
                match names.get(&key_name) {
                    Some(fingerprint) => {
                        map.entry(*fingerprint).or_default().insert(group.clone());
                    }
                    None => {
                        tracing::warn!(
                            file = %path.display(),
                            key = %key_name,
                            "authorization file references an unknown key name"
                        );
                    }
                }
            }
        }
    }

    map
}
