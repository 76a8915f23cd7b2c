//! Registry builder: the merged, sorted list of skills across all roots.
//!
//! Roots are folded lowest priority first into an id-keyed map, so the copy
//! from the highest-priority root that has a given id wins. Nothing is
//! cached; every call rescans the disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::defaults::{MergedDefaults, merge_defaults};
use crate::error::Result;
use crate::manifest::{MANIFEST_FILE, read_manifest};
use crate::roots::{RootKind, SkillRoots};
use crate::scanner::list_skill_dirs;
use crate::state::EnableStateMap;
use crate::types::SkillRecord;

/// The directory that provides `id`, with the kind of root it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSkill {
    pub kind: RootKind,
    pub dir: PathBuf,
}

/// Fold every root's shallow scan into `id -> winning copy`.
pub fn resolve_skills(roots: &SkillRoots) -> BTreeMap<String, ResolvedSkill> {
    let mut winners = BTreeMap::new();
    for root in roots.by_priority() {
        for dir in list_skill_dirs(&root.path) {
            let Some(id) = skill_id(&dir) else {
                continue;
            };
            if let Some(previous) = winners.insert(
                id.clone(),
                ResolvedSkill {
                    kind: root.kind,
                    dir,
                },
            ) {
                tracing::debug!(
                    skill = %id,
                    overridden = %previous.kind,
                    by = %root.kind,
                    "skill overridden by higher-priority root"
                );
            }
        }
    }
    winners
}

/// Winning copy of a single skill.
pub fn find_skill(roots: &SkillRoots, id: &str) -> Option<ResolvedSkill> {
    resolve_skills(roots).remove(id)
}

/// Ids present in the bundled root.
pub fn builtin_ids(roots: &SkillRoots) -> BTreeSet<String> {
    roots
        .bundled
        .as_deref()
        .map(|bundled| list_skill_dirs(bundled).iter().filter_map(|d| skill_id(d)).collect())
        .unwrap_or_default()
}

/// Build the full registry, sorted by `(order, name)`.
pub fn build_registry(roots: &SkillRoots, state: &EnableStateMap) -> Vec<SkillRecord> {
    let ordered: Vec<_> = roots.by_priority();
    let defaults = merge_defaults(ordered.iter().map(|r| r.path.as_path()));
    let builtin = builtin_ids(roots);

    let mut records: Vec<SkillRecord> = resolve_skills(roots)
        .into_iter()
        .filter_map(|(id, resolved)| {
            match load_record(&id, &resolved, &defaults, state, builtin.contains(&id)) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        skill = %id,
                        path = %resolved.dir.display(),
                        error = %e,
                        "skipping unreadable skill"
                    );
                    None
                }
            }
        })
        .collect();

    records.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    tracing::debug!(count = records.len(), "skill registry built");
    records
}

fn load_record(
    id: &str,
    resolved: &ResolvedSkill,
    defaults: &MergedDefaults,
    state: &EnableStateMap,
    is_built_in: bool,
) -> Result<SkillRecord> {
    let manifest_path = std::path::absolute(resolved.dir.join(MANIFEST_FILE))?;
    let modified = std::fs::metadata(&manifest_path)?.modified()?;
    let manifest = read_manifest(&manifest_path)?;

    let name = manifest.name_or(id);
    let declared = defaults.get(id);
    let enabled = state
        .get(id)
        .map(|s| s.enabled)
        .unwrap_or_else(|| declared.enabled());

    Ok(SkillRecord {
        id: id.to_owned(),
        description: manifest.description_or(&name),
        enabled,
        is_official: manifest.is_official(),
        is_built_in,
        updated_at: DateTime::<Utc>::from(modified).to_rfc3339(),
        prompt: manifest.prompt().to_owned(),
        skill_path: manifest_path,
        order: declared.order(),
        root_kind: resolved.kind,
        name,
    })
}

/// Directory basename as a skill id.
pub fn skill_id(dir: &Path) -> Option<String> {
    dir.file_name().map(|n| n.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DEFAULTS_FILE;
    use crate::state::SkillState;

    fn make_skill(root: &Path, id: &str, manifest: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        dir
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        roots: SkillRoots,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let roots = SkillRoots {
            primary: tmp.path().join("primary"),
            external: Some(tmp.path().join("external")),
            bundled: Some(tmp.path().join("bundled")),
        };
        for dir in [&roots.primary, roots.external.as_ref().unwrap(), roots.bundled.as_ref().unwrap()] {
            std::fs::create_dir_all(dir).unwrap();
        }
        Fixture { _tmp: tmp, roots }
    }

    #[test]
    fn highest_priority_copy_wins() {
        let f = fixture();
        let bundled = f.roots.bundled.as_deref().unwrap();
        let external = f.roots.external.as_deref().unwrap();
        make_skill(bundled, "shared", "---\nname: Bundled\n---\nfrom bundled");
        make_skill(external, "shared", "---\nname: External\n---\nfrom external");
        make_skill(external, "ext-only", "---\nname: Ext\n---\n");
        make_skill(bundled, "both", "---\nname: Both bundled\n---\n");
        make_skill(&f.roots.primary, "both", "---\nname: Both primary\n---\nmine");

        let records = build_registry(&f.roots, &EnableStateMap::new());
        let by_id: BTreeMap<_, _> = records.iter().map(|r| (r.id.as_str(), r)).collect();

        assert_eq!(by_id["shared"].name, "External");
        assert_eq!(by_id["shared"].root_kind, RootKind::External);
        assert!(by_id["shared"].is_built_in);
        assert_eq!(by_id["both"].name, "Both primary");
        assert_eq!(by_id["both"].prompt, "mine");
        assert_eq!(by_id["both"].root_kind, RootKind::Primary);
        assert!(by_id["both"].is_built_in);
        assert!(!by_id["ext-only"].is_built_in);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn sorted_by_order_then_name() {
        let f = fixture();
        make_skill(&f.roots.primary, "zeta", "---\nname: Zeta\n---\n");
        make_skill(&f.roots.primary, "alpha", "---\nname: Alpha\n---\n");
        make_skill(&f.roots.primary, "late", "---\nname: AAA\n---\n");
        std::fs::write(
            f.roots.bundled.as_deref().unwrap().join(DEFAULTS_FILE),
            r#"{"defaults":{"zeta":{"order":1},"late":{"order":1000}}}"#,
        )
        .unwrap();

        let ids: Vec<_> = build_registry(&f.roots, &EnableStateMap::new())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["zeta", "alpha", "late"]);
    }

    #[test]
    fn enabled_prefers_state_then_defaults() {
        let f = fixture();
        make_skill(&f.roots.primary, "a", "x");
        make_skill(&f.roots.primary, "b", "x");
        make_skill(&f.roots.primary, "c", "x");
        std::fs::write(
            f.roots.primary.join(DEFAULTS_FILE),
            r#"{"defaults":{"a":{"enabled":false},"b":{"enabled":false}}}"#,
        )
        .unwrap();
        let mut state = EnableStateMap::new();
        state.insert("b".into(), SkillState { enabled: true });

        let records = build_registry(&f.roots, &state);
        let enabled: BTreeMap<_, _> = records.iter().map(|r| (r.id.clone(), r.enabled)).collect();
        assert!(!enabled["a"]);
        assert!(enabled["b"]);
        assert!(enabled["c"]);
    }

    #[test]
    fn record_fields_from_manifest() {
        let f = fixture();
        let dir = make_skill(&f.roots.primary, "demo", "---\nname: Demo\nofficial: true\n---\nHello world");

        let records = build_registry(&f.roots, &EnableStateMap::new());
        let r = &records[0];
        assert_eq!(r.name, "Demo");
        assert_eq!(r.description, "Hello world");
        assert!(r.is_official);
        assert_eq!(r.order, 999);
        assert!(r.skill_path.is_absolute());
        assert!(r.skill_path.ends_with("demo/SKILL.md"));
        assert!(DateTime::parse_from_rfc3339(&r.updated_at).is_ok());
        assert_eq!(find_skill(&f.roots, "demo").unwrap().dir, dir);

        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["isBuiltIn"], false);
        assert_eq!(json["rootKind"], "primary");
        assert!(json.get("skillPath").is_some());
    }

    #[test]
    fn unreadable_skill_is_skipped() {
        let f = fixture();
        make_skill(&f.roots.primary, "good", "x");
        let bad = f.roots.primary.join("bad");
        std::fs::create_dir(&bad).unwrap();
        std::fs::write(bad.join(MANIFEST_FILE), [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let records = build_registry(&f.roots, &EnableStateMap::new());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "good");
    }
}
