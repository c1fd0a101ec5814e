//! Volume spec parser and graph loader (§4.3).
//!
//! `volume NAME ... type TYPE ... option KEY VALUE ... subvolumes NAME1
//! NAME2 ... end-volume` blocks, resolved into a tree of [`Translator`]s,
//! then driven through post-order `init` and a `PARENT_UP` notify.

mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{Context, OptionOverride};
use crate::dict::Dict;
use crate::frame::NotifyEvent;
use crate::types::errors::{FuseResult, PosixError};
use crate::xlator::{registry, Translator};

pub use parser::{parse_spec, ParsedVolume};

/// Parses `text`, resolves `subvolumes` references into a tree, applies
/// `--volume-name`/command-line overrides, instantiates every translator
/// from the [`registry`], and returns the root node — without running
/// `init`/`notify` (see [`load_and_start`] for the full sequence).
pub fn build_graph(text: &str, ctx: &Context) -> FuseResult<Arc<Translator>> {
    let volumes = parse_spec(text)?;
    if volumes.is_empty() {
        return Err(PosixError::new(libc::EINVAL, "volume spec declares no volumes"));
    }
    let by_name: HashMap<&str, &ParsedVolume> = volumes.iter().map(|v| (v.name.as_str(), v)).collect();

    // `subvolumes` must only reference previously declared volumes (§4.3).
    for (i, v) in volumes.iter().enumerate() {
        for sub in &v.subvolumes {
            let pos = volumes.iter().position(|o| &o.name == sub).ok_or_else(|| {
                PosixError::new(libc::EINVAL, format!("volume '{}' references undeclared subvolume '{}'", v.name, sub))
            })?;
            if pos >= i {
                return Err(PosixError::new(
                    libc::EINVAL,
                    format!("volume '{}' references '{}' before it is declared", v.name, sub),
                ));
            }
        }
    }

    let top_name = ctx
        .volume_name
        .clone()
        .unwrap_or_else(|| volumes.last().unwrap().name.clone());
    if !by_name.contains_key(top_name.as_str()) {
        return Err(PosixError::new(libc::EINVAL, format!("unknown top volume '{}'", top_name)));
    }

    let mut built: HashMap<String, Arc<Translator>> = HashMap::new();
    for v in &volumes {
        instantiate(v, &by_name, ctx, &mut built)?;
    }
    built
        .get(&top_name)
        .cloned()
        .ok_or_else(|| PosixError::new(libc::EINVAL, "top volume failed to build"))
}

fn instantiate<'a>(
    v: &'a ParsedVolume,
    by_name: &HashMap<&'a str, &'a ParsedVolume>,
    ctx: &Context,
    built: &mut HashMap<String, Arc<Translator>>,
) -> FuseResult<Arc<Translator>> {
    if let Some(node) = built.get(&v.name) {
        return Ok(node.clone());
    }

    let options = Dict::new();
    for (k, val) in &v.options {
        options.set(k.clone(), val.clone());
    }
    for (key, value) in ctx.overrides_for(&v.name) {
        options.set(key, value);
    }

    let node = registry::build(&v.name, &v.type_name, options)
        .ok_or_else(|| PosixError::new(libc::EINVAL, format!("unknown translator type '{}' for volume '{}'", v.type_name, v.name)))?;

    for sub in &v.subvolumes {
        let sub_parsed = by_name
            .get(sub.as_str())
            .ok_or_else(|| PosixError::new(libc::EINVAL, format!("volume '{}' references undeclared subvolume '{}'", v.name, sub)))?;
        let child = instantiate(sub_parsed, by_name, ctx, built)?;
        node.add_child(child);
    }

    built.insert(v.name.clone(), node.clone());
    Ok(node)
}

/// Walks the graph in post-order (leaves first) calling `init`; on any
/// failure the walk stops and already-initialized translators have `fini`
/// called in reverse order (§4.3).
pub fn init_graph(root: &Arc<Translator>, ctx: &Context) -> FuseResult<()> {
    let mut initialized = Vec::new();
    let result = init_post_order(root, ctx, &mut initialized);
    if result.is_err() {
        for node in initialized.into_iter().rev() {
            node.impl_.fini(&node);
        }
    }
    result
}

fn init_post_order(node: &Arc<Translator>, ctx: &Context, initialized: &mut Vec<Arc<Translator>>) -> FuseResult<()> {
    for child in node.children() {
        init_post_order(&child, ctx, initialized)?;
    }
    node.impl_.init(node, ctx)?;
    node.set_ready();
    initialized.push(node.clone());
    Ok(())
}

/// Delivers `notify(root, PARENT_UP)`; per §4.3 each translator that
/// receives it forwards `CHILD_UP` to its own parent once ready (the
/// forwarding itself lives in the `Xlator::notify` default body).
pub fn notify_parent_up(root: &Arc<Translator>) {
    if let Err(e) = root.impl_.notify(root, NotifyEvent::ParentUp) {
        log::warn!("{}: notify(PARENT_UP) failed: {}", root.name, e);
    }
}

/// Parses, builds, initializes, and starts a graph from spec text in one
/// call — the sequence §4.3 describes end to end.
pub fn load_and_start(text: &str, ctx: &Context) -> FuseResult<Arc<Translator>> {
    let root = build_graph(text, ctx)?;
    init_graph(&root, ctx)?;
    notify_parent_up(&root);
    ctx.set_graph_root(root.clone());
    Ok(root)
}

/// Also usable for `--xlator-option` validation (§10.3): parses a single
/// `VOL.KEY=VALUE` triple.
pub fn parse_option_override(s: &str) -> Option<OptionOverride> {
    let (vol_key, value) = s.split_once('=')?;
    let (volume, key) = vol_key.split_once('.')?;
    Some(OptionOverride {
        volume: volume.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_the_same_spec_twice_yields_isomorphic_trees() {
        let dir = tempfile::tempdir().unwrap();
        let spec = format!(
            "volume leaf\n  type storage/kv\n  option directory {}\nend-volume\n",
            dir.path().display()
        );
        let ctx1 = Context::new(vec![], None);
        let ctx2 = Context::new(vec![], None);
        let g1 = build_graph(&spec, &ctx1).unwrap();
        let g2 = build_graph(&spec, &ctx2).unwrap();
        assert_eq!(g1.name, g2.name);
        assert_eq!(g1.type_name, g2.type_name);
        assert_eq!(g1.children().len(), g2.children().len());
    }

    #[test]
    fn unknown_subvolume_reference_is_rejected() {
        let ctx = Context::new(vec![], None);
        let spec = "volume top\n  type mount/fuse\n  subvolumes ghost\nend-volume\n";
        assert!(build_graph(spec, &ctx).is_err());
    }

    #[test]
    fn xlator_option_override_shadows_file_level_option() {
        let dir = tempfile::tempdir().unwrap();
        let spec = format!(
            "volume leaf\n  type storage/kv\n  option directory {}\n  option bctx-table-size 16\nend-volume\n",
            dir.path().display()
        );
        let overrides = vec![parse_option_override("leaf.bctx-table-size=7").unwrap()];
        let ctx = Context::new(overrides, None);
        let root = build_graph(&spec, &ctx).unwrap();
        assert_eq!(root.options.get_str("bctx-table-size").as_deref(), Some("7"));
    }

    #[test]
    fn volume_name_override_picks_a_non_last_top() {
        let dir = tempfile::tempdir().unwrap();
        let spec = format!(
            "volume leaf\n  type storage/kv\n  option directory {}\nend-volume\n\nvolume top\n  type mount/fuse\n  subvolumes leaf\nend-volume\n",
            dir.path().display()
        );
        let ctx = Context::new(vec![], Some("leaf".to_string()));
        let root = build_graph(&spec, &ctx).unwrap();
        assert_eq!(root.name, "leaf");
    }
}
