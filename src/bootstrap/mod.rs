//! Process bootstrap (§6): CLI parsing, logging/daemonization, and the
//! `mount/fuse` translator that bridges the graph to `fuser`.

pub mod cli;
pub mod daemon;
pub mod fuse_top;
pub mod logging;

use std::fs;
use std::sync::Arc;

use fuser::MountOption;

use crate::context::Context;
use crate::dict::Dict;
use crate::graph;
use crate::specfetch::{self, SpecServerConfig};
use crate::types::errors::{FuseResult, PosixError};
use crate::xlator::{registry, Translator};

use cli::CliArgs;
use fuse_top::FuseBridge;

/// Obtains the volume spec text, either from a local file or by running the
/// fork-based spec-fetch protocol against `--specfile-server` (§4.5, §6).
pub fn resolve_spec_text(args: &CliArgs) -> FuseResult<String> {
    if let Some(host) = &args.specfile_server {
        let cfg = SpecServerConfig {
            host: host.clone(),
            port: args.specfile_server_port,
            transport: args.specfile_server_transport.clone(),
        };
        let mut file = specfetch::fetch_spec(&cfg)?;
        let mut text = String::new();
        std::io::Read::read_to_string(&mut file, &mut text).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
        Ok(text)
    } else {
        fs::read_to_string(&args.volume_specfile).map_err(|e| PosixError::new(libc::ENOENT, format!("reading {}: {e}", args.volume_specfile)))
    }
}

/// Applies the mount-related CLI flags onto the graph root's options, when
/// the root happens to be a `mount/fuse` volume, before `init` runs. This
/// is how `--directory-entry-timeout`/`--attribute-timeout`/`--nodev`/
/// `--nosuid`/`--disable-direct-io-mode`/the positional mountpoint reach the
/// translator without requiring the spec file to spell them out itself.
pub fn apply_mount_overrides(root: &Arc<Translator>, args: &CliArgs) {
    if root.type_name != "mount/fuse" {
        return;
    }
    if let Some(mp) = &args.mountpoint {
        root.options.set("mount-point", mp.clone());
    }
    root.options.set("entry-timeout", args.directory_entry_timeout.to_string());
    root.options.set("attribute-timeout", args.attribute_timeout.to_string());
    root.options.set("nodev", if args.nodev { "on" } else { "off" });
    root.options.set("nosuid", if args.nosuid { "on" } else { "off" });
    root.options.set("direct-io", if args.disable_direct_io_mode { "off" } else { "on" });
}

/// Synthesizes a `fuse` `mount/fuse` node wrapping `root` as its sole child,
/// when `root` is not itself a `mount/fuse` volume and a mountpoint was
/// given on the command line (§1/§2 "optionally inserts the FUSE-mount top
/// translator"; §8 scenario 1). A leaf-only spec file — e.g. a bare
/// `storage/kv` volume with the mountpoint supplied positionally — relies on
/// this rather than having to spell out a `mount/fuse` volume itself.
fn wrap_with_fuse_top(root: Arc<Translator>, args: &CliArgs) -> Arc<Translator> {
    if root.type_name == "mount/fuse" {
        return root;
    }
    let Some(mountpoint) = &args.mountpoint else {
        return root;
    };

    let options = Dict::new();
    options.set("mount-point", mountpoint.clone());
    let top = registry::build("fuse", "mount/fuse", options).expect("mount/fuse is a builtin translator type");
    top.add_child(root);
    top
}

/// Builds and initializes the translator graph from `args`, wiring the
/// spec-fetch/local-file choice and the CLI-derived mount overrides, then
/// drives the full FUSE event loop to completion (the call blocks until the
/// filesystem is unmounted).
///
/// Returns the constructed [`Context`] on a clean build-and-init even if the
/// FUSE loop itself is skipped (no mountpoint resolved) — dry runs for
/// spec-fetch-only invocations rely on this.
pub fn run(args: &CliArgs) -> FuseResult<Arc<Context>> {
    let text = resolve_spec_text(args)?;
    let overrides = args.parsed_xlator_options().map_err(|e| PosixError::new(libc::EINVAL, e))?;
    let ctx = Context::new(overrides, args.volume_name.clone());

    let root = graph::build_graph(&text, &ctx)?;
    let root = wrap_with_fuse_top(root, args);
    apply_mount_overrides(&root, args);
    graph::init_graph(&root, &ctx)?;
    graph::notify_parent_up(&root);
    ctx.set_graph_root(root.clone());

    if root.type_name == "mount/fuse" {
        run_fuse_loop(&root, &ctx, args)?;
    } else {
        log::info!("top volume '{}' is not a mount/fuse volume; skipping the FUSE event loop", root.name);
    }

    Ok(ctx)
}

fn run_fuse_loop(root: &Arc<Translator>, ctx: &Context, _args: &CliArgs) -> FuseResult<()> {
    let mount_config = ctx
        .fuse_mount_config()
        .ok_or_else(|| PosixError::new(libc::EINVAL, "mount/fuse volume did not publish its mount configuration"))?;

    let mut options = vec![MountOption::FSName("xlatefs".to_string())];
    options.push(if mount_config.nodev { MountOption::NoDev } else { MountOption::Dev });
    options.push(if mount_config.nosuid { MountOption::NoSuid } else { MountOption::Suid });

    let bridge = FuseBridge::new(root.clone(), Arc::clone(&ctx.frame_pool), mount_config.entry_timeout, mount_config.attr_timeout);
    fuser::mount2(bridge, &mount_config.mountpoint, &options).map_err(|e| PosixError::new(e.raw_os_error().unwrap_or(libc::EIO), e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn resolve_spec_text_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.vol");
        fs::write(&path, "volume leaf\n  type storage/kv\nend-volume\n").unwrap();
        let args = CliArgs::try_parse_from(["xlatefsd", "--volume-specfile", path.to_str().unwrap()]).unwrap();
        let text = resolve_spec_text(&args).unwrap();
        assert!(text.contains("storage/kv"));
    }

    /// §8 scenario 1: a bare leaf spec with a positional mountpoint gets
    /// wrapped with a synthesized `fuse` `mount/fuse` top whose mount-point
    /// resolves to the positional argument, and both nodes init cleanly.
    #[test]
    fn leaf_only_spec_is_wrapped_with_a_fuse_top() {
        let export_dir = tempfile::tempdir().unwrap();
        let spec_dir = tempfile::tempdir().unwrap();
        let spec_path = spec_dir.path().join("test.vol");
        fs::write(&spec_path, format!("volume leaf\n  type storage/kv\n  option directory {}\nend-volume\n", export_dir.path().display())).unwrap();

        let args = CliArgs::try_parse_from(["xlatefsd", "--volume-specfile", spec_path.to_str().unwrap(), "/mnt/x"]).unwrap();
        let overrides = args.parsed_xlator_options().unwrap();
        let ctx = Context::new(overrides, args.volume_name.clone());

        let text = resolve_spec_text(&args).unwrap();
        let root = graph::build_graph(&text, &ctx).unwrap();
        assert_eq!(root.type_name, "storage/kv");

        let root = wrap_with_fuse_top(root, &args);
        assert_eq!(root.type_name, "mount/fuse");
        assert_eq!(root.name, "fuse");
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].type_name, "storage/kv");

        apply_mount_overrides(&root, &args);
        graph::init_graph(&root, &ctx).unwrap();
        graph::notify_parent_up(&root);

        let mount_config = ctx.fuse_mount_config().unwrap();
        assert_eq!(mount_config.mountpoint, "/mnt/x");
    }

    #[test]
    fn wrap_with_fuse_top_is_a_no_op_without_a_mountpoint() {
        let dir = tempfile::tempdir().unwrap();
        let spec = format!("volume leaf\n  type storage/kv\n  option directory {}\nend-volume\n", dir.path().display());
        let args = CliArgs::try_parse_from(["xlatefsd"]).unwrap();
        let ctx = Context::new(vec![], None);
        let root = graph::build_graph(&spec, &ctx).unwrap();
        let root = wrap_with_fuse_top(root, &args);
        assert_eq!(root.type_name, "storage/kv");
    }
}
