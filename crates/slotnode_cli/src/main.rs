//! CLI smoke entry point.
//!
//! # Responsibility
//! - Start process logging the way an embedding host would.
//! - Verify `slotnode_core` linkage without an embedding host.
//! - Print the base `Node` root schema and a sample archive for inspection.
//!
//! Log settings come from `SLOTNODE_LOG_LEVEL` and `SLOTNODE_LOG_DIR`; the
//! directory defaults to `slotnode-logs` under the system temp directory.

use slotnode_core::{NodeTree, TypeRegistry, BASE_NODE_TYPE};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const LOG_LEVEL_ENV: &str = "SLOTNODE_LOG_LEVEL";
const LOG_DIR_ENV: &str = "SLOTNODE_LOG_DIR";
const DEFAULT_LOG_SUBDIR: &str = "slotnode-logs";

fn main() -> ExitCode {
    start_logging();
    println!("slotnode_core ping={}", slotnode_core::ping());
    println!("slotnode_core version={}", slotnode_core::core_version());

    let registry = match TypeRegistry::with_base_node_type() {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            eprintln!("failed to build base registry: {err}");
            return ExitCode::FAILURE;
        }
    };

    let schema_id = format!("slotnode://{BASE_NODE_TYPE}");
    let schema = match registry.as_root_json_schema(BASE_NODE_TYPE, &schema_id) {
        Ok(schema) => schema,
        Err(err) => {
            eprintln!("failed to build schema: {err}");
            return ExitCode::FAILURE;
        }
    };
    let archive = match sample_archive(registry) {
        Ok(archive) => archive,
        Err(err) => {
            eprintln!("failed to build sample tree: {err}");
            return ExitCode::FAILURE;
        }
    };

    for document in [schema, archive] {
        match serde_json::to_string_pretty(&document) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("failed to render json: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Logging failures are reported but never stop the smoke run.
fn start_logging() {
    let level = std::env::var(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| slotnode_core::default_log_level().to_string());
    let log_dir = match resolve_log_dir(std::env::var_os(LOG_DIR_ENV)) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("logging disabled: cannot resolve log directory: {err}");
            return;
        }
    };

    match slotnode_core::init_logging(&level, &log_dir.to_string_lossy()) {
        Ok(()) => println!("slotnode_core logs={}", log_dir.display()),
        Err(err) => eprintln!("logging disabled: {err}"),
    }
}

/// Absolute log directory from the env value, relative paths taken from cwd.
fn resolve_log_dir(raw: Option<OsString>) -> std::io::Result<PathBuf> {
    let path = raw
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_LOG_SUBDIR));
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}

fn sample_archive(
    registry: Arc<TypeRegistry>,
) -> Result<serde_json::Value, slotnode_core::TreeError> {
    let mut tree = NodeTree::new(registry);
    let root = tree.instantiate(BASE_NODE_TYPE)?;
    tree.set_slot(root, "title", "Inbox")?;
    for title in ["Read", "Reply"] {
        let child = tree.instantiate(BASE_NODE_TYPE)?;
        tree.set_slot(child, "title", title)?;
        tree.add_subnode(root, child)?;
    }
    tree.run_scheduled()?;
    tree.json_archive(root)
}
