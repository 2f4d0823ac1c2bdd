//! End-to-end derivation tests against a local distribution mirror.

mod common;

use std::process::Command;

use envflake_lib::compose::GUI_LIBRARIES;
use envflake_lib::config::FsConfigSource;
use envflake_lib::flake::load_flake;
use envflake_lib::outputs::{DeriveContext, DeriveError, build_package, derive_all};
use envflake_lib::toolchain::ToolchainError;
use envflake_lib::util::hash::Hashable;

use common::*;

const PROTON_PATH: &str = "/opt/example/path";

fn default_flake(mirror_sha: &str) -> String {
  flake_source(
    &pinned(&format!("nightly-{DATE}"), mirror_sha, &["formatter", "linter"]),
    &["proton-steam-comptime"],
    true,
  )
}

/// A workspace whose flake pins the mirror's manifest.
fn workspace(proton_path: &str) -> Workspace {
  let ws = Workspace::new();
  ws.write("envflake.lua", &default_flake(&ws.mirror.sha256));
  ws.write("proton_path.txt", proton_path);
  ws
}

// =============================================================================
// Parity and determinism
// =============================================================================

#[tokio::test]
async fn package_and_shell_share_dependencies_and_env() {
  let ws = workspace(PROTON_PATH);

  for name in [LINUX, DARWIN] {
    let outputs = ws.derive(name).await.unwrap();
    assert_eq!(outputs.package.deps, outputs.shell.deps, "{name}");
    assert_eq!(outputs.package.env, outputs.shell.env, "{name}");
    assert_eq!(outputs.package.system, outputs.shell.system);
  }
}

#[tokio::test]
async fn systems_get_their_own_host_toolchain() {
  let ws = workspace(PROTON_PATH);

  let linux = ws.derive(LINUX).await.unwrap();
  let darwin = ws.derive(DARWIN).await.unwrap();
  assert_eq!(linux.package.toolchain.host, "x86_64-unknown-linux-gnu");
  assert_eq!(darwin.package.toolchain.host, "aarch64-apple-darwin");
  assert_ne!(linux.package.deps.build_tools[0].prefix, darwin.package.deps.build_tools[0].prefix);
}

#[tokio::test]
async fn rederiving_is_byte_identical() {
  let ws = workspace(PROTON_PATH);

  let first = ws.derive(LINUX).await.unwrap();
  let second = ws.derive(LINUX).await.unwrap();

  assert_eq!(
    serde_json::to_vec(&first).unwrap(),
    serde_json::to_vec(&second).unwrap()
  );
  assert_eq!(
    first.package.compute_hash().unwrap(),
    second.package.compute_hash().unwrap()
  );
}

#[tokio::test]
async fn rederiving_does_not_refetch_pinned_manifest() {
  let ws = workspace(PROTON_PATH);
  let source = CountingSource::new(ws.mirror.source());

  ws.derive_with(&source, LINUX).await.unwrap();
  let after_first = source.fetches();
  assert_eq!(after_first, 1);

  ws.derive_with(&source, LINUX).await.unwrap();
  assert_eq!(source.fetches(), after_first);
}

#[tokio::test]
async fn systems_fail_independently() {
  let ws = workspace(PROTON_PATH);
  let toolchain = format!(
    "{{ channel = \"nightly-{DATE}\", sha256 = \"{}\", components = {{ envflake.os == \"darwin\" and \"nonexistent-tool\" or \"clippy\" }} }}",
    ws.mirror.sha256
  );
  ws.write("envflake.lua", &flake_source(&toolchain, &[], true));

  let flake = load_flake(&ws.flake_path()).unwrap();
  let config = FsConfigSource::new(flake.dir.clone());
  let source = ws.mirror.source();
  let ctx = DeriveContext::new(&source, &config, &ws.store(), &ws.cache());

  let results = derive_all(&flake, &flake.systems, &ctx).await;
  assert_eq!(results.len(), 2);
  assert_eq!(results[0].0, system(LINUX));
  assert!(results[0].1.is_ok());
  assert_eq!(results[1].0, system(DARWIN));
  assert!(matches!(
    results[1].1,
    Err(DeriveError::Toolchain(ToolchainError::UnsupportedComponent { .. }))
  ));
}

#[tokio::test]
async fn unavailable_shell_component_fails_only_the_shell() {
  let ws = workspace(PROTON_PATH);
  let flake = default_flake(&ws.mirror.sha256).replace(
    "\"language-server\", \"source-bundle\"",
    "\"nonexistent-tool\"",
  );
  ws.write("envflake.lua", &flake);

  let package = ws.derive_package(LINUX).await.unwrap();
  assert_eq!(package.toolchain.manifest_sha256, ws.mirror.sha256);
  assert!(package.toolchain.components.contains(&"clippy".to_string()));

  match ws.derive(LINUX).await.unwrap_err() {
    DeriveError::Toolchain(ToolchainError::UnsupportedComponent { component, .. }) => {
      assert_eq!(component, "nonexistent-tool");
    }
    other => panic!("expected UnsupportedComponent, got {other:?}"),
  }
}

// =============================================================================
// Toolchain failures stop the derivation
// =============================================================================

#[tokio::test]
async fn corrupted_pin_fails_before_composition() {
  let ws = workspace(PROTON_PATH);
  let corrupted = format!("{}00", &ws.mirror.sha256[..62]);
  ws.write("envflake.lua", &default_flake(&corrupted));

  let err = ws.derive(LINUX).await.unwrap_err();
  assert!(
    matches!(err, DeriveError::Toolchain(ToolchainError::Integrity { .. })),
    "got {err:?}"
  );
  assert!(is_empty_dir(&ws.store()));
}

#[tokio::test]
async fn unknown_component_fails_before_any_build() {
  let ws = workspace(PROTON_PATH);
  let toolchain = pinned(&format!("nightly-{DATE}"), &ws.mirror.sha256, &["nonexistent-tool"]);
  ws.write("envflake.lua", &flake_source(&toolchain, &[], true));

  let err = ws.derive(LINUX).await.unwrap_err();
  match err {
    DeriveError::Toolchain(ToolchainError::UnsupportedComponent { component, .. }) => {
      assert_eq!(component, "nonexistent-tool");
    }
    other => panic!("expected UnsupportedComponent, got {other:?}"),
  }
  assert!(is_empty_dir(&ws.store()));
}

#[tokio::test]
async fn unpublished_target_is_rejected() {
  let ws = workspace(PROTON_PATH);
  let toolchain = format!(
    "{{ channel = \"nightly-{DATE}\", sha256 = \"{}\", targets = {{ \"wasm32-unknown-unknown\" }} }}",
    ws.mirror.sha256
  );
  ws.write("envflake.lua", &flake_source(&toolchain, &[], true));

  let err = ws.derive(LINUX).await.unwrap_err();
  assert!(
    matches!(err, DeriveError::Toolchain(ToolchainError::UnsupportedTarget { .. })),
    "got {err:?}"
  );
}

#[tokio::test]
async fn floating_toolchain_selects_latest() {
  let ws = workspace(PROTON_PATH);
  let toolchain = "{ channel = \"nightly\", latest = true, components = { \"clippy\" } }";
  ws.write("envflake.lua", &flake_source(toolchain, &[], true));

  let outputs = ws.derive(LINUX).await.unwrap();
  assert_eq!(outputs.package.toolchain.channel, format!("nightly-{DATE}"));
  assert_eq!(outputs.package.toolchain.manifest_sha256, ws.mirror.sha256);
}

// =============================================================================
// Environment values
// =============================================================================

#[tokio::test]
async fn env_file_value_reaches_both_outputs() {
  for contents in [PROTON_PATH.to_string(), format!("{PROTON_PATH}\n")] {
    let ws = workspace(&contents);
    let outputs = ws.derive(LINUX).await.unwrap();
    assert_eq!(outputs.package.env["PROTON_PATH_OVR"], PROTON_PATH);
    assert_eq!(outputs.shell.env["PROTON_PATH_OVR"], PROTON_PATH);
  }
}

#[tokio::test]
async fn missing_env_file_fails_derivation() {
  let ws = workspace(PROTON_PATH);
  std::fs::remove_file(ws.root.path().join("proton_path.txt")).unwrap();

  let err = ws.derive(LINUX).await.unwrap_err();
  assert!(matches!(err, DeriveError::FileRead(_)), "got {err:?}");
}

// =============================================================================
// Features and composition
// =============================================================================

#[tokio::test]
async fn requested_features_extend_defaults() {
  let ws = workspace(PROTON_PATH);
  let toolchain = pinned(&format!("nightly-{DATE}"), &ws.mirror.sha256, &[]);
  ws.write("envflake.lua", &flake_source(&toolchain, &["alpha"], true));

  let outputs = ws.derive(LINUX).await.unwrap();
  assert_eq!(outputs.package.features, ["default", "alpha"]);
  assert!(
    outputs
      .package
      .cargo_args
      .windows(2)
      .any(|w| w == ["--features", "alpha"])
  );
  assert!(!outputs.package.cargo_args.contains(&"--no-default-features".to_string()));
}

/// Runs the derived argument shape through the real cargo against a crate
/// that declares features but no `default`.
#[tokio::test]
async fn cargo_accepts_features_for_crate_without_default() {
  let Ok(cargo) = std::env::var("CARGO") else {
    return;
  };
  let ws = workspace(PROTON_PATH);
  let toolchain = pinned(&format!("nightly-{DATE}"), &ws.mirror.sha256, &[]);
  ws.write("envflake.lua", &flake_source(&toolchain, &["alpha"], false));
  let package = ws.derive_package(LINUX).await.unwrap();

  let krate = tempfile::TempDir::new().unwrap();
  std::fs::create_dir_all(krate.path().join("src")).unwrap();
  std::fs::write(
    krate.path().join("Cargo.toml"),
    "[package]\nname = \"no-default\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[workspace]\n\n[features]\nalpha = []\n",
  )
  .unwrap();
  std::fs::write(krate.path().join("src/main.rs"), "fn main() {}\n").unwrap();
  let target = tempfile::TempDir::new().unwrap();

  let out = Command::new(cargo)
    .args(&package.cargo_args)
    .arg("--offline")
    .current_dir(krate.path())
    .env("CARGO_TARGET_DIR", target.path())
    .output()
    .unwrap();
  assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[tokio::test]
async fn gui_libraries_are_optional() {
  let ws = workspace(PROTON_PATH);
  let toolchain = pinned(&format!("nightly-{DATE}"), &ws.mirror.sha256, &[]);

  let with_gui = ws.derive(LINUX).await.unwrap();
  assert!(GUI_LIBRARIES.iter().all(|lib| with_gui.package.deps.contains(lib)));

  ws.write("envflake.lua", &flake_source(&toolchain, &[], false));
  let without_gui = ws.derive(LINUX).await.unwrap();
  assert!(!without_gui.package.deps.contains("gtk3"));
  assert_eq!(
    without_gui.package.deps.runtime_libs.len(),
    1,
    "only openssl should remain"
  );
}

#[tokio::test]
async fn shell_toolchain_adds_developer_components() {
  let ws = workspace(PROTON_PATH);
  let outputs = ws.derive(LINUX).await.unwrap();

  let package = &outputs.package.toolchain.components;
  let shell = &outputs.shell.toolchain.components;
  assert!(!package.contains(&"rust-analyzer".to_string()));
  assert!(shell.contains(&"rust-analyzer".to_string()));
  assert!(shell.contains(&"rust-src".to_string()));
  assert_eq!(outputs.shell.tools[0].name, "cargo-watch");
}

// =============================================================================
// Building
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn builds_package_with_env_and_features() {
  let ws = workspace(PROTON_PATH);
  let outputs = ws.derive(LINUX).await.unwrap();
  let source = ws.mirror.source();

  let result = build_package(&outputs.package, &source, &ws.store(), &ws.cache())
    .await
    .unwrap();
  assert!(!result.cached);
  assert!(result.out_dir.join("hooked").exists());

  let run = Command::new(&result.bins[0]).output().unwrap();
  let stdout = String::from_utf8(run.stdout).unwrap();
  assert!(stdout.contains(&format!("PROTON_PATH_OVR={PROTON_PATH}")), "{stdout}");
  assert!(
    stdout.contains("ARGS=build --release --features proton-steam-comptime"),
    "{stdout}"
  );

  let again = build_package(&outputs.package, &source, &ws.store(), &ws.cache())
    .await
    .unwrap();
  assert!(again.cached);
  assert_eq!(again.out_dir, result.out_dir);
}

#[cfg(unix)]
#[tokio::test]
async fn build_failure_is_surfaced_verbatim() {
  let ws = workspace(PROTON_PATH);
  let mut outputs = ws.derive(LINUX).await.unwrap();
  outputs.package.env.insert("FAIL_BUILD".to_string(), "1".to_string());

  let err = build_package(&outputs.package, &ws.mirror.source(), &ws.store(), &ws.cache())
    .await
    .unwrap_err();
  match err {
    DeriveError::Build(envflake_lib::execute::ExecuteError::BuildFailed { code, stderr, .. }) => {
      assert_eq!(code, Some(101));
      assert_eq!(stderr, "error[E0425]: cannot find value `proton` in this scope\n");
    }
    other => panic!("expected BuildFailed, got {other:?}"),
  }
  assert!(!outputs.package.out_dir(&ws.store()).unwrap().exists());
}
