//! Shared fixtures: a local distribution mirror with a fake toolchain, and a
//! workspace holding a flake, a store and a cache.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use envflake_lib::config::FsConfigSource;
use envflake_lib::flake::load_flake;
use envflake_lib::outputs::{DeriveContext, DeriveError, Outputs, PackageSpec, derive_system, derive_system_package};
use envflake_lib::platform::SystemId;
use envflake_lib::toolchain::{DirSource, ManifestSource, SourceError};
use envflake_lib::util::hash::hash_bytes;

pub const LINUX: &str = "x86_64-linux";
pub const DARWIN: &str = "aarch64-darwin";
pub const DATE: &str = "2023-05-20";

const HOSTS: &[&str] = &["x86_64-unknown-linux-gnu", "aarch64-apple-darwin"];
const HOST_COMPONENTS: &[&str] = &["rustc", "cargo", "rust-std", "rustfmt", "clippy", "rust-analyzer"];

/// Stands in for cargo: fails when `FAIL_BUILD` is set, otherwise writes a
/// `kspacker` binary that reports its build environment and arguments.
const FAKE_CARGO: &str = r#"#!/bin/sh
if [ -n "$FAIL_BUILD" ]; then
  echo "error[E0425]: cannot find value \`proton\` in this scope" >&2
  exit 101
fi
mkdir -p "$CARGO_TARGET_DIR/release"
bin="$CARGO_TARGET_DIR/release/kspacker"
{
  echo '#!/bin/sh'
  echo "echo 'PROTON_PATH_OVR=$PROTON_PATH_OVR'"
  echo "echo 'ARGS=$*'"
} > "$bin"
chmod 755 "$bin"
"#;

pub fn system(name: &str) -> SystemId {
  name.parse().unwrap()
}

/// Build a rustup-style component archive.
fn archive(top: &str, component: &str, files: &[(String, Vec<u8>)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
  let mut append = |path: String, data: &[u8]| {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
  };

  append(format!("{top}/components"), format!("{component}\n").as_bytes());
  for (path, data) in files {
    append(format!("{top}/{component}/{path}"), data);
  }
  builder.into_inner().unwrap().finish().unwrap()
}

fn component_files(component: &str, host: &str) -> Vec<(String, Vec<u8>)> {
  match component {
    "cargo" => vec![("bin/cargo".to_string(), FAKE_CARGO.as_bytes().to_vec())],
    "rust-std" => vec![(format!("lib/rustlib/{host}/lib/libstd.rlib"), b"rlib".to_vec())],
    "rust-src" => vec![(
      "lib/rustlib/src/rust/library/core/src/lib.rs".to_string(),
      b"#![no_std]\n".to_vec(),
    )],
    other => vec![(format!("bin/{other}"), b"#!/bin/sh\nexit 0\n".to_vec())],
  }
}

/// A local mirror serving one nightly for Linux and macOS hosts.
pub struct Mirror {
  pub dir: TempDir,
  /// SHA-256 of the published manifest.
  pub sha256: String,
}

impl Mirror {
  pub fn new() -> Self {
    let dir = TempDir::new().unwrap();
    let dist = dir.path().join("dist").join(DATE);
    std::fs::create_dir_all(&dist).unwrap();

    let publish = |name: String, bytes: Vec<u8>| -> (String, String) {
      std::fs::write(dist.join(&name), &bytes).unwrap();
      (format!("dist/{DATE}/{name}"), hash_bytes(&bytes).0)
    };

    let mut manifest = format!(
      "manifest-version = \"2\"\ndate = \"{DATE}\"\n\n[pkg.rustc]\nversion = \"1.71.0-nightly (8b4b20836 2023-05-19)\"\n\n"
    );
    for host in HOSTS {
      for component in HOST_COMPONENTS {
        let bytes = archive(
          &format!("{component}-nightly-{host}"),
          component,
          &component_files(component, host),
        );
        let (url, hash) = publish(format!("{component}-nightly-{host}.tar.gz"), bytes);
        manifest.push_str(&format!(
          "[pkg.{component}.target.{host}]\navailable = true\nurl = \"{url}\"\nhash = \"{hash}\"\n\n"
        ));
      }
    }

    let cross = "x86_64-pc-windows-gnu";
    let bytes = archive(
      &format!("rust-std-nightly-{cross}"),
      "rust-std",
      &component_files("rust-std", cross),
    );
    let (url, hash) = publish(format!("rust-std-nightly-{cross}.tar.gz"), bytes);
    manifest.push_str(&format!(
      "[pkg.rust-std.target.{cross}]\navailable = true\nurl = \"{url}\"\nhash = \"{hash}\"\n\n"
    ));

    let bytes = archive("rust-src-nightly", "rust-src", &component_files("rust-src", ""));
    let (url, hash) = publish("rust-src-nightly.tar.gz".to_string(), bytes);
    manifest.push_str(&format!(
      "[pkg.rust-src.target.\"*\"]\navailable = true\nurl = \"{url}\"\nhash = \"{hash}\"\n\n"
    ));
    manifest.push_str("[renames.rls-preview]\nto = \"rust-analyzer\"\n");

    std::fs::write(dist.join("channel-rust-nightly.toml"), &manifest).unwrap();
    std::fs::write(dir.path().join("dist").join("channel-rust-nightly.toml"), &manifest).unwrap();

    Self {
      sha256: hash_bytes(manifest.as_bytes()).0,
      dir,
    }
  }

  pub fn source(&self) -> DirSource {
    DirSource::new(self.dir.path())
  }
}

/// Counts fetches so tests can assert nothing was downloaded twice.
pub struct CountingSource {
  inner: DirSource,
  fetches: AtomicUsize,
}

impl CountingSource {
  pub fn new(inner: DirSource) -> Self {
    Self {
      inner,
      fetches: AtomicUsize::new(0),
    }
  }

  pub fn fetches(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }
}

impl ManifestSource for CountingSource {
  async fn fetch_dist(&self, rel_path: &str) -> Result<Option<Vec<u8>>, SourceError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.inner.fetch_dist(rel_path).await
  }

  async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, SourceError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.inner.fetch_artifact(url).await
  }

  fn describe(&self) -> String {
    self.inner.describe()
  }
}

/// Lua for a pinned toolchain.
pub fn pinned(channel: &str, sha256: &str, components: &[&str]) -> String {
  format!(
    "{{ channel = \"{channel}\", sha256 = \"{sha256}\", components = {{ {} }} }}",
    lua_list(components)
  )
}

pub fn lua_list(items: &[&str]) -> String {
  items.iter().map(|i| format!("\"{i}\"")).collect::<Vec<_>>().join(", ")
}

/// A kspacker-like flake for Linux and macOS.
pub fn flake_source(toolchain: &str, features: &[&str], gui: bool) -> String {
  format!(
    r#"
return {{
  systems = {{ "{LINUX}", "{DARWIN}" }},
  outputs = function(system)
    return {{
      toolchain = {toolchain},
      gui = {gui},
      deps = {{
        build = {{ "pkg-config", "clang", "mold" }},
        runtime = {{ "openssl" }},
        hooks = {{ {{ type = "cmd", cmd = "echo hooked > \"$out/hooked\"" }} }},
      }},
      package = {{
        name = "kspacker",
        features = {{ {features} }},
        env = {{ PROTON_PATH_OVR = {{ file = "proton_path.txt" }} }},
      }},
      shell = {{
        components = {{ "language-server", "source-bundle" }},
        tools = {{ "cargo-watch" }},
      }},
    }}
  end,
}}
"#,
    features = lua_list(features),
  )
}

/// A flake directory plus isolated store and cache.
pub struct Workspace {
  pub root: TempDir,
  pub mirror: Mirror,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      root: TempDir::new().unwrap(),
      mirror: Mirror::new(),
    }
  }

  pub fn write(&self, rel: &str, contents: &str) {
    std::fs::write(self.root.path().join(rel), contents).unwrap();
  }

  pub fn flake_path(&self) -> PathBuf {
    self.root.path().join("envflake.lua")
  }

  pub fn store(&self) -> PathBuf {
    self.root.path().join("store")
  }

  pub fn cache(&self) -> PathBuf {
    self.root.path().join("cache")
  }

  pub async fn derive_with<S: ManifestSource>(&self, source: &S, name: &str) -> Result<Outputs, DeriveError> {
    let flake = load_flake(&self.flake_path())?;
    let config = FsConfigSource::new(flake.dir.clone());
    let ctx = DeriveContext::new(source, &config, &self.store(), &self.cache());
    derive_system(&flake, system(name), &ctx).await
  }

  pub async fn derive(&self, name: &str) -> Result<Outputs, DeriveError> {
    self.derive_with(&self.mirror.source(), name).await
  }

  pub async fn derive_package(&self, name: &str) -> Result<PackageSpec, DeriveError> {
    let flake = load_flake(&self.flake_path())?;
    let config = FsConfigSource::new(flake.dir.clone());
    let source = self.mirror.source();
    let ctx = DeriveContext::new(&source, &config, &self.store(), &self.cache());
    derive_system_package(&flake, system(name), &ctx).await
  }
}

/// True when `dir` does not exist or is empty.
pub fn is_empty_dir(dir: &Path) -> bool {
  std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}
