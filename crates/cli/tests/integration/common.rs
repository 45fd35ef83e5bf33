//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Mock, ServerGuard};
use tempfile::TempDir;

/// Build a gzipped tarball in memory.
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
  for (name, data) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data.as_bytes()).unwrap();
  }
  builder.into_inner().unwrap().finish().unwrap()
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the manifest, the
/// prefix and the download cache, plus its own HTTP server.
pub struct TestEnv {
  pub temp: TempDir,
  pub server: ServerGuard,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("fsprov.toml");
    Self {
      temp,
      server: mockito::Server::new(),
      manifest_path,
    }
  }

  /// Serve `body` at `path`, expecting exactly one request.
  pub fn serve(&mut self, path: &str, body: Vec<u8>) -> Mock {
    self.server.mock("GET", path).with_status(200).with_body(body).create()
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.server.url(), path)
  }

  /// Write the manifest. `{base}` is replaced with the server URL.
  pub fn write_manifest(&self, template: &str) {
    let content = template.replace("{base}", &self.server.url());
    std::fs::write(&self.manifest_path, content).unwrap();
  }

  pub fn prefix(&self) -> PathBuf {
    let p = self.temp.path().join("prefix");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn download_dir(&self) -> PathBuf {
    self.temp.path().join("downloads")
  }

  /// Get a pre-configured Command for the fsprov binary.
  ///
  /// Points `FSPROV_PREFIX` and `FSPROV_DOWNLOAD_DIR` inside the temp
  /// directory so nothing touches the real user directories.
  pub fn fsprov_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("fsprov");
    cmd.env("FSPROV_PREFIX", self.prefix());
    cmd.env("FSPROV_DOWNLOAD_DIR", self.download_dir());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

/// A library, a tool and a target with an entry point.
pub const CHAIN_MANIFEST: &str = r#"
version = 1

[settings]
jobs = 1

[[package]]
name = "libfoo"
version = "0.1"
url = "{base}/libfoo-0.1.tar.gz"
steps = [
  { cmd = "mkdir -p $${prefix}/lib && cp libfoo.so $${prefix}/lib/" },
]

[[package]]
name = "footool"
version = "2.0"
url = "{base}/footool-2.0.tar.gz"
env = [{ op = "append", var = "LDFLAGS", value = "-shared" }]
steps = [
  { cmd = "mkdir -p $${prefix}/bin && cp footool $${prefix}/bin/ && chmod +x $${prefix}/bin/footool" },
]

[target]
name = "app"
version = "1.0"
url = "{base}/archive/v1.0.tar.gz"
archive = "app-1.0.tar.gz"
entry_point = "app.py"
env = [{ op = "restore", var = "LDFLAGS" }]
steps = [
  { cmd = "make -j$${jobs} > /dev/null 2>&1 || touch built" },
]
"#;

pub fn serve_chain(env: &mut TestEnv) -> Vec<Mock> {
  vec![
    env.serve("/libfoo-0.1.tar.gz", tar_gz(&[("libfoo-0.1/libfoo.so", "elf")])),
    env.serve("/footool-2.0.tar.gz", tar_gz(&[("footool-2.0/footool", "#!/bin/sh\necho foo\n")])),
    env.serve(
      "/archive/v1.0.tar.gz",
      tar_gz(&[("app-1.0/app.py", "#!/bin/sh\necho app\n")]),
    ),
  ]
}
