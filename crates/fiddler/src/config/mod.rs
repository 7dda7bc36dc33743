use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::types::ResourceLimits;

mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../fiddler.example.toml");

/// Skia header subdirectories added to the include path, relative to
/// `<skia_dir>/include`.
pub const SKIA_INCLUDE_SUBDIRS: [&str; 7] =
    ["core", "gpu", "effects", "pathops", "c", "utils", "config"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Fiddler
///
/// Built once at startup and shared by reference between the synthesizer and
/// the runner. Nothing in here is ever derived from a submission.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// How the compiler and the wrapper are invoked
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Resource ceilings applied before compilation
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Compiler invocation
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// What happens to generated artifacts once a submission is done
    #[serde(default)]
    pub retention: Retention,

    /// Source template; the built-in template is used when unset
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

/// Sandbox invocation style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Run the compiler and the wrapper directly
    #[default]
    Direct,
    /// Run both inside a `schroot` session
    Schroot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub mode: SandboxMode,

    /// Path to the schroot binary
    #[serde(default = "default_schroot_path")]
    pub schroot_path: PathBuf,

    /// Chroot name passed to `schroot -c` (required in schroot mode)
    #[serde(default)]
    pub chroot: Option<String>,

    /// Working directory inside the chroot (`schroot -d`)
    #[serde(default = "default_chroot_directory")]
    pub directory: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Direct,
            schroot_path: default_schroot_path(),
            chroot: None,
            directory: default_chroot_directory(),
        }
    }
}

/// Filesystem layout shared by the synthesizer and the runner.
///
/// `source_dir` and `binary_dir` are host paths. The `sandbox_*` variants are
/// the same directories as seen by the compiler and the wrapper; they default
/// to the host paths. `library_dir`, `skia_dir` and `wrapper` are only ever
/// handed to sandboxed processes, so they are sandbox paths.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory where rendered sources are written
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Directory where compiled binaries are written
    #[serde(default = "default_binary_dir")]
    pub binary_dir: PathBuf,

    #[serde(default)]
    pub sandbox_source_dir: Option<PathBuf>,

    #[serde(default)]
    pub sandbox_binary_dir: Option<PathBuf>,

    /// Directory holding `fiddle_main.h`, `fiddle_main.o` and `libskia.so`
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// Skia checkout whose `include/` tree provides the public headers
    #[serde(default = "default_skia_dir")]
    pub skia_dir: PathBuf,

    /// Privilege-restricting wrapper executable
    #[serde(default = "default_wrapper")]
    pub wrapper: PathBuf,
}

impl PathsConfig {
    pub fn sandbox_source_dir(&self) -> &Path {
        self.sandbox_source_dir.as_deref().unwrap_or(&self.source_dir)
    }

    pub fn sandbox_binary_dir(&self) -> &Path {
        self.sandbox_binary_dir.as_deref().unwrap_or(&self.binary_dir)
    }

    /// Skia header directories in include order
    pub fn skia_include_dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let include = self.skia_dir.join("include");
        SKIA_INCLUDE_SUBDIRS
            .iter()
            .map(move |subdir| include.join(subdir))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            binary_dir: default_binary_dir(),
            sandbox_source_dir: None,
            sandbox_binary_dir: None,
            library_dir: default_library_dir(),
            skia_dir: default_skia_dir(),
            wrapper: default_wrapper(),
        }
    }
}

/// Fixed compiler flags
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    /// Compiler executable
    #[serde(default = "default_compiler")]
    pub program: String,

    /// Value of `--std=`
    #[serde(default = "default_standard")]
    pub standard: String,

    /// Preprocessor defines, each passed as `-D<define>`
    #[serde(default = "default_defines")]
    pub defines: Vec<String>,

    /// Prebuilt object file in `library_dir`
    #[serde(default = "default_object")]
    pub object: String,

    /// Prebuilt shared library in `library_dir`
    #[serde(default = "default_library")]
    pub library: String,

    /// Trailing link flags
    #[serde(default = "default_link_flags")]
    pub link_flags: Vec<String>,

    /// Embed `library_dir` as the runtime library search path
    #[serde(default = "default_rpath")]
    pub rpath: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_compiler(),
            standard: default_standard(),
            defines: default_defines(),
            object: default_object(),
            library: default_library(),
            link_flags: default_link_flags(),
            rpath: default_rpath(),
        }
    }
}

/// Retention policy for generated sources and binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retention {
    /// Delete artifacts once the submission finishes, successfully or not
    #[default]
    Remove,
    /// Leave artifacts in place for the caller
    Keep,
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with the built-in layout rooted under `root`.
    ///
    /// Sources go to `<root>/sources`, binaries to `<root>/binaries`, and the
    /// library, headers and wrapper are looked up under `<root>/fiddle`.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let library_dir = root.join("fiddle");
        Self {
            sandbox: SandboxConfig::default(),
            limits: ResourceLimits::default(),
            paths: PathsConfig {
                source_dir: root.join("sources"),
                binary_dir: root.join("binaries"),
                sandbox_source_dir: None,
                sandbox_binary_dir: None,
                skia_dir: library_dir.join("skia"),
                wrapper: library_dir.join("secwrap"),
                library_dir,
            },
            compiler: CompilerConfig::default(),
            retention: Retention::default(),
            template_path: None,
        }
    }

    /// Path to the prebuilt object file
    pub fn object_path(&self) -> PathBuf {
        self.paths.library_dir.join(&self.compiler.object)
    }

    /// Path to the prebuilt shared library
    pub fn library_path(&self) -> PathBuf {
        self.paths.library_dir.join(&self.compiler.library)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_schroot_path() -> PathBuf {
    PathBuf::from("schroot")
}

fn default_chroot_directory() -> PathBuf {
    PathBuf::from("/")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("/home/webtry/sources")
}

fn default_binary_dir() -> PathBuf {
    PathBuf::from("/home/webtry/binaries")
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("/fiddle")
}

fn default_skia_dir() -> PathBuf {
    PathBuf::from("/fiddle/skia")
}

fn default_wrapper() -> PathBuf {
    PathBuf::from("/fiddle/secwrap")
}

fn default_compiler() -> String {
    "c++".to_string()
}

fn default_standard() -> String {
    "c++11".to_string()
}

fn default_defines() -> Vec<String> {
    vec!["SK_RELEASE".to_string(), "SK_MESA".to_string()]
}

fn default_object() -> String {
    "fiddle_main.o".to_string()
}

fn default_library() -> String {
    "libskia.so".to_string()
}

fn default_link_flags() -> Vec<String> {
    vec!["-lOSMesa".to_string()]
}

fn default_rpath() -> bool {
    true
}
