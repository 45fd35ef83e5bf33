//! Names and fixed values shared across the crate.

/// Application directory name under the XDG base directories.
pub const APP_NAME: &str = "fsprov";

/// Number of hex characters kept from a SHA-256 digest for object hashes.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default manifest file name written by `fsprov init`.
pub const MANIFEST_FILENAME: &str = "fsprov.toml";

/// Manifest format version understood by this build.
pub const MANIFEST_VERSION: u32 = 1;

/// Checksum lock file kept in the download cache.
pub const CHECKSUM_LOCK_FILENAME: &str = "checksums.lock";

/// Advisory lock file held inside the prefix while installing.
pub const PREFIX_LOCK_FILENAME: &str = ".fsprov.lock";

/// Install receipt written into the prefix after a successful run.
pub const RECEIPT_FILENAME: &str = ".fsprov-receipt.json";

/// Suffix of in-flight downloads. Renamed away only on success.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Overrides the default installation prefix.
pub const ENV_PREFIX: &str = "FSPROV_PREFIX";

/// Overrides the default download cache directory.
pub const ENV_DOWNLOAD_DIR: &str = "FSPROV_DOWNLOAD_DIR";

/// Interpreter used when neither the CLI nor the manifest names one.
/// fastStructure 1.0 is Python 2 code.
pub const DEFAULT_PYTHON: &str = "python2";

/// Output stem passed to fastStructure; results land in `<stem>.<K>.<ext>`.
pub const RUN_OUTPUT_STEM: &str = "fS_run_K";

/// Subdirectory of a run's output holding the model choice.
pub const BEST_K_DIR: &str = "bestK";

/// Model choice summary written under [`BEST_K_DIR`].
pub const CHOOSE_K_FILENAME: &str = "chooseK.txt";

/// Extension of per-run logs written next to the results.
pub const RUN_LOG_EXTENSION: &str = "stlog";
