//!
//! Store configuration
//!
//! A `Config` names the data directory and the sizing of the streams that
//! back the heaps. It can be read from and written to a TOML file so that
//! embedding applications keep it next to the data directory.
//!

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MB: u64 = 1024 * 1024;

const DEFAULT_INITIAL_SIZE: u64 = 4 * MB;
const DEFAULT_MAX_SIZE:     u64 = 1024 * MB;


/// How the environment maps stores to streams
///
/// Under `SingleStore` every store shares one data file and named roots
/// arbitrate between them. Under `PolyStore` each store name gets a data
/// file of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreStrategy {
    SingleStore,
    PolyStore,
}

impl Default for StoreStrategy {
    fn default() -> StoreStrategy {
        StoreStrategy::SingleStore
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory; created on first open
    pub root: PathBuf,

    /// Size a fresh data file is created at
    #[serde(default = "default_initial_size")]
    pub initial_size: u64,

    /// Size after which a data file refuses to grow
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    #[serde(default)]
    pub strategy: StoreStrategy,
}

fn default_initial_size() -> u64 { DEFAULT_INITIAL_SIZE }
fn default_max_size()     -> u64 { DEFAULT_MAX_SIZE }


impl Config {
    pub fn new<P: AsRef<Path>>(root: P) -> Config {
        Config {
            root:         PathBuf::from(root.as_ref()),
            initial_size: DEFAULT_INITIAL_SIZE,
            max_size:     DEFAULT_MAX_SIZE,
            strategy:     StoreStrategy::default(),
        }
    }

    /// Reads a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let mut raw = String::new();
        fs::File::open(path)?.read_to_string(&mut raw)?;

        toml::from_str(&raw).map_err(|_| Error::Corrupt("config is not valid toml"))
    }

    /// Writes the config as TOML next to the data it describes
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = toml::to_string(self).map_err(|_| Error::Corrupt("config cannot be serialized"))?;

        fs::write(path, raw)?;
        Ok(())
    }

    /// A config rooted at a fresh scratch directory, with sizes small enough
    /// to keep tests quick
    pub fn new_test() -> Config {
        let dir = std::env::temp_dir()
            .join(format!("tricrust-test-{:08x}", rand::random::<u32>()));

        fs::create_dir_all(&dir).expect("cannot create test directory");

        Config {
            root:         dir,
            initial_size: 64 * 1024,
            max_size:     64 * MB,
            strategy:     StoreStrategy::default(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_roundtrip() {
        let cfg = Config::new("/tmp/data");

        let raw = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&raw).unwrap();

        assert_eq!(back.root, PathBuf::from("/tmp/data"));
        assert_eq!(back.initial_size, cfg.initial_size);
        assert_eq!(back.strategy, StoreStrategy::SingleStore);
    }

    #[test]
    fn test_defaults_apply() {
        let cfg: Config = toml::from_str("root = \"/tmp/x\"").unwrap();

        assert_eq!(cfg.initial_size, 4 * MB);
        assert_eq!(cfg.max_size, 1024 * MB);
        assert_eq!(cfg.strategy, StoreStrategy::SingleStore);
    }

    #[test]
    fn test_new_test_is_unique() {
        let a = Config::new_test();
        let b = Config::new_test();

        assert_ne!(a.root, b.root);

        std::fs::remove_dir_all(&a.root).unwrap();
        std::fs::remove_dir_all(&b.root).unwrap();
    }
}
