//! Engine configuration.
//!
//! Resolved once (usually from the environment) and handed to the
//! [`Engine`](crate::Engine); nothing reads the environment afterwards.

use std::env;
use std::path::{Path, PathBuf};

use crate::util::{path, Result};

/// Directory holding data files.
pub const ENV_DATA_BASE: &str = "IMAS_HDF5_BASE";
/// Directory holding model files.
pub const ENV_MODEL_BASE: &str = "HDF5_MODEL_BASE";
/// IDS data dictionary version used to select a model.
pub const ENV_IDS_VERSION: &str = "IMAS_IDS_VERSION";
/// Device name used to select a model.
pub const ENV_IDS_DEVICE: &str = "IMAS_IDS_DEVICE";

/// Where data and model files live and which model variant to use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub data_base: Option<PathBuf>,
    pub model_base: Option<PathBuf>,
    pub ids_version: Option<String>,
    pub device: Option<String>,
}

/// Non-empty environment variable.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Read the four environment inputs. Unset or empty variables are `None`.
    pub fn from_env() -> Self {
        Self {
            data_base: var(ENV_DATA_BASE).map(PathBuf::from),
            model_base: var(ENV_MODEL_BASE).map(PathBuf::from),
            ids_version: var(ENV_IDS_VERSION),
            device: var(ENV_IDS_DEVICE),
        }
    }

    pub fn with_data_base(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_base = Some(dir.into());
        self
    }

    pub fn with_model_base(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_base = Some(dir.into());
        self
    }

    pub fn with_ids_version(mut self, version: impl Into<String>) -> Self {
        self.ids_version = Some(version.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// `<data_base>/<name>_<shot>_<run>.hd5`, or `./<name>_<shot>_<run>.hd5`.
    pub fn data_file(&self, name: &str, shot: i32, run: i32) -> Result<PathBuf> {
        path::check_legal(name)?;
        let file = format!("{}_{}_{}.hd5", name, shot, run);
        let full = match &self.data_base {
            Some(base) => base.join(file),
            None => Path::new(".").join(file),
        };
        check_built(&full)?;
        Ok(full)
    }

    /// Model file for `name`, specialised by version and device when both
    /// are configured.
    pub fn model_file(&self, name: &str) -> Result<PathBuf> {
        path::check_legal(name)?;
        let file = format!("{}_model.hd5", name);
        let full = match (&self.model_base, &self.ids_version, &self.device) {
            (Some(base), Some(version), Some(device)) => base.join(version).join(device).join(file),
            (Some(base), _, _) => base.join(file),
            (None, _, _) => PathBuf::from(file),
        };
        check_built(&full)?;
        Ok(full)
    }
}

fn check_built(p: &Path) -> Result<()> {
    path::check_legal(&p.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Error;

    #[test]
    fn test_data_file() {
        let cfg = Config::default();
        assert_eq!(cfg.data_file("scenario", 100, 1).unwrap(), PathBuf::from("./scenario_100_1.hd5"));

        let cfg = cfg.with_data_base("/data/imas");
        assert_eq!(cfg.data_file("scenario", 100, 1).unwrap(), PathBuf::from("/data/imas/scenario_100_1.hd5"));
        assert!(matches!(cfg.data_file("bad name", 1, 1), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_model_file() {
        let cfg = Config::default();
        assert_eq!(cfg.model_file("ids").unwrap(), PathBuf::from("ids_model.hd5"));

        let cfg = cfg.with_model_base("/models");
        assert_eq!(cfg.model_file("ids").unwrap(), PathBuf::from("/models/ids_model.hd5"));

        // Version alone does not select a subdirectory.
        let cfg = cfg.with_ids_version("3.0");
        assert_eq!(cfg.model_file("ids").unwrap(), PathBuf::from("/models/ids_model.hd5"));

        let cfg = cfg.with_device("MAST");
        assert_eq!(cfg.model_file("ids").unwrap(), PathBuf::from("/models/3.0/MAST/ids_model.hd5"));
    }

    #[test]
    fn test_illegal_base() {
        let cfg = Config::default().with_data_base("/tmp/evil;rm");
        assert!(matches!(cfg.data_file("x", 1, 1), Err(Error::InvalidPath(_))));
    }
}
