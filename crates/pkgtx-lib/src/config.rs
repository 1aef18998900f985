//! Settings the engine is run with, always passed explicitly.

use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	data_dir: PathBuf,
	download_dir: PathBuf,
	cascade_uninstall: bool,
	max_concurrent_steps: usize,
	https_only: bool,
	do_checksums: bool,
}

/// Base directory from an XDG variable, falling back to a path under `$HOME`.
fn xdg_dir(var: &str, home_fallback: &str) -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = std::env::var_os("APPDATA").map(PathBuf::from);

	#[cfg(not(target_os = "windows"))]
	let path = std::env::var_os(var).map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(home_fallback)));

	#[cfg(target_os = "windows")]
	let _ = (var, home_fallback);

	path.unwrap_or_else(std::env::temp_dir)
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: xdg_dir("XDG_DATA_HOME", ".local/share").join("pkgtx"),
			download_dir: xdg_dir("XDG_CACHE_HOME", ".cache").join("pkgtx").join("downloads"),
			cascade_uninstall: false,
			max_concurrent_steps: 1,
			https_only: true,
			do_checksums: true,
		}
	}
}

impl Config {
	/// Where the configuration is kept unless told otherwise.
	pub fn default_path() -> PathBuf {
		xdg_dir("XDG_CONFIG_HOME", ".config").join("pkgtx").join("config.json")
	}

	/// Loads a configuration, missing fields take their default value.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when opening or reading from the file.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when deserializing the file.
	pub fn load_from_disk(path: impl AsRef<Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		let mut config: Config = serde_json::from_reader(std::io::BufReader::new(file))?;
		config.max_concurrent_steps = config.max_concurrent_steps.max(1);
		Ok(config)
	}

	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when creating or writing to the file.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when serializing.
	pub fn save_to_disk(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
		serde_json::to_writer_pretty(&mut writer, self)?;
		std::io::Write::flush(&mut writer)?;
		Ok(())
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_data_dir(&mut self, data_dir: PathBuf) -> bool {
		if data_dir.is_dir() {
			self.data_dir = data_dir;
			true
		} else {
			false
		}
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_download_dir(&mut self, download_dir: PathBuf) -> bool {
		if download_dir.is_dir() {
			self.download_dir = download_dir;
			true
		} else {
			false
		}
	}

	/// Whether uninstalling a package also uninstalls the installed packages depending on it.
	pub fn cascade_uninstall(&self) -> bool {
		self.cascade_uninstall
	}
	pub fn set_cascade_uninstall(&mut self, cascade_uninstall: bool) {
		self.cascade_uninstall = cascade_uninstall;
	}

	pub fn max_concurrent_steps(&self) -> usize {
		self.max_concurrent_steps
	}
	/// Values below one are raised to one.
	pub fn set_max_concurrent_steps(&mut self, max_concurrent_steps: usize) {
		self.max_concurrent_steps = max_concurrent_steps.max(1);
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn do_checksums(&self) -> bool {
		self.do_checksums
	}
	pub fn set_do_checksums(&mut self, do_checksums: bool) {
		self.do_checksums = do_checksums;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn cascade_is_off_by_default() { assert!(!Config::default().cascade_uninstall()) }
	#[test] fn concurrency_is_at_least_one() { let mut c = Config::default(); c.set_max_concurrent_steps(0); assert_eq!(c.max_concurrent_steps(), 1) }
	#[test] fn missing_dir_is_rejected() { assert!(!Config::default().set_data_dir(PathBuf::from("/nonexistent/pkgtx"))) }

	#[test]
	fn saved_config_loads_back() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		let mut config = Config::default();
		config.set_cascade_uninstall(true);
		config.set_max_concurrent_steps(4);
		config.save_to_disk(&path).unwrap();
		assert_eq!(Config::load_from_disk(&path).unwrap(), config);
	}

	#[test]
	fn partial_config_uses_defaults() {
		let config: Config = serde_json::from_str(r#"{ "cascade_uninstall": true }"#).unwrap();
		assert!(config.cascade_uninstall());
		assert!(config.do_checksums());
	}
}
