//! A [`PackageStore`] installing `.tar.gz` payloads into a directory.
//!
//! # Layout
//! - `<root>/<target>/pkg/<id>-<hash>/` holds the extracted files of a package, `hash` being taken from its full key.
//! - `<root>/<target>/installed.json` records the installed packages with their version and files.

use std::collections::BTreeMap;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, Deserialize};

use crate::{Config, PackageKey, RepositoryIndex, Target, Version};
use crate::store::{Artifact, DownloadError, InstallError, InstallStatus, PackageStore, UninstallError};

/// Transfers a payload from wherever its url points to.
pub trait Fetch: Send + Sync {
	/// Writes the payload at `url` to `writer`, returning the number of bytes written.
	///
	/// # Parameters
	/// - `progress` - Called with `(current, total)` bytes, `total` is zero when unknown.
	fn fetch(&self, url: &str, writer: &mut dyn Write, progress: &mut dyn FnMut(u64, u64)) -> Result<u64, DownloadError>;
}

/// Fetches payloads from the local filesystem, urls are plain paths or `file://` urls.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetch;

impl Fetch for FileFetch {
	fn fetch(&self, url: &str, writer: &mut dyn Write, progress: &mut dyn FnMut(u64, u64)) -> Result<u64, DownloadError> {
		let path = match url.strip_prefix("file://") {
			Some(path) => path,
			None if url.contains("://") => return Err(DownloadError::UnsupportedUrl(url.to_string())),
			None => url,
		};

		let mut file = std::fs::File::open(path)?;
		let total = file.metadata()?.len();
		let mut buf = vec![0u8; 64 * 1024];
		let mut current = 0;

		progress(0, total);
		loop {
			let n = file.read(&mut buf)?;
			if n == 0 { break; }
			writer.write_all(&buf[..n])?;
			current += n as u64;
			progress(current, total);
		}
		Ok(current)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstalledRecord {
	version: Version,
	/// Paths relative to the package directory.
	files: Vec<PathBuf>,
}

type InstalledRecords = BTreeMap<PackageKey, InstalledRecord>;

pub struct PrefixStore {
	root: PathBuf,
	download_dir: PathBuf,
	do_checksums: bool,
	index: Arc<RepositoryIndex>,
	fetch: Box<dyn Fetch>,
	/// Serializes changes to the installed records.
	records_lock: Mutex<()>,
}

impl PrefixStore {
	/// Creates a store rooted at the configured data directory.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when the data or download directory cannot be created.
	pub fn new(config: &Config, index: Arc<RepositoryIndex>, fetch: Box<dyn Fetch>) -> crate::Result<Self> {
		std::fs::create_dir_all(config.data_dir())?;
		std::fs::create_dir_all(config.download_dir())?;
		Ok(PrefixStore {
			root: config.data_dir().to_path_buf(),
			download_dir: config.download_dir().to_path_buf(),
			do_checksums: config.do_checksums(),
			index,
			fetch,
			records_lock: Mutex::new(()),
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn target_dir(&self, target: Target) -> PathBuf {
		self.root.join(target.to_string())
	}

	/// Directory holding the files of a package.
	///
	/// Named after the id and a hash of the full key, so packages sharing an id across
	/// repositories or channels never share a directory.
	pub fn package_dir(&self, key: &PackageKey, target: Target) -> PathBuf {
		let hash = sha256::digest(key.to_string().as_bytes());
		self.target_dir(target).join("pkg").join(format!("{}-{}", key.id(), &hash[..12]))
	}

	fn records_path(&self, target: Target) -> PathBuf {
		self.target_dir(target).join("installed.json")
	}

	fn load_records(&self, target: Target) -> crate::Result<InstalledRecords> {
		let path = self.records_path(target);
		if !path.exists() {
			return Ok(Default::default())
		}
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(BufReader::new(file))?)
	}

	/// Replaces the records file in one rename so a crash never leaves it half written.
	fn save_records(&self, target: Target, records: &InstalledRecords) -> crate::Result<()> {
		let dir = self.target_dir(target);
		std::fs::create_dir_all(&dir)?;
		let mut file = tempfile::NamedTempFile::new_in(&dir)?;
		serde_json::to_writer_pretty(&mut file, records)?;
		file.as_file_mut().flush()?;
		file.persist(self.records_path(target)).map_err(|e| e.error)?;
		Ok(())
	}

	/// Packages installed at `target` with the version that was installed.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) or [`SerdeJSON`](crate::error::Error::SerdeJSON) when the records cannot be read.
	pub fn installed(&self, target: Target) -> crate::Result<Vec<(PackageKey, Version)>> {
		Ok(self.load_records(target)?
			.into_iter()
			.map(|(key, record)| (key, record.version))
			.collect())
	}

	/// Extracts an archive into a fresh directory next to the package directories.
	fn extract(&self, artifact: &Artifact, target: Target) -> Result<(tempfile::TempDir, Vec<PathBuf>), InstallError> {
		let pkg_dir = self.target_dir(target).join("pkg");
		std::fs::create_dir_all(&pkg_dir)?;
		let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(&pkg_dir)?;

		let file = std::fs::File::open(artifact.path())?;
		let mut archive = tar::Archive::new(flate2::bufread::GzDecoder::new(BufReader::new(file)));

		let mut files = Vec::new();
		for entry in archive.entries()? {
			let mut entry = entry?;
			let path = entry.path()?.into_owned();
			let is_file = entry.header().entry_type().is_file();
			if !entry.unpack_in(staging.path())? {
				return Err(InstallError::Store(format!("archive entry `{}` points outside of the package", path.display())))
			}
			if is_file {
				files.push(path);
			}
		}

		Ok((staging, files))
	}
}

impl PackageStore for PrefixStore {
	fn download(&self, key: &PackageKey, target: Target, progress: &mut dyn FnMut(u64, u64)) -> Result<Artifact, DownloadError> {
		let snapshot = self.index.snapshot();
		let package = snapshot.get(key).ok_or_else(|| DownloadError::UnknownPackage(key.clone()))?;
		let payload = package.payload.as_ref().ok_or(DownloadError::MissingPayload)?;

		std::fs::create_dir_all(&self.download_dir)?;
		let mut file = tempfile::Builder::new()
			.prefix(&format!("{}-", key.id()))
			.suffix(".tar.gz")
			.tempfile_in(&self.download_dir)?;

		log::info!("Downloading package {} from {}", key, payload.url);
		let size = self.fetch.fetch(&payload.url, file.as_file_mut(), progress)?;
		file.as_file_mut().flush()?;
		log::debug!("Downloaded {} bytes for {}", size, key);

		if self.do_checksums {
			if let Some(expected) = &payload.sha256 {
				let content = std::fs::read(file.path())?;
				let actual = sha256::digest(content.as_slice());
				if !actual.eq_ignore_ascii_case(expected) {
					log::warn!("Checksum mismatch for {}", key);
					return Err(DownloadError::DifferentHashes { expected: expected.clone(), actual })
				}
			}
		}

		Ok(Artifact::temporary(key.clone(), target, file.into_temp_path()))
	}

	fn install(&self, artifact: &Artifact, target: Target) -> Result<(), InstallError> {
		let key = artifact.key();
		let version = self.index.snapshot()
			.get(key)
			.map(|p| p.version.clone())
			.ok_or_else(|| InstallError::PackageNotFound(key.clone()))?;

		let _guard = self.records_lock.lock().unwrap_or_else(PoisonError::into_inner);
		let mut records = self.load_records(target).map_err(|e| InstallError::Store(e.to_string()))?;

		/* Extraction failures drop the staging directory, leaving any previous install untouched */
		let (staging, files) = self.extract(artifact, target)?;

		let dir = self.package_dir(key, target);
		if dir.exists() {
			log::debug!("Replacing previous install of {}", key);
			std::fs::remove_dir_all(&dir)?;
		}
		std::fs::rename(staging.path(), &dir)?;

		log::info!("Installed {} {} to {}", key, version, dir.display());
		records.insert(key.clone(), InstalledRecord { version, files });
		self.save_records(target, &records).map_err(|e| InstallError::Store(e.to_string()))
	}

	fn uninstall(&self, key: &PackageKey, target: Target) -> Result<(), UninstallError> {
		let _guard = self.records_lock.lock().unwrap_or_else(PoisonError::into_inner);
		let mut records = self.load_records(target).map_err(|e| UninstallError::Store(e.to_string()))?;
		if records.remove(key).is_none() {
			return Err(UninstallError::NotInstalled)
		}

		let dir = self.package_dir(key, target);
		if dir.exists() {
			std::fs::remove_dir_all(&dir)?;
		}

		log::info!("Uninstalled {} from {}", key, target);
		self.save_records(target, &records).map_err(|e| UninstallError::Store(e.to_string()))
	}

	fn status(&self, key: &PackageKey, target: Target) -> InstallStatus {
		let records = match self.load_records(target) {
			Ok(records) => records,
			Err(e) => return InstallStatus::Unknown(e.to_string()),
		};

		match records.get(key) {
			None => InstallStatus::NotInstalled,
			Some(record) => match self.index.snapshot().get(key) {
				Some(package) if package.version > record.version => InstallStatus::InstalledNeedsUpdate,
				_ => InstallStatus::InstalledUpToDate,
			},
		}
	}
}
