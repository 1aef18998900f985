use std::io::{BufRead, Read, Write};
use std::sync::Arc;

use pkgtx::{Action, Canceller, Config, FileFetch, PackageClient, PackageKey, PrefixStore, Repository, RepositoryIndex, Target, TransactionEvent};
use pkgtx::prefix::Fetch;
use pkgtx::store::DownloadError;

fn main() {
	env_logger::init();

	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optmulti("r", "repo",       "Repository index to load, a file or a url", "PATH|URL");
		opts.optopt(  "c", "config",     "Config file to use instead of the default one", "PATH");
		opts.optflag( "",  "cascade",    "Also uninstall installed packages depending on uninstalled ones");
		opts.optopt(  "j", "jobs",       "Number of steps applied at the same time", "N");
		opts.optflag( "y", "yes",        "Commit changes without asking");
		opts.optflag( "",  "user",       "Act on the user target instead of the system one");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage("Usage: pkgtx-terminal [options] (status|install|uninstall) [PACKAGE...]"));
			return;
		}

		parsed_options
	};

	if let Err(e) = run(&parsed_options) {
		log::error!("{}", e);
		let code = match &e {
			Error::Transaction(e) => e.code() as i32,
			Error::UserCancelled => 0,
			_ => 1,
		};
		std::process::exit(code);
	}
}

fn load_config(parsed_options: &getopts::Matches) -> Result<Config, Error> {
	let mut config = match parsed_options.opt_str("c") {
		Some(path) => Config::load_from_disk(path)?,
		None => Config::load_from_disk(Config::default_path()).unwrap_or_else(|e| {
			log::warn!("Failed to read config file: {}", e);
			log::warn!("Using default config.");
			Config::default()
		}),
	};

	if parsed_options.opt_present("cascade") {
		config.set_cascade_uninstall(true);
	}
	if let Some(jobs) = parsed_options.opt_str("j") {
		let jobs = jobs.parse::<usize>().map_err(|_| Error::InvalidArgument(format!("jobs must be a number, got `{}`", jobs)))?;
		config.set_max_concurrent_steps(jobs);
	}
	Ok(config)
}

fn run(parsed_options: &getopts::Matches) -> Result<(), Error> {
	let config = load_config(parsed_options)?;
	let fetch = HttpFetch::new(config.https_only())?;

	let mut repositories = Vec::new();
	for source in parsed_options.opt_strs("r") {
		log::debug!("Loading repository from {}", source);
		repositories.push(fetch.repository(&source)?);
	}
	if repositories.is_empty() {
		log::warn!("No repositories given, every package will be unknown.");
	}

	let index = Arc::new(RepositoryIndex::with_repositories(repositories));
	let store = PrefixStore::new(&config, index.clone(), Box::new(fetch))?;
	let client = PackageClient::new(config, index, Arc::new(store));

	let target = if parsed_options.opt_present("user") { Target::User } else { Target::System };

	let command = parsed_options.free.first().ok_or(Error::MissingArgument)?;
	let packages = &parsed_options.free[1..];

	match command.as_str() {
		"status" => print_status(&client, packages, target),
		"install" => apply(&client, packages, target, Action::install, parsed_options.opt_present("y")),
		"uninstall" => apply(&client, packages, target, Action::uninstall, parsed_options.opt_present("y")),
		other => Err(Error::InvalidArgument(format!("unknown command `{}`", other))),
	}
}

/// Turns a bare id or a full package key into a key known to the loaded repositories.
fn find_key(client: &PackageClient, reference: &str) -> Result<PackageKey, Error> {
	let snapshot = client.index().snapshot();
	if reference.contains("://") {
		let key = PackageKey::parse(reference)?;
		return match snapshot.contains(&key) {
			true => Ok(key),
			false => Err(Error::UnknownPackage(reference.to_string())),
		}
	}
	snapshot.find_by_id(reference)
		.map(|p| p.key.clone())
		.ok_or_else(|| Error::UnknownPackage(reference.to_string()))
}

fn print_status(client: &PackageClient, packages: &[String], target: Target) -> Result<(), Error> {
	let keys = match packages.is_empty() {
		true => client.index().snapshot().packages().map(|p| p.key.clone()).collect(),
		false => packages.iter().map(|p| find_key(client, p)).collect::<Result<Vec<_>, _>>()?,
	};
	for key in keys {
		println!("{}: {}", key, client.status(&key, target));
	}
	Ok(())
}

fn apply(client: &PackageClient, packages: &[String], target: Target, action: fn(PackageKey, Target) -> Action, assume_yes: bool) -> Result<(), Error> {
	if packages.is_empty() {
		return Err(Error::MissingArgument)
	}
	let actions = packages.iter()
		.map(|p| find_key(client, p).map(|key| action(key, target)))
		.collect::<Result<Vec<_>, _>>()?;

	let transaction = client.create_transaction(&actions)?;
	if transaction.is_empty() {
		println!("Nothing to do.");
		return Ok(())
	}

	println!("Steps:");
	for step in transaction.steps() {
		println!("\t{}", step);
	}

	if !assume_yes {
		confirm(&mut std::io::stdin().lock())?;
	}

	client.run_transaction(&transaction, None, |event| match event {
		TransactionEvent::Download { key, current, total, .. } => {
			log::trace!("{} {}/{}", key, current, total);
			if total > 0 && current == total {
				println!("Downloaded {} ({} bytes)", key.id(), total);
			}
		},
		TransactionEvent::Step { key, action, .. } => println!("{} {} done", action, key.id()),
	}, &Canceller::new())?;

	println!("Transaction complete.");
	Ok(())
}

/// Asks whether to go ahead, an empty answer means yes.
///
/// # Errors
/// - [`UserCancelled`](Error::UserCancelled) when the answer is no or `input` is closed.
fn confirm(input: &mut impl BufRead) -> Result<(), Error> {
	print!("Commit changes? [(y)/n] ");
	let _ = std::io::stdout().flush();
	loop {
		let mut line = String::new();
		match input.read_line(&mut line) {
			Ok(0) | Err(_) => {
				/* No one is there to answer */
				println!();
				return Err(Error::UserCancelled);
			},
			Ok(_) => {},
		}
		let line = line.trim().to_lowercase();
		if line == "y" || line.is_empty() {
			return Ok(());
		} else if line == "n" {
			return Err(Error::UserCancelled);
		} else {
			println!("\nInput invalid.")
		}
	}
}

/// Fetches payloads over http(s), anything else goes through [`FileFetch`].
struct HttpFetch {
	client: reqwest::blocking::Client,
}

impl HttpFetch {
	fn new(https_only: bool) -> Result<Self, reqwest::Error> {
		let client = reqwest::blocking::Client::builder()
			.https_only(https_only)
			.build()?;
		Ok(HttpFetch { client })
	}

	fn is_remote(url: &str) -> bool {
		url.starts_with("http://") || url.starts_with("https://")
	}

	/// Loads a repository index from a file or a url.
	fn repository(&self, source: &str) -> Result<Repository, Error> {
		if !Self::is_remote(source) {
			return Ok(Repository::load_from_file(source)?)
		}
		let text = self.client.get(source).send()?.error_for_status()?.text()?;
		Ok(Repository::from_json(&text)?)
	}
}

impl Fetch for HttpFetch {
	fn fetch(&self, url: &str, writer: &mut dyn Write, progress: &mut dyn FnMut(u64, u64)) -> Result<u64, DownloadError> {
		if !Self::is_remote(url) {
			return FileFetch.fetch(url, writer, progress)
		}

		let mut response = self.client.get(url).send()
			.and_then(|r| r.error_for_status())
			.map_err(|e| DownloadError::Transfer(e.to_string()))?;

		let total = response.content_length().unwrap_or(0);
		let mut buf = vec![0u8; 64 * 1024];
		let mut current = 0;

		progress(0, total);
		loop {
			let n = response.read(&mut buf)?;
			if n == 0 { break; }
			writer.write_all(&buf[..n])?;
			current += n as u64;
			progress(current, total);
		}
		Ok(current)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("pkgtx error: {0}")]
	Pkgtx(#[from] pkgtx::Error),
	#[error("{0}")]
	Transaction(#[from] pkgtx::TransactionError),
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("invalid package key: {0}")]
	Key(#[from] pkgtx::repo::PackageKeyParseError),
	#[error("package `{0}` is not in any loaded repository")]
	UnknownPackage(String),
	#[error("Missing argument")]
	MissingArgument,
	#[error("{0}")]
	InvalidArgument(String),
	#[error("User cancelled an action")]
	UserCancelled,
}
