use std::collections::BTreeMap;

fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",    "Show help");
		opts.optflag( "v", "verbose", "Increased verbosity");
		opts.optopt(  "c", "config",  "Read the config from this file", "FILE");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); std::process::exit(2) }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage("Usage: regions-rs-terminal [options] <batch.json>\n       regions-rs-terminal [options] regions <features.json> <region>=<requirement>..."));
			return;
		}

		parsed_options
	};

	let mut logger = env_logger::Builder::from_default_env();
	if parsed_options.opt_present("v") {
		logger.filter_level(log::LevelFilter::Debug);
	}
	logger.init();

	let config = match parsed_options.opt_str("c") {
		Some(path) => match regions_rs::Config::load_from_path(&path) {
			Ok(config) => config,
			Err(e) => { log::error!("Failed to read config file {}: {}", path, e); std::process::exit(1) },
		},
		None => regions_rs::Config::load_from_disk().unwrap_or_else(|e| {
			log::warn!("Failed to read config file: {}", e);
			log::warn!("Using default config.");
			regions_rs::Config::default()
		}),
	};

	let result = match parsed_options.free.first().map(String::as_str) {
		None => Err(Error::MissingArgument),
		Some("regions") => resolve_regions(&config, &parsed_options.free[1..]),
		Some(path) => resolve_batch(path),
	};

	match result {
		Ok(json) => println!("{}", json),
		Err(e) => {
			log::error!("{}", e);
			std::process::exit(1);
		},
	}
}

fn resolve_batch(path: &str) -> Result<String, Error> {
	let document = regions_rs::batch::BatchDocument::load_from_path(path)?;
	let resolution = regions_rs::batch::resolve(&document, &regions_rs::resolver::SimpleResolver)?;
	Ok(resolution.to_json()?)
}

/// Resolves `<region>=<requirement>` pairs against a feature repository and lists the bundle locations per region.
fn resolve_regions(config: &regions_rs::Config, args: &[String]) -> Result<String, Error> {
	let repository = args.first().ok_or(Error::MissingArgument)?;
	let repository = regions_rs::feature::FeatureRepository::load_from_path(repository)?;

	let mut builder = regions_rs::subsystem_resolver::SubsystemResolverBuilder::from_config(config)
		.add_repositories([repository]);
	for arg in &args[1..] {
		let (region, requirement) = arg.split_once('=').ok_or_else(|| Error::InvalidRequirement(arg.clone()))?;
		builder = builder.add_requirements(region, [requirement]);
	}

	let downloads = regions_rs::download::TokioDownloadManager::new(config).map_err(regions_rs::Error::from)?;
	let resolved = builder.build()?.resolve(&regions_rs::resolver::SimpleResolver, &downloads)?;

	let locations: BTreeMap<String, Vec<String>> = resolved.bundle_infos()
		.into_iter()
		.map(|(region, infos)| (region, infos.into_keys().collect()))
		.collect();
	Ok(serde_json::to_string_pretty(&locations)?)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("regions-rs error: {0}")]
	RegionsError(#[from] regions_rs::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("Missing argument")]
	MissingArgument,
	#[error("Expected <region>=<requirement>, got {0}")]
	InvalidRequirement(String),
}
