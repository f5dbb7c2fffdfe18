use crate::cli::{
    Config,
    actions::Action,
    auth::{DEFAULT_TOKEN_FILE, resolve_token},
    commands,
    globals::GlobalArgs,
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use secrecy::ExposeSecret;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Config directory, `~/.config/zeroup`
///
/// # Errors
///
/// Will return `Err` if the directory can not be created
pub fn get_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().map_or_else(|| PathBuf::from("/tmp"), |h| h);

    let config_path = Path::new(&home_dir).join(".config").join("zeroup");
    fs::create_dir_all(&config_path)
        .context(format!("unable to create: {}", &config_path.display()))?;

    Ok(config_path)
}

/// # Errors
/// Will return an error if the config file can not be parsed or a required
/// argument is missing
pub fn start() -> Result<(Action, GlobalArgs)> {
    let config_path = get_config_path()?;

    // start the command line interface
    let cmd = commands::new(&config_path);

    // get the matches
    let matches = cmd.get_matches();

    let verbosity_level = match matches.get_count("verbose") {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };

    env_logger::Builder::new()
        .filter_level(verbosity_level)
        .init();

    log::info!("config path: {}", config_path.display());

    let config = load_config(&matches, &config_path)?;

    log::debug!("config: {config:#?}");

    let (action, global_args) = build(&matches, &config)?;

    log::debug!("globals: {global_args:#?}, action: {action:#?}");

    Ok((action, global_args))
}

/// The config file given with `--config`, or `config.yml` in the config
/// directory if it exists
fn load_config(matches: &ArgMatches, config_path: &Path) -> Result<Config> {
    if let Some(file) = matches.get_one::<PathBuf>("config") {
        return Config::new(file);
    }

    let default = config_path.join("config.yml");

    if default.is_file() {
        Config::new(&default)
    } else {
        Ok(Config::default())
    }
}

/// Merge the command line and the config file into the action to run
fn build(matches: &ArgMatches, config: &Config) -> Result<(Action, GlobalArgs)> {
    let Some(sub_m) = matches.subcommand_matches("upload") else {
        return Err(anyhow!("No command given, try {}", "--help".green()));
    };

    let mut global_args = GlobalArgs::new();

    global_args.quiet = sub_m.get_one::<bool>("quiet").copied().unwrap_or(false);

    if let Some(number) = sub_m
        .get_one::<u8>("number")
        .map(|n| usize::from(*n))
        .or(config.concurrency)
    {
        global_args.set_concurrency(number);
    }

    if let Some(retries) = sub_m.get_one::<u32>("retries").copied().or(config.retries) {
        global_args.set_retries(retries);
    }

    let file = sub_m
        .get_one::<PathBuf>("file")
        .cloned()
        .context("missing file to upload")?;

    let bucket_code = sub_m
        .get_one::<String>("bucket-code")
        .or(config.bucket_code.as_ref())
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "No bucket code found, use {} or set bucket_code in the config file",
                "--bucket-code".green()
            )
        })?;

    let api_url = sub_m
        .get_one::<String>("api-url")
        .or(config.api_url.as_ref())
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "No API URL found, use {} or set api_url in the config file",
                "--api-url".green()
            )
        })?;

    let token_file = sub_m
        .get_one::<String>("token-file")
        .or(config.token_file.as_ref())
        .map_or(DEFAULT_TOKEN_FILE, String::as_str);

    let token = resolve_token(
        sub_m.get_one::<String>("token").map(String::as_str),
        config.token.as_ref().map(|t| t.expose_secret()),
        Path::new(token_file),
    );

    let action = Action::Upload {
        file,
        bucket_code,
        api_url,
        note: sub_m.get_one::<String>("note").cloned().unwrap_or_default(),
        content_type: sub_m
            .get_one::<String>("content-type")
            .cloned()
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        token,
    };

    Ok((action, global_args))
}
