use crate::cli::{auth::DEFAULT_TOKEN_FILE, commands::validator_is_file};
use clap::{Arg, Command};

pub fn command() -> Command {
    Command::new("upload")
        .about("Upload a file through presigned URLs handed out by the API")
        .arg(
            Arg::new("file")
                .help("/path/to/file")
                .required(true)
                .value_parser(validator_is_file())
                .num_args(1),
        )
        .arg(
            Arg::new("bucket-code")
                .help("Bucket code, example: eu")
                .long("bucket-code")
                .env("ZEROUP_BUCKET_CODE")
                .num_args(1),
        )
        .arg(
            Arg::new("api-url")
                .help("API server base URL, example: https://zerofs.link/api/")
                .long("api-url")
                .env("ZEROUP_API_URL")
                .value_parser(validator_is_url())
                .num_args(1),
        )
        .arg(
            Arg::new("note")
                .help("Optional note or description for the file")
                .long("note")
                .num_args(1),
        )
        .arg(
            Arg::new("content-type")
                .help("Content type of the file")
                .long("content-type")
                .default_value("application/octet-stream")
                .num_args(1),
        )
        .arg(
            Arg::new("token")
                .help("Authentication token")
                .long("token")
                .env("ZEROUP_TOKEN")
                .hide_env_values(true)
                .num_args(1),
        )
        .arg(
            Arg::new("token-file")
                .help(format!("Path to token file (default: {DEFAULT_TOKEN_FILE})"))
                .long("token-file")
                .num_args(1),
        )
}

fn validator_is_url() -> clap::builder::ValueParser {
    clap::builder::ValueParser::from(move |s: &str| -> std::result::Result<String, String> {
        url::Url::parse(s)
            .map(|_| s.to_string())
            .map_err(|e| format!("Invalid URL '{s}': {e}"))
    })
}
