pub mod cmd_upload;

use clap::{
    Arg, ColorChoice, Command,
    builder::ValueParser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::{fs, path::PathBuf};

pub fn validator_is_file() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<PathBuf, String> {
        if let Ok(metadata) = fs::metadata(s) {
            if metadata.is_file() {
                return Ok(PathBuf::from(s));
            }
        }

        Err(format!("Invalid file path or file does not exist: '{s}'"))
    })
}

pub fn new(config_path: &std::path::Path) -> Command {
    // get config file path (default: ~/.config/zeroup/config.yml)
    let config_file_path = config_path.join("config.yml");

    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("zeroup")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upload files to object storage through presigned URLs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("config")
            .help(format!("Config file (default: {})", config_file_path.display()))
            .long("config")
            .short('c')
            .global(true)
            .num_args(1)
            .value_parser(validator_is_file())
            .value_name("config.yml")
        )
        .arg(
            Arg::new("quiet")
            .long("quiet")
            .short('q')
            .help("Don't show progress bar")
            .global(true)
            .num_args(0)
        )
        .arg(
            Arg::new("verbose")
            .help("Verbosity level")
            .short('v')
            .long("verbose")
            .global(true)
            .action(clap::ArgAction::Count)
        )
        .arg(
            Arg::new("number")
            .help("Number of max concurrent part uploads (default: 4)")
            .short('n')
            .long("number")
            .global(true)
            .value_parser(clap::value_parser!(u8).range(1..=255))
            .num_args(1)
        )
        .arg(
            Arg::new("retries")
            .help("Number of attempts per part (default: 5)")
            .long("retries")
            .short('r')
            .global(true)
            .value_parser(clap::value_parser!(u32).range(1..=100))
            .num_args(1)
        )
        .subcommand(cmd_upload::command())
}
