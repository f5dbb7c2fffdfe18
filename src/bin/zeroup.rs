use colored::Colorize;
use std::process;
use zeroup::cli::{actions::upload, start};

#[tokio::main]
async fn main() {
    let (action, globals) = match start() {
        Ok(rs) => rs,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red());
            process::exit(1);
        }
    };

    if let Err(e) = upload::handle(action, globals).await {
        eprintln!("{} {e:#}", "Error:".red());
        process::exit(1);
    }
}
