use crate::{
    api::{ApiClient, NewUpload, StorageClient, UploadTicket},
    cli::{actions::Action, globals::GlobalArgs, progressbar::Bar},
    upload::{UploadOrchestrator, Uploaded, upload_single},
};
use anyhow::{Context, Result, anyhow};
use bytesize::ByteSize;
use colored::Colorize;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// # Errors
/// Will return an error if the action fails
pub async fn handle(action: Action, globals: GlobalArgs) -> Result<()> {
    let Action::Upload {
        file,
        bucket_code,
        api_url,
        note,
        content_type,
        token,
    } = action;

    let metadata = std::fs::metadata(&file)
        .with_context(|| format!("cannot read the file: {}", file.display()))?;

    if !metadata.is_file() {
        return Err(anyhow!(
            "cannot read the file: {}, verify file exist and is not a directory.",
            file.display()
        ));
    }

    let file_size = metadata.len();

    log::info!("file path: {}\nfile size: {file_size}", file.display());

    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid file name: {}", file.display()))?;

    println!("{:<12} {filename}", "File:".green());
    println!("{:<12} {}", "Size:".green(), ByteSize(file_size));
    println!("{:<12} {bucket_code}", "Region Code:".green());
    println!("{:<12} {api_url}", "API Server:".green());
    println!();

    if token.is_none() {
        println!(
            "{} No authentication token provided. Upload will be anonymous.",
            "Warning:".yellow()
        );
        println!();
    }

    let client = Client::builder().user_agent(USER_AGENT).build()?;

    let api = ApiClient::new(&api_url, client.clone(), token);

    println!("Requesting presigned URLs from API server...");

    let ticket = api
        .initiate_upload(&NewUpload {
            filename,
            file_size,
            bucket_code: &bucket_code,
            content_type: &content_type,
            note: &note,
        })
        .await?;

    log::debug!("ticket: {ticket:#?}");

    println!("Upload type: {}", ticket.upload_type().yellow());
    println!();

    let interrupt = interrupt_on_ctrl_c();

    let uploader = Arc::new(StorageClient::new(client));

    let progress = Bar::new(file_size, globals.quiet).aggregator();

    let config = globals.transfer_config();

    let uploaded = match &ticket {
        UploadTicket::Single(single) => {
            println!("Starting single upload for {filename}...");

            upload_single(
                uploader,
                &api,
                &file,
                &single.url,
                &single.headers,
                &single.completion_token,
                config,
                progress,
                interrupt,
            )
            .await?
        }

        UploadTicket::Multipart(multipart) => {
            println!("Starting multipart upload for {filename}...");
            println!(
                "File size: {} | Chunk size: {} | Parts: {}",
                ByteSize(file_size),
                ByteSize(multipart.chunk_size),
                multipart.part_urls.len()
            );

            UploadOrchestrator::new(uploader, &api, config)
                .with_progress(progress)
                .with_interrupt(interrupt)
                .upload(&file, |size| multipart.descriptor(size))
                .await?
        }
    };

    print_result(&api_url, &uploaded, ticket.download_url());

    Ok(())
}

/// Cancel the returned token on the first Ctrl-C, parts in flight are
/// awaited and the upload is aborted. A second Ctrl-C exits right away.
fn interrupt_on_ctrl_c() -> CancellationToken {
    watch_interrupts(
        || async { tokio::signal::ctrl_c().await.is_ok() },
        || {
            std::process::exit(130);
        },
    )
}

fn watch_interrupts<S, F, Q>(mut signal: S, force_quit: Q) -> CancellationToken
where
    S: FnMut() -> F + Send + 'static,
    F: Future<Output = bool> + Send + 'static,
    Q: FnOnce() + Send + 'static,
{
    let interrupt = CancellationToken::new();

    let token = interrupt.clone();

    tokio::spawn(async move {
        if !signal().await {
            return;
        }

        eprintln!(
            "\n{} waiting for the parts in flight before aborting, Ctrl-C again to quit",
            "Interrupted,".red()
        );
        token.cancel();

        if signal().await {
            eprintln!("{} the upload was not aborted", "Quit,".red());
            force_quit();
        }
    });

    interrupt
}

fn print_result(api_url: &str, uploaded: &Uploaded, download_url: Option<&str>) {
    println!();
    println!("{}", "\u{2713} Upload successful!".green());

    if let Some(file_id) = &uploaded.file_id {
        println!("File ID: {}/{file_id}/", main_domain(api_url));
    }

    if let Some(url) = download_url {
        println!("Download link: {url}");
    }
}

/// The API URL without its last path segment, `https://host/api/` gives
/// `https://host`
#[must_use]
pub fn main_domain(api_url: &str) -> &str {
    let trimmed = api_url.trim_end_matches('/');

    trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(domain, _)| domain)
}
