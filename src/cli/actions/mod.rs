pub mod upload;

use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Upload {
        file: PathBuf,
        bucket_code: String,
        api_url: String,
        note: String,
        content_type: String,
        token: Option<SecretString>,
    },
}
