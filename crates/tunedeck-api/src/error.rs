use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("server reported failure for {endpoint}")]
    Rejected { endpoint: &'static str },
    #[error("server response for {endpoint} carried no data")]
    MissingData { endpoint: &'static str },
    #[error("login failed")]
    LoginFailed,
}
