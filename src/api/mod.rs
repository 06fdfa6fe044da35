pub mod client;
pub mod error;
pub mod types;

pub use client::{
    CatalogApi, Credentials, OpenSesameClient, ResponseClass, RetryPolicy, Timeouts, classify,
};
pub use error::ApiError;
pub use types::{AccessToken, CoursePage, DownloadedPackage, Paging};
