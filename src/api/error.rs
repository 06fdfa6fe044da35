//! Tipos de erro para o cliente da API OpenSesame.
//!
//! [`ApiError`] separa as classes de falha que o pipeline trata de formas
//! diferentes: autenticação (repetida pelo laço do token), erros do cliente
//! (fatais, nunca repetidos), tentativas transitórias esgotadas e falhas de
//! download.

use thiserror::Error;

/// Errors that can occur while talking to the OpenSesame API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The token endpoint rejected the credentials or returned no token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A 4xx response other than 401. The request itself is wrong, so
    /// retrying would only repeat the failure.
    #[error("client error (status {status}): {body}")]
    Client { status: u16, body: String },

    /// Every attempt hit a retryable status or a network error.
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The package could not be fetched.
    #[error("could not download file from URL {url}: {reason}")]
    Download { url: String, reason: String },

    /// Underlying transport failure (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx response whose body did not match the expected JSON shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
