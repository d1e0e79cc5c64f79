//! Tipos de erro para o cliente da API de mensagens.
//!
//! Define [`MessagingError`] com variantes para rate limiting, erros da API,
//! falhas de rede e falhas ao ler o arquivo a ser enviado.

use std::path::PathBuf;

use thiserror::Error;

/// Erros que podem ocorrer ao enviar mensagens ou arquivos para o canal.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 403 sem permissão, 413 arquivo grande demais).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// O arquivo a ser enviado não pôde ser lido.
    #[error("failed to read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
