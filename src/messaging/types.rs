//! Tipos de dados para eventos de mensagem recebidos e requisições enviadas à API do Discord.
//!
//! Os nomes dos campos seguem o formato JSON do Discord (`channel_id`,
//! `content_type`, ...) para que os eventos do gateway possam ser
//! desserializados diretamente.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier;

/// Um anexo de mensagem conforme descrito pelo Discord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Identificador do anexo (pode estar ausente em eventos sintéticos).
    #[serde(default)]
    pub id: String,
    /// URL de download do arquivo.
    pub url: String,
    /// Nome original do arquivo enviado.
    pub filename: String,
    /// Tipo de mídia declarado (ex.: "video/mp4"). O Discord nem sempre o envia.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Tamanho em bytes, conforme informado pelo remetente.
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    /// Indica se o anexo é um vídeo elegível para renderização.
    pub fn is_eligible(&self) -> bool {
        classifier::is_eligible(self.content_type.as_deref(), &self.filename)
    }

    /// Extensão segura para nomear o arquivo de entrada no workspace.
    ///
    /// Aceita apenas extensões alfanuméricas curtas; qualquer outra coisa vira `mp4`.
    pub fn safe_extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "mp4".to_string())
    }
}

/// Autor de uma mensagem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    /// `true` para contas de bot, incluindo o próprio bot.
    #[serde(default)]
    pub bot: bool,
}

/// Evento de mensagem recebido do gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Identificador da mensagem.
    pub id: String,
    /// Canal onde a mensagem foi enviada; as respostas vão para o mesmo canal.
    pub channel_id: String,
    pub author: Author,
    /// Texto da mensagem.
    #[serde(default)]
    pub content: String,
    /// Anexos na ordem em que aparecem na mensagem.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Corpo JSON de `POST /channels/{id}/messages` para mensagens de texto.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessage<'a> {
    pub content: &'a str,
}
