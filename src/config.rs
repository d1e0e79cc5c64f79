//! Configuração do bot carregada a partir de `overlay-bot.toml`.
//!
//! A struct [`BotConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente têm precedência sobre o arquivo, e as flags da CLI
//! (aplicadas em `cli.rs`) têm precedência sobre ambas.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "overlay-bot.toml";

/// Configuração de nível superior do bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Token do bot Discord. Obrigatório apenas para `serve`.
    pub discord_token: String,

    /// Imagem de fundo vertical usada em toda renderização.
    pub background_path: PathBuf,

    /// Executável do ffmpeg (nome no PATH ou caminho absoluto).
    pub ffmpeg_path: PathBuf,

    /// Número máximo de jobs ativos ao mesmo tempo.
    pub max_concurrent: usize,

    /// Diretório raiz dos workspaces temporários. `None` usa o temp do SO.
    pub scratch_dir: Option<PathBuf>,

    /// Tempo máximo de uma execução do ffmpeg, em segundos.
    pub transcode_timeout_secs: u64,

    /// Tempo máximo de um download de anexo, em segundos.
    pub download_timeout_secs: u64,

    /// URL base da API REST do Discord.
    pub discord_api_base: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            background_path: PathBuf::from("background.jpg"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_concurrent: 2,
            scratch_dir: None,
            transcode_timeout_secs: 600,
            download_timeout_secs: 300,
            discord_api_base: "https://discord.com/api/v10".to_string(),
        }
    }
}

impl BotConfig {
    /// Carrega a configuração de `overlay-bot.toml` no diretório atual,
    /// aplicando as variáveis de ambiente do processo.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
    }

    /// Carrega de `path` (defaults se o arquivo não existir) e aplica
    /// as variáveis obtidas por `lookup`.
    pub fn load_from(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<BotConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Sobrescreve campos com variáveis de ambiente não vazias.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("DISCORD_TOKEN") {
            self.discord_token = token;
        }
        if let Some(path) = var("BACKGROUND_PATH") {
            self.background_path = PathBuf::from(path);
        }
        if let Some(path) = var("FFMPEG_PATH") {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(dir) = var("SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(base) = var("DISCORD_API_BASE") {
            self.discord_api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(value) = var("MAX_CONCURRENT") {
            self.max_concurrent = parse_number("MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = var("TRANSCODE_TIMEOUT_SECS") {
            self.transcode_timeout_secs = parse_number("TRANSCODE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("DOWNLOAD_TIMEOUT_SECS") {
            self.download_timeout_secs = parse_number("DOWNLOAD_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    /// Verifica a configuração antes de iniciar o trabalho.
    ///
    /// O token só é exigido quando `require_token` é verdadeiro (`serve`).
    pub fn validate(&self, require_token: bool) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if !self.background_path.is_file() {
            return Err(ConfigError::BackgroundMissing(self.background_path.clone()));
        }
        if require_token && self.discord_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }

    /// Diretório onde os workspaces dos jobs são criados.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("overlay-bot"))
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Token mascarado para exibição, mantendo só os últimos 4 caracteres.
    pub fn redacted_token(&self) -> String {
        let token = self.discord_token.trim();
        if token.is_empty() {
            return "(not set)".to_string();
        }
        let chars: Vec<char> = token.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
