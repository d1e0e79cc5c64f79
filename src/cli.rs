//! Interface de linha de comando do overlay-bot baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, render, check)
//! e flags globais que sobrescrevem a configuração carregada.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::BotConfig;

/// overlay-bot: compõe vídeos anexados sobre um fundo vertical com ffmpeg.
#[derive(Debug, Parser)]
#[command(name = "overlay-bot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emite logs em JSON, um objeto por linha.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    /// Número máximo de jobs simultâneos.
    #[arg(long, global = true)]
    pub max_concurrent: Option<usize>,

    /// Caminho da imagem de fundo.
    #[arg(long, global = true)]
    pub background: Option<PathBuf>,

    /// Caminho do executável do ffmpeg.
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lê eventos de mensagem (JSON, um por linha) da entrada padrão e
    /// processa os anexos de vídeo.
    Serve,

    /// Renderiza um arquivo local e mostra o resultado.
    Render {
        /// Vídeo de entrada.
        input: PathBuf,

        /// Arquivo de saída.
        #[arg(long, short, default_value = "output.mp4")]
        output: PathBuf,
    },

    /// Mostra a configuração resolvida e verifica o ffmpeg.
    Check,
}

impl Cli {
    /// Aplica as flags globais sobre a configuração (precedência máxima).
    pub fn apply_overrides(&self, config: &mut BotConfig) {
        if let Some(n) = self.max_concurrent {
            config.max_concurrent = n;
        }
        if let Some(path) = &self.background {
            config.background_path = path.clone();
        }
        if let Some(path) = &self.ffmpeg {
            config.ffmpeg_path = path.clone();
        }
    }
}
