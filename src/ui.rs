//! Interface de terminal do overlay-bot: spinners e saída colorida.
//!
//! Usa `indicatif` para o spinner de progresso e `console` para cores.
//! Só é usada pelos subcomandos interativos (`render` e `check`).

use std::path::Path;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::BotConfig;
use crate::error::TranscodeError;
use crate::transcode::TranscodeSuccess;

/// Indicador visual de progresso para uma renderização local.
pub struct RenderProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl RenderProgress {
    /// Inicia o spinner com o nome do arquivo de entrada.
    pub fn start(input: &Path) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("Rendering {}", input.display()));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Finaliza o spinner e exibe o resultado.
    ///
    /// Em caso de falha, o diagnóstico do ffmpeg é impresso abaixo.
    pub fn complete(&self, result: &Result<TranscodeSuccess, TranscodeError>) {
        self.pb.finish_and_clear();
        match result {
            Ok(done) => {
                println!(
                    "  {} Wrote {} ({})",
                    self.green.apply_to("✓"),
                    done.output.display(),
                    human_bytes(done.bytes)
                );
            }
            Err(err) => {
                println!("  {} Render failed: {err}", self.red.apply_to("✗"));
                if let Some(diag) = err.diagnostic() {
                    println!("{}", Style::new().dim().apply_to(diag));
                }
            }
        }
    }
}

/// Imprime a configuração resolvida e o estado do ffmpeg.
pub fn print_check(config: &BotConfig, ffmpeg: &Result<String, TranscodeError>) {
    let bold = Style::new().bold();
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();

    println!("{}", bold.apply_to("─── Configuration ───"));
    println!("  token            {}", config.redacted_token());
    println!("  background       {}", config.background_path.display());
    println!("  ffmpeg           {}", config.ffmpeg_path.display());
    println!("  max_concurrent   {}", config.max_concurrent);
    println!("  scratch_dir      {}", config.scratch_root().display());
    println!("  transcode limit  {}s", config.transcode_timeout_secs);
    println!("  download limit   {}s", config.download_timeout_secs);
    println!("  api base         {}", config.discord_api_base);
    println!();

    let background = if config.background_path.is_file() {
        green.apply_to("found")
    } else {
        red.apply_to("missing")
    };
    println!("  background image {background}");

    match ffmpeg {
        Ok(version) => println!("  {} {version}", green.apply_to("✓")),
        Err(err) => println!("  {} ffmpeg not runnable: {err}", red.apply_to("✗")),
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
