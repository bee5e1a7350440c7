//! External `rembg` command backend

use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{BackgroundRemover, MattingError, Result};

/// Runs `rembg i [-m model] <input> <output>` on temporary PNG files
#[derive(Debug, Clone)]
pub struct RembgCommand {
    program: PathBuf,
    model: Option<String>,
}

impl RembgCommand {
    /// Resolve `command` on PATH (or as a path)
    pub fn locate(command: &str, model: Option<String>) -> Result<Self> {
        let program =
            which::which(command).map_err(|_| MattingError::ToolNotFound(command.to_string()))?;
        Ok(Self { program, model })
    }

    /// Resolved program path
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("i");
        if let Some(model) = &self.model {
            cmd.args(["-m", model]);
        }
        cmd.arg(input).arg(output);
        cmd
    }
}

impl BackgroundRemover for RembgCommand {
    fn name(&self) -> &str {
        "rembg"
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.png");
        let output = dir.path().join("output.png");

        image.save(&input)?;

        debug!("Running {} on {}", self.program.display(), input.display());
        let result = self.build_command(&input, &output).output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MattingError::CommandFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        if !output.exists() {
            return Err(MattingError::CommandFailed(
                "no output image was written".to_string(),
            ));
        }

        Ok(image::open(&output)?.to_rgba8())
    }
}
