//! Image Text Recognition
//!
//! Turns a photo of a note, poster or ticket into text that can be sent to the
//! assistant as a scheduling request.
//!
//! Recognition itself is somebody else's job: [`TextRecognizer`] is the seam,
//! and [`CommandRecognizer`] plugs in any OCR program that prints the text it
//! finds on stdout (Tesseract by default).

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Image handed to a recognizer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    /// Image file on disk
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, ...)
    Bytes(Vec<u8>),
}

/// Extracts text from an image
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognizer name for logs
    fn name(&self) -> &str;

    /// Recognize the text in an image
    ///
    /// An image without text yields an empty string, not an error.
    async fn recognize(&self, image: &ImageSource) -> anyhow::Result<String>;
}

/// Placeholder in [`CommandRecognizer`] arguments replaced by the image
pub const IMAGE_ARG: &str = "{image}";

/// Runs an external OCR program
#[derive(Clone, Debug)]
pub struct CommandRecognizer {
    /// Program to run
    program: String,
    /// Arguments, with [`IMAGE_ARG`] standing for the image
    args: Vec<String>,
    /// What [`IMAGE_ARG`] becomes when the image is piped on stdin
    stdin_arg: String,
}

impl CommandRecognizer {
    /// Run `program {image} stdout`, the Tesseract calling convention
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![IMAGE_ARG.to_string(), "stdout".to_string()],
            stdin_arg: "stdin".to_string(),
        }
    }

    /// Tesseract with its default language data
    #[must_use]
    pub fn tesseract() -> Self {
        Self::new("tesseract")
    }

    /// Replace the argument list
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set what the image argument becomes for in-memory images
    #[must_use]
    pub fn with_stdin_arg(mut self, arg: impl Into<String>) -> Self {
        self.stdin_arg = arg.into();
        self
    }

    /// Program that will be run
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn build_args(&self, image_arg: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(IMAGE_ARG, image_arg))
            .collect()
    }
}

impl Default for CommandRecognizer {
    fn default() -> Self {
        Self::tesseract()
    }
}

#[async_trait]
impl TextRecognizer for CommandRecognizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn recognize(&self, image: &ImageSource) -> anyhow::Result<String> {
        let (image_arg, piped) = match image {
            ImageSource::Path(path) => (path.display().to_string(), None),
            ImageSource::Bytes(data) => (self.stdin_arg.clone(), Some(data.as_slice())),
        };

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(self.build_args(&image_arg))
            .stdin(if piped.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start OCR program `{}`", self.program))?;

        if let Some(data) = piped {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(data)
                    .await
                    .context("failed to pipe image to OCR program")?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("OCR program `{}` did not finish", self.program))?;

        if !output.status.success() {
            anyhow::bail!(
                "OCR program `{}` exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(program = %self.program, chars = text.chars().count(), "Recognized image text");
        Ok(text)
    }
}
