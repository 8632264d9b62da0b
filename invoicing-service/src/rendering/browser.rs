//! Headless browser runtime.
//!
//! A session owns an isolated profile directory; closing or dropping it
//! removes the directory and kills any Chrome process still running.

use crate::rendering::renderer::RenderError;
use crate::rendering::DocumentFormat;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::Instant;

/// A4 at 96 dpi.
pub const PAGE_WIDTH_PX: u32 = 794;
pub const PAGE_HEIGHT_PX: u32 = 1123;
pub const SCREENSHOT_SCALE: u32 = 2;
/// Chrome refuses textures taller than 16384 device pixels.
pub const MAX_SCREENSHOT_HEIGHT_PX: u32 = 16384 / SCREENSHOT_SCALE;

const HEIGHT_ATTR: &str = "data-content-height";

/// Records the laid-out document height on the root element once loaded so
/// a `--dump-dom` pass can report it.
const MEASURE_SCRIPT: &str = "<script>window.addEventListener('load',function(){\
var e=document.documentElement;\
e.setAttribute('data-content-height',Math.ceil(Math.max(e.scrollHeight,document.body?document.body.scrollHeight:0)));\
});</script>";

#[async_trait]
pub trait HeadlessBrowser: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderError>;
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Load `html`, wait for the network to settle and capture it.
    async fn render(&mut self, html: &str, format: DocumentFormat) -> Result<Vec<u8>, RenderError>;

    async fn close(self: Box<Self>) -> Result<(), RenderError>;
}

/// Drives a Chrome or Chromium binary in headless mode.
#[derive(Debug, Clone)]
pub struct ChromeBrowser {
    binary: PathBuf,
    timeout: Duration,
    settle: Duration,
}

impl ChromeBrowser {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration, settle: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            settle,
        }
    }
}

#[async_trait]
impl HeadlessBrowser for ChromeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderError> {
        if self.binary.is_absolute() && !self.binary.exists() {
            return Err(RenderError::Launch(format!(
                "browser binary not found at {}",
                self.binary.display()
            )));
        }

        let profile = tempfile::Builder::new()
            .prefix("invoice-render-")
            .tempdir()
            .map_err(|e| RenderError::Launch(format!("failed to create profile dir: {}", e)))?;

        tracing::debug!(profile = ?profile.path(), "Browser session opened");

        Ok(Box::new(ChromeSession {
            binary: self.binary.clone(),
            timeout: self.timeout,
            settle: self.settle,
            profile,
        }))
    }
}

struct ChromeSession {
    binary: PathBuf,
    timeout: Duration,
    settle: Duration,
    profile: TempDir,
}

impl ChromeSession {
    /// Run the browser once and return its stdout.
    async fn run(&self, args: &[String], deadline: Instant) -> Result<Vec<u8>, RenderError> {
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Launch(format!("{}: {}", self.binary.display(), e)))?;

        let result = tokio::time::timeout_at(deadline, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout.as_secs()))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            tracing::error!(status = ?result.status, stderr = %stderr, "Headless browser failed");
            return Err(RenderError::Browser(format!(
                "exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(result.stdout)
    }

    /// Lay the page out at A4 width and read back its full height.
    async fn measure_height(&self, html: &str, deadline: Instant) -> Result<u32, RenderError> {
        let input = self.profile.path().join("measure.html");
        tokio::fs::write(&input, with_measure_script(html)).await?;

        let args = measure_args(self.profile.path(), &input, self.settle);
        let dom = self.run(&args, deadline).await?;

        let height = parse_content_height(&String::from_utf8_lossy(&dom));
        if height.is_none() {
            tracing::warn!("Content height not reported, capturing a single page");
        }
        Ok(screenshot_height(height))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn render(&mut self, html: &str, format: DocumentFormat) -> Result<Vec<u8>, RenderError> {
        let deadline = Instant::now() + self.timeout;
        let input = self.profile.path().join("document.html");
        let output = self
            .profile
            .path()
            .join(format!("output.{}", format.extension()));
        tokio::fs::write(&input, html).await?;

        let height = match format {
            DocumentFormat::Pdf => PAGE_HEIGHT_PX,
            DocumentFormat::Png => self.measure_height(html, deadline).await?,
        };
        let args = chrome_args(self.profile.path(), &input, &output, format, self.settle, height);

        tracing::debug!(
            binary = ?self.binary,
            format = format.as_str(),
            height,
            timeout_secs = self.timeout.as_secs(),
            "Running headless browser"
        );

        self.run(&args, deadline).await?;

        let bytes = tokio::fs::read(&output).await.map_err(|e| {
            RenderError::Browser(format!("no {} output produced: {}", format.as_str(), e))
        })?;
        if bytes.is_empty() {
            return Err(RenderError::Browser(format!(
                "empty {} output",
                format.as_str()
            )));
        }

        Ok(bytes)
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        let path = self.profile.path().to_path_buf();
        self.profile.close()?;
        tracing::debug!(profile = ?path, "Browser session closed");
        Ok(())
    }
}

fn with_measure_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], MEASURE_SCRIPT, &html[at..]),
        None => format!("{}{}", html, MEASURE_SCRIPT),
    }
}

/// Height recorded by the measuring script in a dumped DOM.
pub fn parse_content_height(dom: &str) -> Option<u32> {
    let start = dom.find(HEIGHT_ATTR)? + HEIGHT_ATTR.len();
    let value = dom[start..].trim_start_matches(['=', '"', '\'']);
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Window height for a full-page screenshot: never shorter than one page,
/// never taller than Chrome can capture.
pub fn screenshot_height(content_height: Option<u32>) -> u32 {
    content_height
        .unwrap_or(PAGE_HEIGHT_PX)
        .clamp(PAGE_HEIGHT_PX, MAX_SCREENSHOT_HEIGHT_PX)
}

fn base_args(profile: &Path, settle: Duration) -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--hide-scrollbars".to_string(),
        "--disable-extensions".to_string(),
        "--run-all-compositor-stages-before-draw".to_string(),
        format!("--user-data-dir={}", profile.display()),
        format!("--virtual-time-budget={}", settle.as_millis()),
    ]
}

/// Command line for the layout pass that precedes a PNG capture.
pub fn measure_args(profile: &Path, input: &Path, settle: Duration) -> Vec<String> {
    let mut args = base_args(profile, settle);
    args.push(format!("--window-size={},{}", PAGE_WIDTH_PX, PAGE_HEIGHT_PX));
    args.push("--dump-dom".to_string());
    args.push(format!("file://{}", input.display()));
    args
}

/// Command line for one headless capture. `page_height` sizes the PNG
/// window so the screenshot covers the whole document.
pub fn chrome_args(
    profile: &Path,
    input: &Path,
    output: &Path,
    format: DocumentFormat,
    settle: Duration,
    page_height: u32,
) -> Vec<String> {
    let mut args = base_args(profile, settle);

    match format {
        DocumentFormat::Pdf => {
            args.push("--no-pdf-header-footer".to_string());
            args.push(format!("--print-to-pdf={}", output.display()));
        }
        DocumentFormat::Png => {
            args.push(format!("--window-size={},{}", PAGE_WIDTH_PX, page_height));
            args.push(format!("--force-device-scale-factor={}", SCREENSHOT_SCALE));
            args.push(format!("--screenshot={}", output.display()));
        }
    }

    args.push(format!("file://{}", input.display()));
    args
}
