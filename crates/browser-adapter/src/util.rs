use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

use crate::error::DriverError;

const WS_URL_DEADLINE: Duration = Duration::from_secs(20);
const STDERR_PREVIEW_LINES: usize = 8;

/// Scrape the DevTools websocket URL from a freshly launched browser.
/// Chromium announces it on stderr as a single "DevTools listening on
/// ws://..." line once the endpoint is up.
pub(crate) async fn extract_ws_url(child: &mut Child) -> Result<String, DriverError> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| DriverError::Launch("chromium stderr was not captured".into()))?;

    let mut lines = BufReader::new(stderr).lines();
    let mut preview = Vec::new();

    let scan = async {
        while let Some(line) = lines.next().await {
            let line = line.map_err(|err| DriverError::Io(err.to_string()))?;
            if let Some((_, tail)) = line.rsplit_once("listening on ") {
                let url = tail.trim();
                if url.starts_with("ws") && url.contains("devtools/browser") {
                    return Ok(url.to_string());
                }
            }
            if preview.len() < STDERR_PREVIEW_LINES {
                preview.push(line);
            }
        }
        Err(DriverError::Launch(format!(
            "chromium exited before announcing its devtools endpoint: {}",
            preview.join(" | ")
        )))
    };

    match timeout(WS_URL_DEADLINE, scan).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout("devtools websocket url".into())),
    }
}
