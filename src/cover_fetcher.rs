use crate::error::Result;
use crate::poll_engine::CoverArt;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Result of one cover fetch, tagged with the URL it was requested for so
/// the poll loop can drop deliveries that no longer match the current track.
#[derive(Debug, Clone)]
pub struct CoverDelivery {
    pub url: String,
    /// `None` is the explicit "no image" signal: network failure, non-2xx
    /// response, or undecodable bytes.
    pub art: Option<CoverArt>,
}

/// Downloads and decodes album art off the poll task.
#[derive(Clone)]
pub struct CoverFetcher {
    http_client: Client,
}

impl CoverFetcher {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { http_client })
    }

    /// Fire-and-forget fetch. The delivery (image or failure signal) lands on
    /// `tx`. A superseded fetch is not cancelled; the poll loop ignores its
    /// delivery when the URL no longer matches.
    pub fn fetch(&self, url: String, tx: mpsc::Sender<CoverDelivery>) {
        let client = self.http_client.clone();

        tokio::spawn(async move {
            let art = match download(&client, &url).await {
                Ok(bytes) => decode_cover(&bytes),
                Err(e) => {
                    log::warn!("Cover download failed for {}: {}", url, e);
                    None
                }
            };

            if tx.send(CoverDelivery { url, art }).await.is_err() {
                log::debug!("Cover delivery dropped, poll loop is gone");
            }
        });
    }
}

async fn download(client: &Client, url: &str) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

fn decode_cover(bytes: &[u8]) -> Option<CoverArt> {
    match image::load_from_memory(bytes) {
        Ok(decoded) => {
            let rgba = decoded.to_rgba8();
            let (width, height) = rgba.dimensions();
            Some(CoverArt {
                width: width as usize,
                height: height as usize,
                rgba: rgba.into_raw(),
            })
        }
        Err(e) => {
            log::warn!("Cover decode failed: {}", e);
            None
        }
    }
}
