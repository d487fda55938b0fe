use crate::error::PlaybackError;
use crate::secret_store::StoredCredentials;
use rspotify::{
    clients::{BaseClient, OAuthClient},
    http::HttpError,
    model::{CurrentlyPlayingContext, PlayableItem},
    scopes, AuthCodeSpotify, ClientError, Config, Credentials, OAuth,
};
use std::future::Future;
use std::time::Duration;

/// Overall bound on a single playback query, connection included.
pub const API_TIMEOUT: Duration = Duration::from_secs(8);

/// What the remote API reported as currently playing. `item` is `None`
/// during ad breaks, where Spotify reports playback without a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub progress_ms: u64,
    pub item: Option<PlayingItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayingItem {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    /// Album art URLs in the order the API supplied them (largest first).
    pub image_urls: Vec<String>,
    pub duration_ms: u64,
}

/// Anything the poll engine can ask for current playback. Lets the engine
/// run against a fake source in tests.
pub trait PlaybackSource: Send + Sync + 'static {
    /// One-time setup before the first poll. The default does nothing.
    fn prepare(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn current_playback(
        &self,
    ) -> impl Future<Output = Result<Option<PlaybackSnapshot>, PlaybackError>> + Send;
}

/// Authenticated Spotify Web API client built from stored credentials.
pub struct SpotifyClient {
    client: AuthCodeSpotify,
}

impl SpotifyClient {
    pub fn new(creds: &StoredCredentials) -> Self {
        let credentials = Credentials::new(&creds.client_id, &creds.client_secret);

        let oauth = OAuth {
            redirect_uri: creds.redirect_uri.clone(),
            scopes: scopes!("user-read-currently-playing", "user-read-playback-state"),
            ..Default::default()
        };

        let config = Config {
            token_cached: true,
            token_refreshing: true,
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::with_config(credentials, oauth, config),
        }
    }

    /// Load the cached token and refresh it when it is past expiry. A missing
    /// or unusable token is not fatal here: the poll loop surfaces it as an
    /// authorization error and keeps running at the reduced cadence.
    pub async fn connect(&self) {
        match self.client.read_token_cache(true).await {
            Ok(Some(token)) => {
                // Consider the token usable only if it expires more than 60
                // seconds from now.
                let expires_soon = token
                    .expires_at
                    .map(|at| at <= chrono::Utc::now() + chrono::Duration::seconds(60))
                    .unwrap_or(true);
                *self.client.token.lock().await.unwrap() = Some(token);

                if expires_soon {
                    log::info!("Cached token expired or about to expire, attempting refresh");
                    if let Err(e) = self.client.refresh_token().await {
                        log::warn!("Token refresh failed: {}", e);
                    }
                }
            }
            Ok(None) => {
                log::warn!("No cached Spotify token found");
                self.log_authorize_url();
            }
            Err(e) => {
                log::warn!("Failed to read token cache: {}", e);
                self.log_authorize_url();
            }
        }
    }

    fn log_authorize_url(&self) {
        match self.client.get_authorize_url(false) {
            Ok(url) => log::warn!("Authorize this app by visiting: {}", url),
            Err(e) => log::warn!("Could not build authorization URL: {}", e),
        }
    }

    async fn has_token(&self) -> bool {
        self.client.token.lock().await.unwrap().is_some()
    }
}

impl PlaybackSource for SpotifyClient {
    fn prepare(&self) -> impl Future<Output = ()> + Send {
        self.connect()
    }

    fn current_playback(
        &self,
    ) -> impl Future<Output = Result<Option<PlaybackSnapshot>, PlaybackError>> + Send {
        async move {
            if !self.has_token().await {
                return Err(PlaybackError::Auth(
                    "no access token available".to_string(),
                ));
            }

            let query = self.client.current_playing(None, None::<Vec<_>>);
            let playing = match tokio::time::timeout(API_TIMEOUT, query).await {
                Err(_) => return Err(PlaybackError::Timeout),
                Ok(Err(e)) => return Err(classify_error(e)),
                Ok(Ok(playing)) => playing,
            };

            Ok(playing.map(snapshot_from_context))
        }
    }
}

fn snapshot_from_context(ctx: CurrentlyPlayingContext) -> PlaybackSnapshot {
    let progress_ms = ctx
        .progress
        .map(|p| p.num_milliseconds().max(0) as u64)
        .unwrap_or(0);

    PlaybackSnapshot {
        is_playing: ctx.is_playing,
        progress_ms,
        item: ctx.item.map(playing_item),
    }
}

fn playing_item(item: PlayableItem) -> PlayingItem {
    match item {
        PlayableItem::Track(track) => PlayingItem {
            id: track
                .id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            name: track.name,
            artists: track.artists.iter().map(|a| a.name.clone()).collect(),
            image_urls: track.album.images.iter().map(|i| i.url.clone()).collect(),
            duration_ms: track.duration.num_milliseconds().max(0) as u64,
        },
        PlayableItem::Episode(episode) => PlayingItem {
            id: episode.id.to_string(),
            name: episode.name,
            artists: vec![episode.show.publisher.clone()],
            image_urls: episode.images.iter().map(|i| i.url.clone()).collect(),
            duration_ms: episode.duration.num_milliseconds().max(0) as u64,
        },
    }
}

/// Map rspotify failures onto the engine's error taxonomy. Only 401/403
/// responses count as authorization failures; everything else is either a
/// timeout or a generic API error.
fn classify_error(err: ClientError) -> PlaybackError {
    match err {
        ClientError::Http(http) => match *http {
            HttpError::StatusCode(response) => {
                let status = response.status();
                match status.as_u16() {
                    401 | 403 => PlaybackError::Auth(format!("API returned {}", status)),
                    _ => PlaybackError::Api(format!("API returned {}", status)),
                }
            }
            HttpError::Client(e) if e.is_timeout() => PlaybackError::Timeout,
            HttpError::Client(e) => PlaybackError::Api(e.to_string()),
        },
        other => PlaybackError::Api(other.to_string()),
    }
}
