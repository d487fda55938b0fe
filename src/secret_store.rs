use crate::error::Result;
use keyring::Entry;

/// Service identifier under which all credentials are stored.
pub const SERVICE_ID: &str = "Spotify-Now-Playing-Widget";

pub const KEY_CLIENT_ID: &str = "client_id";
pub const KEY_CLIENT_SECRET: &str = "client_secret";
pub const KEY_REDIRECT_URI: &str = "redirect_uri";

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// The credential triple needed to construct the Spotify client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Thin adapter over the OS keyring. All three credentials live under a
/// single fixed service identifier.
pub struct SecretStore {
    service: &'static str,
}

impl SecretStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_ID,
        }
    }

    /// Read one named credential, mapping "no such entry" to `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = Entry::new(self.service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        Entry::new(self.service, key)?.set_password(value)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        match Entry::new(self.service, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the full credential triple. Returns `None` unless all three
    /// entries are present.
    pub fn load_credentials(&self) -> Result<Option<StoredCredentials>> {
        let client_id = self.get(KEY_CLIENT_ID)?;
        let client_secret = self.get(KEY_CLIENT_SECRET)?;
        let redirect_uri = self.get(KEY_REDIRECT_URI)?;

        match (client_id, client_secret, redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Ok(Some(StoredCredentials {
                    client_id,
                    client_secret,
                    redirect_uri,
                }))
            }
            _ => {
                log::info!("Credential triple incomplete in secret store");
                Ok(None)
            }
        }
    }

    pub fn save_credentials(&self, creds: &StoredCredentials) -> Result<()> {
        self.set(KEY_CLIENT_ID, &creds.client_id)?;
        self.set(KEY_CLIENT_SECRET, &creds.client_secret)?;
        self.set(KEY_REDIRECT_URI, &creds.redirect_uri)?;
        log::info!("Credentials saved to secret store");
        Ok(())
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}
