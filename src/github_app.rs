//! GitHub App authentication: sign a short-lived JWT with the app's private
//! key, then exchange it for a per-installation access token scoped to one
//! repository. Selected over PAT mode when `GITHUB_APP_ID` is set.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::{TreliqError, TreliqResult};

#[derive(Debug, Serialize)]
struct Claims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Clone)]
pub struct GitHubAppAuth {
    app_id: u64,
    private_key_pem: Arc<String>,
    http: Client,
    cached_installation_id: Arc<RwLock<Option<(String, u64)>>>,
}

impl std::fmt::Debug for GitHubAppAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppAuth").field("app_id", &self.app_id).finish()
    }
}

#[derive(Deserialize)]
struct InstallationAccessToken {
    token: String,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
    account: InstallationAccount,
}

#[derive(Deserialize)]
struct InstallationAccount {
    login: String,
}

impl GitHubAppAuth {
    pub fn new(app_id: u64, private_key_pem: String) -> Self {
        GitHubAppAuth {
            app_id,
            private_key_pem: Arc::new(private_key_pem),
            http: Client::new(),
            cached_installation_id: Arc::new(RwLock::new(None)),
        }
    }

    /// RS256 app JWT, valid for 9 minutes (GitHub's cap is 10).
    fn mint_jwt(&self) -> TreliqResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TreliqError::Internal(e.to_string()))?
            .as_secs();
        let claims = Claims {
            iat: now - 60,
            exp: now + 9 * 60,
            iss: self.app_id.to_string(),
        };
        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .map_err(|e| TreliqError::Config(format!("invalid GITHUB_PRIVATE_KEY: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| TreliqError::Internal(format!("failed to sign app JWT: {e}")))
    }

    /// Finds (and caches) the installation id that owns `repo`'s owner
    /// account, then exchanges it for a short-lived installation token.
    pub async fn installation_token_for_repo(&self, repo: &str) -> TreliqResult<String> {
        let owner = repo.split('/').next().unwrap_or(repo).to_lowercase();
        let installation_id = {
            let cached = self.cached_installation_id.read().await;
            match &*cached {
                Some((cached_owner, id)) if *cached_owner == owner => Some(*id),
                _ => None,
            }
        };
        let installation_id = match installation_id {
            Some(id) => id,
            None => {
                let id = self.find_installation_id(&owner).await?;
                *self.cached_installation_id.write().await = Some((owner, id));
                id
            }
        };

        let jwt = self.mint_jwt()?;
        let resp = self
            .http
            .post(format!("https://api.github.com/app/installations/{installation_id}/access_tokens"))
            .header("Authorization", format!("Bearer {jwt}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "treliq/0.1")
            .send()
            .await
            .map_err(|e| TreliqError::Internal(format!("installation token exchange failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(TreliqError::Config(format!(
                "installation token exchange returned {}",
                resp.status()
            )));
        }
        let parsed: InstallationAccessToken = resp
            .json()
            .await
            .map_err(|e| TreliqError::Internal(format!("malformed installation token response: {e}")))?;
        Ok(parsed.token)
    }

    async fn find_installation_id(&self, owner: &str) -> TreliqResult<u64> {
        let jwt = self.mint_jwt()?;
        let resp = self
            .http
            .get("https://api.github.com/app/installations?per_page=100")
            .header("Authorization", format!("Bearer {jwt}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "treliq/0.1")
            .send()
            .await
            .map_err(|e| TreliqError::Internal(format!("listing installations failed: {e}")))?;
        let installations: Vec<Installation> = resp
            .json()
            .await
            .map_err(|e| TreliqError::Internal(format!("malformed installations response: {e}")))?;
        installations
            .into_iter()
            .find(|i| i.account.login.to_lowercase() == owner)
            .map(|i| i.id)
            .ok_or_else(|| TreliqError::Config(format!("no installation found for account '{owner}'")))
    }
}
