//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Keys are indexed by `kid` and carry the algorithm they are pinned to. A
//! lookup for an unknown `kid` returns nothing; there is no default key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{OAuthError, Result, TransportError};
use crate::oauth::read_json;

/// JWKS document as served by the authorization server.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<JwksKey>,
}

/// Individual JSON Web Key, public parameters only.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksKey {
    /// Key type (`RSA`, `EC`, `OKP`, ...)
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub use_: Option<String>,
    /// RSA modulus
    pub n: Option<String>,
    /// RSA public exponent
    pub e: Option<String>,
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

/// A verification key pinned to the algorithm its JWK declares.
#[derive(Clone)]
pub struct KeyRecord {
    pub kid: String,
    pub algorithm: Algorithm,
    pub(crate) key: DecodingKey,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Usable signing keys indexed by key id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, KeyRecord>,
}

impl KeySet {
    /// Build a key set from a JWKS document, skipping unusable entries.
    pub fn from_document(document: &JwksDocument) -> Self {
        let mut keys = HashMap::new();
        for jwk in &document.keys {
            match key_record(jwk) {
                Ok(record) => {
                    if keys.contains_key(&record.kid) {
                        tracing::warn!(kid = %record.kid, "Duplicate key id in JWKS, keeping first");
                        continue;
                    }
                    keys.insert(record.kid.clone(), record);
                }
                Err(reason) => {
                    tracing::warn!(kid = ?jwk.kid, kty = %jwk.kty, %reason, "Skipping JWKS entry");
                }
            }
        }
        Self { keys }
    }

    /// Parse a key set from raw JWKS JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: JwksDocument = serde_json::from_str(json).map_err(|e| {
            OAuthError::KeySourceUnavailable(TransportError::Decode(e.to_string()))
        })?;
        Ok(Self::from_document(&document))
    }

    /// Look up a key by id.
    pub fn resolve(&self, kid: &str) -> Option<&KeyRecord> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All usable keys, sorted by id.
    pub fn keys(&self) -> Vec<&KeyRecord> {
        let mut keys: Vec<_> = self.keys.values().collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        keys
    }
}

/// Turn one JWK into a pinned verification key.
fn key_record(jwk: &JwksKey) -> std::result::Result<KeyRecord, String> {
    let kid = jwk.kid.clone().ok_or("missing kid")?;
    let alg = jwk.alg.as_deref().ok_or("missing alg")?;
    if let Some(use_) = jwk.use_.as_deref()
        && use_ != "sig"
    {
        return Err(format!("key use '{}' is not 'sig'", use_));
    }

    let algorithm = parse_algorithm(alg).ok_or_else(|| format!("unsupported alg '{}'", alg))?;
    let key = match (jwk.kty.as_str(), algorithm) {
        (
            "RSA",
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => {
            let n = jwk.n.as_deref().ok_or("RSA key without n")?;
            let e = jwk.e.as_deref().ok_or("RSA key without e")?;
            DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?
        }
        ("EC", Algorithm::ES256 | Algorithm::ES384) => {
            let expected_crv = if algorithm == Algorithm::ES256 {
                "P-256"
            } else {
                "P-384"
            };
            if jwk.crv.as_deref() != Some(expected_crv) {
                return Err(format!("{:?} requires crv {}", algorithm, expected_crv));
            }
            let x = jwk.x.as_deref().ok_or("EC key without x")?;
            let y = jwk.y.as_deref().ok_or("EC key without y")?;
            DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?
        }
        ("OKP", Algorithm::EdDSA) => {
            if jwk.crv.as_deref() != Some("Ed25519") {
                return Err("EdDSA requires crv Ed25519".to_string());
            }
            let x = jwk.x.as_deref().ok_or("OKP key without x")?;
            DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?
        }
        (kty, algorithm) => {
            return Err(format!("kty '{}' cannot be used with {:?}", kty, algorithm));
        }
    };

    Ok(KeyRecord {
        kid,
        algorithm,
        key,
    })
}

/// Asymmetric JWS algorithms. Symmetric `HS*` never appear in a public key set.
fn parse_algorithm(alg: &str) -> Option<Algorithm> {
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "PS256" => Some(Algorithm::PS256),
        "PS384" => Some(Algorithm::PS384),
        "PS512" => Some(Algorithm::PS512),
        "ES256" => Some(Algorithm::ES256),
        "ES384" => Some(Algorithm::ES384),
        "EdDSA" => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Holds the last successfully fetched key set.
///
/// The cache fetches only when asked and keeps its contents until
/// [`invalidate`](KeySetCache::invalidate) is called; when to re-fetch after a
/// key-id miss is the caller's decision.
#[derive(Debug)]
pub struct KeySetCache {
    http: reqwest::Client,
    timeout: Duration,
    current: RwLock<Option<Arc<KeySet>>>,
}

impl KeySetCache {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            current: RwLock::new(None),
        }
    }

    /// Seed the cache with an already known key set.
    pub fn with_key_set(http: reqwest::Client, timeout: Duration, key_set: KeySet) -> Self {
        Self {
            http,
            timeout,
            current: RwLock::new(Some(Arc::new(key_set))),
        }
    }

    /// Fetch the key set from `jwks_url` and cache it.
    ///
    /// On failure the previously cached set, if any, is kept.
    pub async fn fetch(&self, jwks_url: &str) -> Result<Arc<KeySet>> {
        tracing::debug!(url = %jwks_url, "Fetching JWKS");
        let document: JwksDocument = self
            .fetch_document(jwks_url)
            .await
            .map_err(OAuthError::KeySourceUnavailable)?;

        let key_set = Arc::new(KeySet::from_document(&document));
        tracing::info!(
            url = %jwks_url,
            keys = key_set.len(),
            "JWKS fetched"
        );
        *self.current.write() = Some(key_set.clone());
        Ok(key_set)
    }

    async fn fetch_document(
        &self,
        jwks_url: &str,
    ) -> std::result::Result<JwksDocument, TransportError> {
        let response = self
            .http
            .get(jwks_url)
            .timeout(self.timeout)
            .send()
            .await?;
        read_json(response).await
    }

    /// Look up a key in the last fetched set.
    pub fn resolve(&self, kid: &str) -> Option<KeyRecord> {
        self.current
            .read()
            .as_ref()
            .and_then(|set| set.resolve(kid).cloned())
    }

    /// The last fetched set, if any.
    pub fn key_set(&self) -> Option<Arc<KeySet>> {
        self.current.read().clone()
    }

    /// Drop the cached set so the next use has to fetch again.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }
}
