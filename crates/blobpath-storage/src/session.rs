//! Storage session construction.
//!
//! Credential sources, highest priority first:
//! 1. a pre-built `aws_sdk_s3::Client`
//! 2. an explicit connection string
//! 3. an endpoint URL together with a credential
//! 4. the connection string in `BLOBPATH_CONNECTION_STRING`
//!
//! Connection strings are `;`-separated `Name=Value` pairs, for example
//! `EndpointUrl=https://acct.r2.cloudflarestorage.com;AccessKeyId=...;SecretAccessKey=...`.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::s3::S3Store;

/// Environment variable holding the fallback connection string.
pub const CONNECTION_STRING_ENV: &str = "BLOBPATH_CONNECTION_STRING";

/// Region used when none is configured ("auto" works for R2).
pub const DEFAULT_REGION: &str = "auto";

/// Parsed S3 connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// S3 API endpoint; `None` uses AWS's own endpoints
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Optional session token for temporary credentials
    pub session_token: Option<String>,
    /// Region
    pub region: String,
    /// Address buckets as `endpoint/bucket` rather than `bucket.endpoint`
    pub force_path_style: bool,
}

impl SessionConfig {
    /// Parse a connection string.
    pub fn from_connection_string(s: &str) -> StorageResult<Self> {
        let mut endpoint_url = None;
        let mut access_key_id = None;
        let mut secret_access_key = None;
        let mut session_token = None;
        let mut region = None;
        let mut force_path_style = true;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                StorageError::config(format!("connection string segment without '=': {}", part))
            })?;
            let value = value.trim().to_string();

            match name.trim().to_ascii_lowercase().as_str() {
                "endpointurl" => endpoint_url = Some(value),
                "accesskeyid" => access_key_id = Some(value),
                "secretaccesskey" => secret_access_key = Some(value),
                "sessiontoken" => session_token = Some(value),
                "region" => region = Some(value),
                "forcepathstyle" => {
                    force_path_style = value.parse().map_err(|_| {
                        StorageError::config(format!("ForcePathStyle must be true or false, got {}", value))
                    })?
                }
                other => {
                    return Err(StorageError::config(format!(
                        "unknown connection string field: {}",
                        other
                    )))
                }
            }
        }

        Ok(Self {
            endpoint_url,
            access_key_id: access_key_id
                .ok_or_else(|| StorageError::config("connection string lacks AccessKeyId"))?,
            secret_access_key: secret_access_key
                .ok_or_else(|| StorageError::config("connection string lacks SecretAccessKey"))?,
            session_token,
            region: region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            force_path_style,
        })
    }

    /// Create config from the `BLOBPATH_CONNECTION_STRING` environment variable.
    ///
    /// Returns `Ok(None)` when the variable is not set.
    pub fn from_env() -> StorageResult<Option<Self>> {
        match std::env::var(CONNECTION_STRING_ENV) {
            Ok(s) => Self::from_connection_string(&s).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn credentials(&self) -> Credentials {
        Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            self.session_token.clone(),
            None,
            "blobpath",
        )
    }

    /// Build an S3 client without touching the network.
    pub fn build_client(&self) -> Client {
        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(self.credentials())
            .force_path_style(self.force_path_style);

        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Client::from_conf(builder.build())
    }

    /// Build the store for this configuration.
    pub fn build_store(&self) -> S3Store {
        S3Store::new(self.build_client(), self.endpoint_url.clone(), self.region.clone())
    }
}

/// Collects the possible credential sources and resolves them by priority.
#[derive(Default)]
pub struct SessionBuilder {
    client: Option<Client>,
    connection_string: Option<String>,
    endpoint_url: Option<String>,
    credential: Option<Credentials>,
    region: Option<String>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already authenticated client as is.
    ///
    /// Combine with [`SessionBuilder::endpoint_url`] to get endpoint-based public URLs.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn connection_string(mut self, s: impl Into<String>) -> Self {
        self.connection_string = Some(s.into());
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn credential(mut self, credential: Credentials) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Region used with endpoint URL + credential.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Resolve the credential sources into a store.
    pub fn build(self) -> StorageResult<S3Store> {
        if let Some(client) = self.client {
            debug!("Using pre-built S3 client");
            return Ok(S3Store::from_client(client, self.endpoint_url));
        }

        if let Some(s) = &self.connection_string {
            debug!("Using explicit connection string");
            let config = SessionConfig::from_connection_string(s)?;
            return Ok(config.build_store());
        }

        if let (Some(endpoint), Some(credential)) = (&self.endpoint_url, &self.credential) {
            debug!(endpoint = %endpoint, "Using endpoint URL with credential");
            let sdk_config = Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .endpoint_url(endpoint)
                .region(Region::new(
                    self.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string()),
                ))
                .credentials_provider(credential.clone())
                .force_path_style(true)
                .build();
            return Ok(S3Store::new(
                Client::from_conf(sdk_config),
                Some(endpoint.clone()),
                self.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            ));
        }

        if let Some(config) = SessionConfig::from_env()? {
            debug!("Using connection string from {}", CONNECTION_STRING_ENV);
            return Ok(config.build_store());
        }

        Err(StorageError::missing_credentials(
            "anonymous sessions are not supported; pass a client, a connection string, \
             an endpoint URL with a credential, or set BLOBPATH_CONNECTION_STRING",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStore;
    use serial_test::serial;

    const CONN: &str = "EndpointUrl=https://acct.r2.example.com;AccessKeyId=AKID;SecretAccessKey=SECRET";

    #[test]
    fn test_parse_connection_string() {
        let config = SessionConfig::from_connection_string(CONN).unwrap();
        assert_eq!(config.endpoint_url.as_deref(), Some("https://acct.r2.example.com"));
        assert_eq!(config.access_key_id, "AKID");
        assert_eq!(config.secret_access_key, "SECRET");
        assert_eq!(config.region, "auto");
        assert!(config.force_path_style);
    }

    #[test]
    fn test_parse_connection_string_case_insensitive_names() {
        let config = SessionConfig::from_connection_string(
            "accesskeyid=a; SECRETACCESSKEY=b; Region=eu-west-1; ForcePathStyle=false;",
        )
        .unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert!(!config.force_path_style);
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn test_parse_connection_string_errors() {
        assert!(matches!(
            SessionConfig::from_connection_string("AccessKeyId=a"),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_connection_string("AccessKeyId=a;SecretAccessKey=b;Bogus=1"),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_connection_string("garbage"),
            Err(StorageError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_no_source_is_missing_credentials() {
        std::env::remove_var(CONNECTION_STRING_ENV);
        let result = SessionBuilder::new().build();
        assert!(matches!(result, Err(StorageError::MissingCredentials(_))));
    }

    #[test]
    #[serial]
    fn test_endpoint_without_credential_is_not_enough() {
        std::env::remove_var(CONNECTION_STRING_ENV);
        let result = SessionBuilder::new()
            .endpoint_url("https://acct.r2.example.com")
            .build();
        assert!(matches!(result, Err(StorageError::MissingCredentials(_))));
    }

    #[test]
    #[serial]
    fn test_env_connection_string_is_last_resort() {
        std::env::set_var(
            CONNECTION_STRING_ENV,
            "EndpointUrl=https://env.example.com;AccessKeyId=e;SecretAccessKey=e",
        );

        let from_env = SessionBuilder::new().build().unwrap();
        assert_eq!(
            from_env.public_url("c1", "k"),
            "https://env.example.com/c1/k"
        );

        let explicit = SessionBuilder::new()
            .endpoint_url("https://explicit.example.com")
            .credential(Credentials::new("a", "b", None, None, "test"))
            .build()
            .unwrap();
        assert_eq!(
            explicit.public_url("c1", "k"),
            "https://explicit.example.com/c1/k"
        );

        std::env::remove_var(CONNECTION_STRING_ENV);
    }

    #[test]
    #[serial]
    fn test_connection_string_beats_endpoint_and_credential() {
        std::env::remove_var(CONNECTION_STRING_ENV);
        let store = SessionBuilder::new()
            .endpoint_url("https://explicit.example.com")
            .credential(Credentials::new("a", "b", None, None, "test"))
            .connection_string(CONN)
            .build()
            .unwrap();
        assert_eq!(store.public_url("c1", "k"), "https://acct.r2.example.com/c1/k");
    }

    #[test]
    #[serial]
    fn test_prebuilt_client_wins() {
        std::env::remove_var(CONNECTION_STRING_ENV);
        let client = SessionConfig::from_connection_string(
            "EndpointUrl=https://prebuilt.example.com;AccessKeyId=p;SecretAccessKey=p",
        )
        .unwrap()
        .build_client();

        let store = SessionBuilder::new()
            .connection_string(CONN)
            .client(client)
            .endpoint_url("https://prebuilt.example.com")
            .build()
            .unwrap();
        assert_eq!(store.public_url("c1", "k"), "https://prebuilt.example.com/c1/k");
    }
}
