use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sts::Client;
use aws_sdk_sts::types::Tag;
use chrono::{DateTime, Utc};
use jit_application::{MintSessionInput, SessionCredentials, SessionMinter};
use jit_core::{AppError, AppResult};
use tracing::info;

use crate::aws_errors::map_sdk_error;

/// STS-backed session minter assuming the durable access role.
#[derive(Clone)]
pub struct AwsSessionMinter {
    client: Client,
}

impl AwsSessionMinter {
    /// Creates a minter from shared AWS configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn session_tags(tags: &[(String, String)]) -> AppResult<Vec<Tag>> {
    tags.iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|error| {
                    AppError::Internal(format!("invalid session tag '{key}': {error}"))
                })
        })
        .collect()
}

#[async_trait]
impl SessionMinter for AwsSessionMinter {
    async fn mint(&self, input: MintSessionInput) -> AppResult<SessionCredentials> {
        let duration_seconds = i32::try_from(input.ttl.as_seconds()).map_err(|_| {
            AppError::Validation(format!("session ttl {} is out of range", input.ttl))
        })?;

        let output = self
            .client
            .assume_role()
            .role_arn(input.role_identity.as_str())
            .role_session_name(input.session_name.as_str())
            .duration_seconds(duration_seconds)
            .policy(input.inline_policy.as_str())
            .set_tags(Some(session_tags(&input.tags)?))
            .send()
            .await
            .map_err(|error| map_sdk_error("assume access role", error))?;

        let credentials = output.credentials().ok_or_else(|| {
            AppError::ExternalFailure("assume role returned no credentials".to_owned())
        })?;
        let expiration = credentials.expiration();
        let expires_at: DateTime<Utc> =
            DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()).ok_or_else(
                || AppError::ExternalFailure("assume role returned an invalid expiry".to_owned()),
            )?;

        info!(
            session_name = %input.session_name.as_str(),
            expires_at = %expires_at,
            "session minted"
        );
        Ok(SessionCredentials {
            access_key_id: credentials.access_key_id().to_owned(),
            secret_access_key: credentials.secret_access_key().to_owned(),
            session_token: credentials.session_token().to_owned(),
            expires_at,
        })
    }
}
