//! Cluster-config document rendering.

use jit_core::{AppError, AppResult};
use jit_domain::{Region, SessionName};
use serde::Serialize;
use url::Url;

use crate::access_ports::{ClusterDescription, SessionCredentials};

const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct KubeConfig<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<NamedCluster<'a>>,
    contexts: Vec<NamedContext<'a>>,
    current_context: &'a str,
    users: Vec<NamedUser<'a>>,
}

#[derive(Serialize)]
struct NamedCluster<'a> {
    name: &'a str,
    cluster: ClusterEntry<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry<'a> {
    server: &'a str,
    certificate_authority_data: &'a str,
}

#[derive(Serialize)]
struct NamedContext<'a> {
    name: &'a str,
    context: ContextEntry<'a>,
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    cluster: &'a str,
    user: &'a str,
}

#[derive(Serialize)]
struct NamedUser<'a> {
    name: &'a str,
    user: UserEntry<'a>,
}

#[derive(Serialize)]
struct UserEntry<'a> {
    exec: ExecConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecConfig<'a> {
    api_version: &'static str,
    command: &'static str,
    args: Vec<&'a str>,
    env: Vec<EnvVar<'a>>,
    interactive_mode: &'static str,
}

#[derive(Serialize)]
struct EnvVar<'a> {
    name: &'static str,
    value: &'a str,
}

/// Renders a kubeconfig whose exec plugin derives cluster tokens from the
/// embedded session credentials.
pub fn render_kubeconfig(
    cluster: &ClusterDescription,
    credentials: &SessionCredentials,
    region: &Region,
    session_name: &SessionName,
) -> AppResult<String> {
    let endpoint = Url::parse(cluster.endpoint.as_str()).map_err(|error| {
        AppError::ExternalFailure(format!(
            "cluster '{}' reported an invalid endpoint: {error}",
            cluster.name
        ))
    })?;
    if endpoint.scheme() != "https" {
        return Err(AppError::ExternalFailure(format!(
            "cluster '{}' endpoint must use https",
            cluster.name
        )));
    }

    if cluster.certificate_authority.trim().is_empty() {
        return Err(AppError::ExternalFailure(format!(
            "cluster '{}' reported no certificate authority",
            cluster.name
        )));
    }

    let context_name = format!("{}@{}", session_name.as_str(), cluster.name);
    let document = KubeConfig {
        api_version: "v1",
        kind: "Config",
        clusters: vec![NamedCluster {
            name: cluster.arn.as_str(),
            cluster: ClusterEntry {
                server: cluster.endpoint.as_str(),
                certificate_authority_data: cluster.certificate_authority.trim(),
            },
        }],
        contexts: vec![NamedContext {
            name: context_name.as_str(),
            context: ContextEntry {
                cluster: cluster.arn.as_str(),
                user: session_name.as_str(),
            },
        }],
        current_context: context_name.as_str(),
        users: vec![NamedUser {
            name: session_name.as_str(),
            user: UserEntry {
                exec: ExecConfig {
                    api_version: EXEC_API_VERSION,
                    command: "aws",
                    args: vec![
                        "--region",
                        region.as_str(),
                        "eks",
                        "get-token",
                        "--cluster-name",
                        cluster.name.as_str(),
                        "--output",
                        "json",
                    ],
                    env: vec![
                        EnvVar {
                            name: "AWS_ACCESS_KEY_ID",
                            value: credentials.access_key_id.as_str(),
                        },
                        EnvVar {
                            name: "AWS_SECRET_ACCESS_KEY",
                            value: credentials.secret_access_key.as_str(),
                        },
                        EnvVar {
                            name: "AWS_SESSION_TOKEN",
                            value: credentials.session_token.as_str(),
                        },
                    ],
                    interactive_mode: "Never",
                },
            },
        }],
    };

    serde_yaml::to_string(&document)
        .map_err(|error| AppError::Internal(format!("failed to render kubeconfig: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn description(endpoint: &str) -> ClusterDescription {
        ClusterDescription {
            name: "dev-east-1".to_owned(),
            arn: "arn:aws:eks:us-east-1:123456789012:cluster/dev-east-1".to_owned(),
            endpoint: endpoint.to_owned(),
            certificate_authority: "LS0tLS1CRUdJTg==".to_owned(),
        }
    }

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            access_key_id: "ASIAEXAMPLE".to_owned(),
            secret_access_key: "secret".to_owned(),
            session_token: "token".to_owned(),
            expires_at: Utc
                .with_ymd_and_hms(2025, 1, 1, 1, 0, 0)
                .single()
                .unwrap_or_else(|| unreachable!()),
        }
    }

    fn session_name() -> SessionName {
        SessionName::try_from("jit-U0000000001-dev-east-1-20250101-000000".to_owned())
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn renders_exec_plugin_with_session_credentials() {
        let region = Region::new("us-east-1").unwrap_or_else(|_| unreachable!());
        let rendered = render_kubeconfig(
            &description("https://ABC.gr7.us-east-1.eks.amazonaws.com"),
            &credentials(),
            &region,
            &session_name(),
        )
        .unwrap_or_default();

        let document: serde_yaml::Value =
            serde_yaml::from_str(rendered.as_str()).unwrap_or(serde_yaml::Value::Null);
        assert_eq!(document["kind"].as_str(), Some("Config"));
        assert_eq!(
            document["clusters"][0]["cluster"]["server"].as_str(),
            Some("https://ABC.gr7.us-east-1.eks.amazonaws.com")
        );
        assert_eq!(
            document["users"][0]["user"]["exec"]["env"][2]["value"].as_str(),
            Some("token")
        );
        assert_eq!(
            document["current-context"].as_str(),
            Some("jit-U0000000001-dev-east-1-20250101-000000@dev-east-1")
        );
    }

    #[test]
    fn rejects_plain_http_endpoint() {
        let region = Region::new("us-east-1").unwrap_or_else(|_| unreachable!());
        let result = render_kubeconfig(
            &description("http://cluster.local"),
            &credentials(),
            &region,
            &session_name(),
        );

        assert!(matches!(result, Err(AppError::ExternalFailure(_))));
    }

    #[test]
    fn credentials_are_redacted_from_debug_output() {
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("token\""));
        assert!(debug.contains("ASIAEXAMPLE"));
    }
}
