//! Shared state for handler tests.

use std::sync::Arc;

use jit_application::NoopReconcileTrigger;
use jit_infrastructure::{AccessStack, JitConfig};

use crate::state::AppState;

pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const REQUESTER: &str = "U0000000001";
pub const APPROVER: &str = "U0000000002";
pub const ADMIN: &str = "U0000000003";

const CONFIG: &str = r#"
slack:
  signingSecret: test-signing-secret
aws:
  provider: simulated
auth:
  adminUsers: [U0000000003]
  approvers: [U0000000002]
clusters:
  - name: dev-east-1
    account: "123456789012"
    region: us-east-1
    environment: development
  - name: prod-east-1
    account: "123456789012"
    region: us-east-1
    environment: production
    enabled: false
"#;

pub async fn test_state() -> AppState {
    let config =
        JitConfig::from_sources(Some(CONFIG), Vec::new()).unwrap_or_else(|_| unreachable!());
    let stack = AccessStack::build(&config)
        .await
        .unwrap_or_else(|_| unreachable!());

    AppState::build(&stack, Arc::new(NoopReconcileTrigger), SIGNING_SECRET)
        .unwrap_or_else(|_| unreachable!())
}
