//! Chat command surface: signature checks, parsing and rendering.

mod command;
mod signature;

use jit_application::AccessListFilter;
use jit_core::{AppResult, CallerIdentity};
use jit_domain::{AccessRequest, ApprovalOutcome, RequestPhase, UserId};
use tracing::info;

use crate::state::AppState;

pub use command::{AdminCommand, ChatCommand, USAGE};
pub use signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER, verify_signature};

#[cfg(test)]
pub(crate) use signature::sign;

/// Runs `text` for `caller` and renders the ephemeral reply.
pub async fn respond(state: &AppState, caller: &CallerIdentity, text: &str) -> String {
    let outcome = match text.parse::<ChatCommand>() {
        Ok(command) => {
            info!(caller = %caller.subject(), command = command_name(&command), "chat command");
            execute(state, caller, command).await
        }
        Err(error) => Err(error),
    };

    outcome.unwrap_or_else(|error| format!(":warning: {error}"))
}

async fn execute(
    state: &AppState,
    caller: &CallerIdentity,
    command: ChatCommand,
) -> AppResult<String> {
    match command {
        ChatCommand::Help => Ok(USAGE.to_owned()),
        ChatCommand::Request(input) => {
            let request = state.access_request_service.create(caller, input).await?;
            Ok(format!(
                ":inbox_tray: Request `{}` filed for *{}* ({}, {}). Status: {}.",
                request.id(),
                request.target().name,
                request.duration(),
                permissions(&request),
                request.phase().as_str()
            ))
        }
        ChatCommand::List => {
            let clusters = state.cluster_service.list_enabled(caller).await?;
            if clusters.is_empty() {
                return Ok("No clusters are accepting requests.".to_owned());
            }
            let lines = clusters
                .iter()
                .map(|cluster| {
                    format!(
                        "• `{}` {} ({}, {}) max {}",
                        cluster.name(),
                        cluster.display_name(),
                        cluster.environment().as_str(),
                        cluster.region().as_str(),
                        cluster.max_duration()
                    )
                })
                .collect::<Vec<_>>();
            Ok(format!("Clusters accepting requests:\n{}", lines.join("\n")))
        }
        ChatCommand::Status => {
            let requests = state
                .access_request_service
                .list(
                    caller,
                    AccessListFilter {
                        user_id: Some(caller.subject().to_owned()),
                        ..AccessListFilter::default()
                    },
                )
                .await?;
            if requests.is_empty() {
                return Ok("You have no access requests.".to_owned());
            }
            let lines = requests.iter().map(status_line).collect::<Vec<_>>();
            Ok(lines.join("\n"))
        }
        ChatCommand::Approve { id, comment } => {
            let (request, outcome) = state
                .access_request_service
                .approve(caller, &id, comment)
                .await?;
            Ok(match outcome {
                ApprovalOutcome::Recorded => format!(
                    ":white_check_mark: Approval recorded on `{}` ({} so far).",
                    request.id(),
                    request.approvals().len()
                ),
                ApprovalOutcome::Duplicate => {
                    format!("You already approved `{}`.", request.id())
                }
            })
        }
        ChatCommand::Admin(admin) => execute_admin(state, caller, admin).await,
    }
}

async fn execute_admin(
    state: &AppState,
    caller: &CallerIdentity,
    command: AdminCommand,
) -> AppResult<String> {
    match command {
        AdminCommand::Deny { id, reason } => {
            let request = state.access_request_service.deny(caller, &id, reason).await?;
            Ok(format!(":x: Request `{}` denied.", request.id()))
        }
        AdminCommand::Revoke { id } => {
            let request = state.access_request_service.revoke(caller, &id).await?;
            Ok(format!(
                ":no_entry: Request `{}` is {}.",
                request.id(),
                request.phase().as_str()
            ))
        }
        AdminCommand::Cleanup { cluster } => {
            let report = state
                .access_request_service
                .run_cleanup(caller, &cluster)
                .await?;
            Ok(format!(
                ":broom: Swept `{cluster}`: {} scanned, {} orphans removed, {} expired.",
                report.scanned, report.orphans_removed, report.expired
            ))
        }
        AdminCommand::Role { user_id, role } => {
            let user_id = UserId::new(user_id)?;
            state
                .authorization_service
                .assign_role(caller, &user_id, role)
                .await?;
            Ok(format!("`{user_id}` is now {role}."))
        }
    }
}

fn status_line(request: &AccessRequest) -> String {
    let mut line = format!(
        "{} `{}` *{}* {} ({}, {})",
        glyph(request.phase()),
        request.id(),
        request.target().name,
        request.phase().as_str(),
        request.duration(),
        permissions(request)
    );
    if let Some(entry) = request.access_entry()
        && request.phase() == RequestPhase::Active
    {
        line.push_str(&format!(" until {}", entry.expires_at.format("%Y-%m-%d %H:%M UTC")));
    }
    line
}

fn glyph(phase: RequestPhase) -> &'static str {
    match phase {
        RequestPhase::Pending => ":hourglass_flowing_sand:",
        RequestPhase::Approved => ":white_check_mark:",
        RequestPhase::Active => ":large_green_circle:",
        RequestPhase::Denied => ":x:",
        RequestPhase::Expired => ":alarm_clock:",
        RequestPhase::Revoked => ":no_entry:",
    }
}

fn permissions(request: &AccessRequest) -> String {
    request
        .permissions()
        .iter()
        .map(|permission| permission.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn command_name(command: &ChatCommand) -> &'static str {
    match command {
        ChatCommand::Request(_) => "request",
        ChatCommand::List => "list",
        ChatCommand::Status => "status",
        ChatCommand::Approve { .. } => "approve",
        ChatCommand::Admin(_) => "admin",
        ChatCommand::Help => "help",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ADMIN, APPROVER, REQUESTER, test_state};

    fn caller(subject: &str) -> CallerIdentity {
        CallerIdentity::new(subject, subject, None)
    }

    fn filed_id(reply: &str) -> String {
        reply
            .split('`')
            .nth(1)
            .map(str::to_owned)
            .unwrap_or_else(|| panic!("no request id in reply: {reply}"))
    }

    #[tokio::test]
    async fn list_shows_only_enabled_clusters() {
        let state = test_state().await;

        let reply = respond(&state, &caller(REQUESTER), "list").await;
        assert!(reply.contains("dev-east-1"));
        assert!(!reply.contains("prod-east-1"));
    }

    #[tokio::test]
    async fn request_then_status_renders_glyph() {
        let state = test_state().await;

        let filed = respond(
            &state,
            &caller(REQUESTER),
            "request dev-east-1 debugging ticket 4217 --duration=2h",
        )
        .await;
        assert!(filed.starts_with(":inbox_tray:"), "{filed}");
        let id = filed_id(&filed);

        let status = respond(&state, &caller(REQUESTER), "status").await;
        assert!(status.contains(&id));
        assert!(status.starts_with(":hourglass_flowing_sand:"));
        assert!(status.contains("(2h, view)"));
    }

    #[tokio::test]
    async fn approve_and_admin_shortcuts_enforce_roles() {
        let state = test_state().await;
        let filed = respond(
            &state,
            &caller(REQUESTER),
            "request dev-east-1 debugging ticket 4217 --permissions=edit",
        )
        .await;
        let id = filed_id(&filed);

        let denied = respond(&state, &caller(REQUESTER), &format!("approve {id}")).await;
        assert!(denied.starts_with(":warning: forbidden"), "{denied}");

        let approved = respond(&state, &caller(APPROVER), &format!("approve {id} ok")).await;
        assert!(approved.starts_with(":white_check_mark:"), "{approved}");
        let again = respond(&state, &caller(APPROVER), &format!("approve {id}")).await;
        assert!(again.starts_with("You already approved"));

        let role = respond(&state, &caller(APPROVER), "admin role U0000000004 approver").await;
        assert!(role.starts_with(":warning:"));
        let role = respond(&state, &caller(ADMIN), "admin role U0000000004 approver").await;
        assert_eq!(role, "`U0000000004` is now approver.");
    }

    #[tokio::test]
    async fn unknown_input_gets_usage_hint() {
        let state = test_state().await;

        let reply = respond(&state, &caller(REQUESTER), "reboot prod").await;
        assert!(reply.starts_with(":warning: validation error"));
        assert_eq!(respond(&state, &caller(REQUESTER), "").await, USAGE);
    }
}
