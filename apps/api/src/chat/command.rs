use std::str::FromStr;

use jit_application::CreateAccessRequestInput;
use jit_core::{AppError, AppResult};
use jit_domain::OperatorRole;

/// Usage text returned by `help` and on malformed input.
pub const USAGE: &str = "\
Usage:
  request <cluster> <reason...> [--duration=1h] [--permissions=view,logs] [--namespaces=a,b] [--approvers=U...,team]
  list                              clusters accepting requests
  status                            your requests
  approve <request-id> [comment]
  admin deny <request-id> [reason]
  admin revoke <request-id>
  admin cleanup <cluster>
  admin role <user-id> <requester|approver|admin>
  help";

/// Sub-command of the chat entry command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// File an access request.
    Request(CreateAccessRequestInput),
    /// Enumerate enabled clusters.
    List,
    /// Enumerate the caller's requests.
    Status,
    /// Approve a request.
    Approve {
        /// Request id.
        id: String,
        /// Optional comment.
        comment: Option<String>,
    },
    /// Operator shortcuts.
    Admin(AdminCommand),
    /// Print usage.
    Help,
}

/// `admin` shortcuts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Deny a pending request.
    Deny { id: String, reason: Option<String> },
    /// Revoke live access.
    Revoke { id: String },
    /// Sweep one cluster.
    Cleanup { cluster: String },
    /// Assign an operator role.
    Role { user_id: String, role: OperatorRole },
}

impl FromStr for ChatCommand {
    type Err = AppError;

    fn from_str(text: &str) -> AppResult<Self> {
        let mut words = text.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Self::Help);
        };
        let rest = words.collect::<Vec<_>>();

        match verb.to_lowercase().as_str() {
            "request" => parse_request(&rest).map(Self::Request),
            "list" => Ok(Self::List),
            "status" => Ok(Self::Status),
            "approve" => match rest.split_first() {
                Some((id, comment)) => Ok(Self::Approve {
                    id: (*id).to_owned(),
                    comment: joined(comment),
                }),
                None => Err(usage("approve <request-id> [comment]")),
            },
            "admin" => parse_admin(&rest).map(Self::Admin),
            "help" => Ok(Self::Help),
            other => Err(AppError::Validation(format!(
                "unknown sub-command '{other}'; try `help`"
            ))),
        }
    }
}

fn parse_request(words: &[&str]) -> AppResult<CreateAccessRequestInput> {
    let mut input = CreateAccessRequestInput::default();
    let mut positional = Vec::new();

    for word in words {
        let Some(flag) = word.strip_prefix("--") else {
            positional.push(*word);
            continue;
        };
        let (name, value) = flag
            .split_once('=')
            .ok_or_else(|| AppError::Validation(format!("flag '--{flag}' needs a value")))?;
        match name {
            "duration" => input.duration = Some(value.to_owned()),
            "permissions" => input.permissions = Some(list(value)),
            "namespaces" => input.namespaces = list(value),
            "approvers" => input.approvers = Some(list(value)),
            other => {
                return Err(AppError::Validation(format!("unknown flag '--{other}'")));
            }
        }
    }

    let Some((cluster, reason)) = positional.split_first() else {
        return Err(usage("request <cluster> <reason...>"));
    };
    input.cluster = (*cluster).to_owned();
    input.reason = joined(reason).ok_or_else(|| usage("request <cluster> <reason...>"))?;
    Ok(input)
}

fn parse_admin(words: &[&str]) -> AppResult<AdminCommand> {
    match words {
        ["deny", id, reason @ ..] => Ok(AdminCommand::Deny {
            id: (*id).to_owned(),
            reason: joined(reason),
        }),
        ["revoke", id] => Ok(AdminCommand::Revoke {
            id: (*id).to_owned(),
        }),
        ["cleanup", cluster] => Ok(AdminCommand::Cleanup {
            cluster: (*cluster).to_owned(),
        }),
        ["role", user_id, role] => Ok(AdminCommand::Role {
            user_id: (*user_id).to_owned(),
            role: OperatorRole::from_str(role)?,
        }),
        _ => Err(usage("admin <deny|revoke|cleanup|role> ...")),
    }
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn joined(words: &[&str]) -> Option<String> {
    (!words.is_empty()).then(|| words.join(" "))
}

fn usage(form: &str) -> AppError {
    AppError::Validation(format!("usage: {form}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> AppResult<ChatCommand> {
        text.parse()
    }

    #[test]
    fn empty_text_is_help() {
        assert_eq!(parse("   ").ok(), Some(ChatCommand::Help));
        assert_eq!(parse("help").ok(), Some(ChatCommand::Help));
    }

    #[test]
    fn request_collects_reason_and_flags_anywhere() {
        let command = parse(
            "request prod-east-1 --duration=2h investigating --permissions=view,logs incident 42 \
             --namespaces=payments, --approvers=U0000000002,sre",
        );

        let Ok(ChatCommand::Request(input)) = command else {
            panic!("expected request command, got {command:?}");
        };
        assert_eq!(input.cluster, "prod-east-1");
        assert_eq!(input.reason, "investigating incident 42");
        assert_eq!(input.duration.as_deref(), Some("2h"));
        assert_eq!(
            input.permissions,
            Some(vec!["view".to_owned(), "logs".to_owned()])
        );
        assert_eq!(input.namespaces, ["payments"]);
        assert_eq!(
            input.approvers,
            Some(vec!["U0000000002".to_owned(), "sre".to_owned()])
        );
    }

    #[test]
    fn request_without_reason_or_with_unknown_flag_is_rejected() {
        assert!(matches!(
            parse("request prod-east-1"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse("request prod-east-1 fixing things --ttl=1h"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse("request prod-east-1 fixing --duration"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn approve_keeps_optional_comment() {
        assert_eq!(
            parse("approve 1b4e28ba looks good to me").ok(),
            Some(ChatCommand::Approve {
                id: "1b4e28ba".to_owned(),
                comment: Some("looks good to me".to_owned()),
            })
        );
        assert!(parse("approve").is_err());
    }

    #[test]
    fn admin_shortcuts_parse() {
        assert_eq!(
            parse("admin deny 1b4e28ba change freeze").ok(),
            Some(ChatCommand::Admin(AdminCommand::Deny {
                id: "1b4e28ba".to_owned(),
                reason: Some("change freeze".to_owned()),
            }))
        );
        assert_eq!(
            parse("admin role U0000000004 Approver").ok(),
            Some(ChatCommand::Admin(AdminCommand::Role {
                user_id: "U0000000004".to_owned(),
                role: OperatorRole::Approver,
            }))
        );
        assert!(parse("admin role U0000000004 root").is_err());
        assert!(parse("admin reboot").is_err());
        assert!(parse("deploy prod").is_err());
    }
}
