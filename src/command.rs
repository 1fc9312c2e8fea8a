/// Usage line for creating a task.
pub const SETTASK_USAGE: &str = "/settask <task name> [| MM/DD/YYYY]";
pub const UPDATE_USAGE: &str = "/updatetask <task name or id> | <property> | <new value>";
pub const DETAILS_USAGE: &str = "/taskdetails <task name or id>";

/// A recognized slash command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// Begin task creation. `title` may be empty, which is a usage error.
    SetTask { title: String, due: Option<String> },
    ListTasks,
    UpdateTask {
        identity: String,
        field: String,
        value: String,
    },
    TaskDetails { identity: String },
    Roast,
    /// A known command with arguments of the wrong shape.
    Usage(&'static str),
    Unknown(String),
}

/// Parses `text` as a slash command. Returns `None` for free text.
///
/// ```
/// use astra::command::{parse, Command};
/// assert_eq!(parse("/listtasks"), Some(Command::ListTasks));
/// assert_eq!(parse("hello"), None);
/// ```
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    // Group chats address commands as /name@botname.
    let name = name.split('@').next().unwrap_or(name).to_lowercase();
    let command = match name.as_str() {
        "start" | "help" => Command::Help,
        "settask" | "createtask" => {
            let mut parts = args.splitn(2, '|').map(str::trim);
            let title = parts.next().unwrap_or_default().to_string();
            let due = parts.next().filter(|d| !d.is_empty()).map(str::to_string);
            Command::SetTask { title, due }
        }
        "listtasks" | "tasks" => Command::ListTasks,
        "updatetask" => {
            let parts: Vec<&str> = args.splitn(3, '|').map(str::trim).collect();
            match parts.as_slice() {
                [identity, field, value]
                    if !identity.is_empty() && !field.is_empty() && !value.is_empty() =>
                {
                    Command::UpdateTask {
                        identity: identity.to_string(),
                        field: field.to_string(),
                        value: value.to_string(),
                    }
                }
                _ => Command::Usage(UPDATE_USAGE),
            }
        }
        "taskdetails" | "details" if args.is_empty() => Command::Usage(DETAILS_USAGE),
        "taskdetails" | "details" => Command::TaskDetails {
            identity: args.to_string(),
        },
        "roast" => Command::Roast,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settask_with_and_without_date() {
        assert_eq!(
            parse("/settask Write report"),
            Some(Command::SetTask {
                title: "Write report".into(),
                due: None
            })
        );
        assert_eq!(
            parse("/settask Write report | 06/25/2025"),
            Some(Command::SetTask {
                title: "Write report".into(),
                due: Some("06/25/2025".into())
            })
        );
        assert_eq!(
            parse("/settask"),
            Some(Command::SetTask {
                title: String::new(),
                due: None
            })
        );
    }

    #[test]
    fn update_needs_three_parts() {
        assert_eq!(
            parse("/updatetask Report | Status | Done"),
            Some(Command::UpdateTask {
                identity: "Report".into(),
                field: "Status".into(),
                value: "Done".into()
            })
        );
        assert_eq!(
            parse("/updatetask Report | Status"),
            Some(Command::Usage(UPDATE_USAGE))
        );
    }

    #[test]
    fn value_may_contain_pipes() {
        let cmd = parse("/updatetask R | Notes | a | b").unwrap();
        assert!(matches!(cmd, Command::UpdateTask { value, .. } if value == "a | b"));
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(parse("/listtasks@astra_bot"), Some(Command::ListTasks));
    }

    #[test]
    fn details_requires_identity() {
        assert_eq!(parse("/taskdetails"), Some(Command::Usage(DETAILS_USAGE)));
        assert_eq!(
            parse("/taskdetails  Report "),
            Some(Command::TaskDetails {
                identity: "Report".into()
            })
        );
    }

    #[test]
    fn unknown_and_free_text() {
        assert_eq!(parse("/dance"), Some(Command::Unknown("dance".into())));
        assert_eq!(parse("06/25/2025"), None);
    }
}
