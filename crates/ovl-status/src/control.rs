//! Line-oriented control input for `attach`: one user action per line.

use crate::actor::ActorInput;
use ovl_core::AgentMode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("unknown control command: {0}")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("invalid mode: {0}")]
    InvalidMode(String),
}

/// Parses `submit <text>`, `cancel`, `ack`, `hide`, `select [id]`,
/// `clear-llm` and `mode <legacy|goals|tools>`. Blank lines yield `None`.
pub fn parse_control_line(line: &str) -> Result<Option<ActorInput>, ControlError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let input = match verb {
        "submit" => {
            if rest.is_empty() {
                return Err(ControlError::MissingArgument("submit"));
            }
            ActorInput::Submit(rest.to_string())
        }
        "cancel" => ActorInput::Cancel,
        "ack" => ActorInput::AcknowledgeError,
        "hide" => ActorInput::HideWindow,
        "select" => ActorInput::SelectLlmCall((!rest.is_empty()).then(|| rest.to_string())),
        "clear-llm" => ActorInput::ClearLlmCalls,
        "mode" => {
            if rest.is_empty() {
                return Err(ControlError::MissingArgument("mode"));
            }
            let mode = rest
                .parse::<AgentMode>()
                .map_err(|_| ControlError::InvalidMode(rest.to_string()))?;
            ActorInput::SetMode(mode)
        }
        other => return Err(ControlError::Unknown(other.to_string())),
    };
    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_verb() {
        assert_eq!(
            parse_control_line("submit  open safari and search rust "),
            Ok(Some(ActorInput::Submit(
                "open safari and search rust".to_string()
            )))
        );
        assert_eq!(parse_control_line("cancel"), Ok(Some(ActorInput::Cancel)));
        assert_eq!(
            parse_control_line("ack"),
            Ok(Some(ActorInput::AcknowledgeError))
        );
        assert_eq!(parse_control_line("hide"), Ok(Some(ActorInput::HideWindow)));
        assert_eq!(
            parse_control_line("select c1"),
            Ok(Some(ActorInput::SelectLlmCall(Some("c1".to_string()))))
        );
        assert_eq!(
            parse_control_line("select"),
            Ok(Some(ActorInput::SelectLlmCall(None)))
        );
        assert_eq!(
            parse_control_line("clear-llm"),
            Ok(Some(ActorInput::ClearLlmCalls))
        );
        assert_eq!(
            parse_control_line("mode goals"),
            Ok(Some(ActorInput::SetMode(AgentMode::Goals)))
        );
        assert_eq!(parse_control_line("   "), Ok(None));
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(
            parse_control_line("submit"),
            Err(ControlError::MissingArgument("submit"))
        );
        assert_eq!(
            parse_control_line("mode turbo"),
            Err(ControlError::InvalidMode("turbo".to_string()))
        );
        assert_eq!(
            parse_control_line("reboot now"),
            Err(ControlError::Unknown("reboot".to_string()))
        );
    }
}
