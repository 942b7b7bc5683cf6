use coze_api::{MessageRequest, SubmitToolOutputsRequest, ToolOutput};
use thiserror::Error;

pub const USAGE: &str = "\
usage: coze_agent <command> [options]

commands:
  send <text>                      buffered send (polls until the chat finishes)
  stream <text>                    print every streamed event
  merged <text>                    stream and merge into one answer
  retrieve <chat_id> <conversation_id>
  submit <chat_id> <conversation_id> <tool_call_id> <output> [--stream]
  health                           run the health check
  help

message options:
  --conversation <id>   continue an existing conversation
  --user <id>           user identity (default 123456)
  --bot <id>            agent id (default COZE_BOT_ID)
  --no-history          do not ask the provider to save history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(MessageRequest),
    Stream(MessageRequest),
    Merged(MessageRequest),
    Retrieve {
        chat_id: String,
        conversation_id: String,
    },
    Submit(SubmitToolOutputsRequest),
    Health,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("missing command")]
    MissingCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("option '{0}' needs a value")]
    MissingOptionValue(String),
    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

/// Parse arguments after the program name.
pub fn parse_command(args: &[String]) -> Result<Command, CliError> {
    let Some((command, rest)) = args.split_first() else {
        return Err(CliError::MissingCommand);
    };

    match command.as_str() {
        "send" => parse_message(rest).map(Command::Send),
        "stream" => parse_message(rest).map(|request| Command::Stream(request.with_stream(true))),
        "merged" => parse_message(rest).map(|request| Command::Merged(request.with_stream(true))),
        "retrieve" => {
            let mut positional = positional_only(rest)?.into_iter();
            let chat_id = positional.next().ok_or(CliError::MissingArgument("chat_id"))?;
            let conversation_id = positional
                .next()
                .ok_or(CliError::MissingArgument("conversation_id"))?;
            reject_extra(positional)?;
            Ok(Command::Retrieve {
                chat_id,
                conversation_id,
            })
        }
        "submit" => parse_submit(rest),
        "health" => {
            reject_extra(positional_only(rest)?.into_iter())?;
            Ok(Command::Health)
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

fn parse_message(args: &[String]) -> Result<MessageRequest, CliError> {
    let mut words = Vec::new();
    let mut conversation_id = None;
    let mut user_id = None;
    let mut bot_id = None;
    let mut auto_save_history = true;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--conversation" => conversation_id = Some(option_value(arg, iter.next())?),
            "--user" => user_id = Some(option_value(arg, iter.next())?),
            "--bot" => bot_id = Some(option_value(arg, iter.next())?),
            "--no-history" => auto_save_history = false,
            option if option.starts_with("--") => {
                return Err(CliError::UnknownOption(option.to_string()))
            }
            word => words.push(word),
        }
    }

    if words.is_empty() {
        return Err(CliError::MissingArgument("text"));
    }

    let mut request =
        MessageRequest::new(words.join(" ")).with_auto_save_history(auto_save_history);
    request.conversation_id = conversation_id;
    request.user_id = user_id;
    request.bot_id = bot_id;
    Ok(request)
}

fn parse_submit(args: &[String]) -> Result<Command, CliError> {
    let mut stream = false;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--stream" => stream = true,
            option if option.starts_with("--") => {
                return Err(CliError::UnknownOption(option.to_string()))
            }
            value => positional.push(value.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let chat_id = positional.next().ok_or(CliError::MissingArgument("chat_id"))?;
    let conversation_id = positional
        .next()
        .ok_or(CliError::MissingArgument("conversation_id"))?;
    let tool_call_id = positional
        .next()
        .ok_or(CliError::MissingArgument("tool_call_id"))?;
    let output = positional.next().ok_or(CliError::MissingArgument("output"))?;
    reject_extra(positional)?;

    Ok(Command::Submit(SubmitToolOutputsRequest {
        chat_id,
        conversation_id,
        stream,
        tool_outputs: vec![ToolOutput::new(tool_call_id, output)],
    }))
}

fn positional_only(args: &[String]) -> Result<Vec<String>, CliError> {
    args.iter()
        .map(|arg| {
            if arg.starts_with("--") {
                Err(CliError::UnknownOption(arg.clone()))
            } else {
                Ok(arg.clone())
            }
        })
        .collect()
}

fn reject_extra(mut rest: impl Iterator<Item = String>) -> Result<(), CliError> {
    match rest.next() {
        Some(extra) => Err(CliError::UnexpectedArgument(extra)),
        None => Ok(()),
    }
}

fn option_value(option: &str, value: Option<&String>) -> Result<String, CliError> {
    value
        .filter(|value| !value.starts_with("--"))
        .cloned()
        .ok_or_else(|| CliError::MissingOptionValue(option.to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn send_joins_words_and_reads_options() {
        let command = parse_command(&args(&[
            "send",
            "如何",
            "预防流感",
            "--conversation",
            "conv-1",
            "--user",
            "u-9",
        ]))
        .expect("parse");

        let request = match command {
            Command::Send(request) => request,
            other => panic!("expected send, got {other:?}"),
        };
        assert_eq!(request.content, "如何 预防流感");
        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.user_id.as_deref(), Some("u-9"));
        assert!(!request.stream);
        assert!(request.auto_save_history);
    }

    #[test]
    fn stream_and_merged_force_streaming() {
        let stream = parse_command(&args(&["stream", "hi"])).expect("parse");
        let merged = parse_command(&args(&["merged", "hi", "--no-history"])).expect("parse");

        assert!(matches!(stream, Command::Stream(ref request) if request.stream));
        assert!(matches!(
            merged,
            Command::Merged(ref request) if request.stream && !request.auto_save_history
        ));
    }

    #[test]
    fn submit_builds_single_output_batch() {
        let command = parse_command(&args(&[
            "submit", "chat-1", "conv-1", "call-1", "{\"ok\":true}", "--stream",
        ]))
        .expect("parse");

        assert_eq!(
            command,
            Command::Submit(SubmitToolOutputsRequest {
                chat_id: "chat-1".to_owned(),
                conversation_id: "conv-1".to_owned(),
                stream: true,
                tool_outputs: vec![ToolOutput::new("call-1", "{\"ok\":true}")],
            })
        );
    }

    #[test]
    fn argument_errors_are_reported() {
        assert_eq!(parse_command(&[]), Err(CliError::MissingCommand));
        assert_eq!(
            parse_command(&args(&["send"])),
            Err(CliError::MissingArgument("text"))
        );
        assert_eq!(
            parse_command(&args(&["send", "hi", "--user"])),
            Err(CliError::MissingOptionValue("--user".to_owned()))
        );
        assert_eq!(
            parse_command(&args(&["retrieve", "chat-1"])),
            Err(CliError::MissingArgument("conversation_id"))
        );
        assert_eq!(
            parse_command(&args(&["health", "now"])),
            Err(CliError::UnexpectedArgument("now".to_owned()))
        );
        assert_eq!(
            parse_command(&args(&["ask", "hi"])),
            Err(CliError::UnknownCommand("ask".to_owned()))
        );
    }
}
