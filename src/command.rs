//! Console directive parsing shared by the server and client interpreters.
//!
//! A line whose first non-blank character is `#` is a directive and is
//! interpreted locally; everything else is chat content. Parsing only
//! recognizes the directive and carries its raw argument along: state
//! checks happen first in the interpreters, so `#setport` in the wrong
//! state reports the state error even when the argument is malformed too.

use crate::error::ChatError;

/// Prefix that marks a console line as a directive rather than chat.
pub const COMMAND_PREFIX: char = '#';

/// Returns true when the console line should be interpreted as a directive.
pub fn is_directive(line: &str) -> bool {
    line.trim_start().starts_with(COMMAND_PREFIX)
}

/// Directives understood by the server console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Quit,
    Stop,
    Close,
    SetPort(Option<String>),
    Start,
    GetPort,
}

/// Directives understood by the client console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    SetHost(Option<String>),
    SetPort(Option<String>),
    Login,
    GetHost,
    GetPort,
}

impl ServerCommand {
    /// Parses a `#`-prefixed console line. Callers route non-directive
    /// lines to the chat path via [`is_directive`] before calling this.
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        let (name, arg) = split(line);
        match name {
            "#quit" => Ok(Self::Quit),
            "#stop" => Ok(Self::Stop),
            "#close" => Ok(Self::Close),
            "#setport" => Ok(Self::SetPort(arg.map(str::to_string))),
            "#start" => Ok(Self::Start),
            "#getport" => Ok(Self::GetPort),
            other => Err(ChatError::UnknownCommand(other.to_string())),
        }
    }
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        let (name, arg) = split(line);
        match name {
            "#quit" => Ok(Self::Quit),
            "#logoff" => Ok(Self::Logoff),
            "#sethost" => Ok(Self::SetHost(arg.map(str::to_string))),
            "#setport" => Ok(Self::SetPort(arg.map(str::to_string))),
            "#login" => Ok(Self::Login),
            "#gethost" => Ok(Self::GetHost),
            "#getport" => Ok(Self::GetPort),
            other => Err(ChatError::UnknownCommand(other.to_string())),
        }
    }
}

/// Splits a directive line into its name and optional argument.
fn split(line: &str) -> (&str, Option<&str>) {
    let body = line.trim();
    match body.split_once(char::is_whitespace) {
        Some((name, rest)) => {
            let rest = rest.trim();
            (name, (!rest.is_empty()).then_some(rest))
        }
        None => (body, None),
    }
}

/// Validates a port argument carried by a `#setport` directive.
pub fn parse_port(arg: Option<&str>) -> Result<u16, ChatError> {
    let arg = arg.ok_or_else(|| ChatError::InvalidArgument("missing port number".into()))?;
    arg.parse::<u16>()
        .map_err(|_| ChatError::InvalidArgument(format!("invalid port number: {arg}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_directives() {
        assert!(is_directive("#quit"));
        assert!(is_directive("  #getport"));
        assert!(!is_directive("hello everyone"));
        assert!(!is_directive("quit #now"));
    }

    #[test]
    fn parses_server_directives() {
        assert_eq!(ServerCommand::parse("#quit").unwrap(), ServerCommand::Quit);
        assert_eq!(ServerCommand::parse("#stop").unwrap(), ServerCommand::Stop);
        assert_eq!(
            ServerCommand::parse("#setport 6000").unwrap(),
            ServerCommand::SetPort(Some("6000".to_string()))
        );
        assert_eq!(
            ServerCommand::parse("#setport").unwrap(),
            ServerCommand::SetPort(None)
        );
    }

    #[test]
    fn parses_client_directives() {
        assert_eq!(ClientCommand::parse("#logoff").unwrap(), ClientCommand::Logoff);
        assert_eq!(
            ClientCommand::parse("#sethost example.org").unwrap(),
            ClientCommand::SetHost(Some("example.org".to_string()))
        );
        assert_eq!(ClientCommand::parse("#login").unwrap(), ClientCommand::Login);
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let err = ServerCommand::parse("#frobnicate").unwrap_err();
        assert!(matches!(err, ChatError::UnknownCommand(name) if name == "#frobnicate"));

        let err = ClientCommand::parse("#stop").unwrap_err();
        assert!(matches!(err, ChatError::UnknownCommand(_)));
    }

    #[test]
    fn port_argument_validation() {
        assert_eq!(parse_port(Some("6000")).unwrap(), 6000);
        assert!(matches!(
            parse_port(Some("abc")),
            Err(ChatError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_port(Some("70000")),
            Err(ChatError::InvalidArgument(_))
        ));
        assert!(matches!(parse_port(None), Err(ChatError::InvalidArgument(_))));
    }
}
