//! Command extraction from message text.

/// A command parsed from a message that starts with the trigger prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The first word after the prefix.
    pub name: String,
    /// Everything after the first run of whitespace, trimmed.
    pub args: String,
}

/// Splits `text` into an optional command and the processed remainder.
///
/// When `text` starts with `prefix`, the rest is trimmed and split on the
/// first whitespace into `(name, args)` and the remainder is `args`.
/// Otherwise there is no command and the remainder is the whole text.
pub fn extract_command(text: &str, prefix: &str) -> (Option<Command>, String) {
    let Some(rest) = text.strip_prefix(prefix) else {
        return (None, text.to_string());
    };
    if prefix.is_empty() {
        return (None, text.to_string());
    }

    let rest = rest.trim();
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let command = Command {
        name: name.to_string(),
        args: args.to_string(),
    };
    let remainder = command.args.clone();
    (Some(command), remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_and_args() {
        let (cmd, rest) = extract_command("/echo  hello world ", "/");
        let cmd = cmd.unwrap();
        assert_eq!(cmd.name, "echo");
        assert_eq!(cmd.args, "hello world");
        assert_eq!(rest, "hello world");
    }

    #[test]
    fn bare_command_has_empty_args() {
        let (cmd, rest) = extract_command("/ping", "/");
        assert_eq!(
            cmd,
            Some(Command {
                name: "ping".into(),
                args: String::new()
            })
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn text_without_prefix_is_not_a_command() {
        let (cmd, rest) = extract_command("hello /ping", "/");
        assert!(cmd.is_none());
        assert_eq!(rest, "hello /ping");
    }

    #[test]
    fn multi_char_prefix() {
        let (cmd, _) = extract_command("!!help plugins", "!!");
        assert_eq!(cmd.unwrap().name, "help");
        let (cmd, rest) = extract_command("!help", "!!");
        assert!(cmd.is_none());
        assert_eq!(rest, "!help");
    }
}
