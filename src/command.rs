//! Interactive command parsing for the client shell.

use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ls`
    List,
    /// `fget <name>`
    Get(String),
    /// `fup <name>`
    Put(String),
    /// `exit`
    Exit,
    /// Any other text, sent to the server as a Message
    Say(String),
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let command = match verb {
        "ls" => Command::List,
        "exit" => Command::Exit,
        "fget" => Command::Get(single_name("fget", words)?),
        "fup" => Command::Put(single_name("fup", words)?),
        _ => Command::Say(line.to_string()),
    };
    Ok(Some(command))
}

fn single_name<'a>(
    verb: &'static str,
    mut words: impl Iterator<Item = &'a str>,
) -> Result<String, CommandError> {
    let name = words.next().ok_or(CommandError::MissingArgument(verb))?;
    if words.next().is_some() {
        return Err(CommandError::TooManyArguments(verb));
    }
    Ok(name.to_string())
}
