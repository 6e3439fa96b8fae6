use std::{
    error::Error,
    io::{self, Write},
    num::ParseIntError,
    str::FromStr,
};

use anyhow::anyhow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    // Not thrown directly by the arg reader
    #[error("Unknown command")]
    UnknownCommand,

    #[error("Missing argument {0}")]
    MissingArgument(usize),

    #[error("Bad argument ({0})")]
    ParseError(String),
}

pub struct Command(String);

impl Command {
    /// Reads one line from stdin, `None` at end of input.
    pub fn prompt() -> anyhow::Result<Option<Self>> {
        print!("> ");
        io::stdout().flush()?;

        io::stdin()
            .lines()
            .next()
            .transpose()
            .map(|line| line.map(Self))
            .map_err(|e| anyhow!("Couldn't read command from stdin: {}", e))
    }

    pub fn args(&self) -> CommandArgs<impl Iterator<Item = &str>> {
        CommandArgs {
            iter: self.0.split_whitespace(),
            index: 0,
        }
    }
}

pub struct CommandArgs<I> {
    iter: I,
    index: usize,
}

impl<'a, I> CommandArgs<I>
where
    I: Iterator<Item = &'a str>,
{
    pub fn next(&mut self) -> Result<&'a str, CommandError> {
        self.index += 1;

        self.iter
            .next()
            .ok_or_else(|| CommandError::MissingArgument(self.index))
    }

    pub fn next_optional(&mut self) -> Option<&'a str> {
        self.next().ok()
    }

    pub fn next_parsed<T>(&mut self) -> Result<T, CommandError>
    where
        T: FromStr,
        <T as FromStr>::Err: Error + 'static,
    {
        let arg_str = self.next()?;

        T::from_str(arg_str).map_err(|e| CommandError::ParseError(e.to_string()))
    }

    /// Decimal, or hexadecimal with a `0x` prefix.
    pub fn next_number(&mut self) -> Result<u32, CommandError> {
        let arg_str = self.next()?;

        parse_number(arg_str).map_err(|e| CommandError::ParseError(format!("{arg_str}: {e}")))
    }

    /// Every argument left, as numbers. At least one is required.
    pub fn remaining_numbers(&mut self) -> Result<Vec<u32>, CommandError> {
        let mut numbers = vec![self.next_number()?];

        while let Some(arg_str) = self.next_optional() {
            numbers.push(
                parse_number(arg_str)
                    .map_err(|e| CommandError::ParseError(format!("{arg_str}: {e}")))?,
            );
        }

        Ok(numbers)
    }

    pub fn unused(self) -> usize {
        self.iter.count()
    }
}

pub fn parse_number(s: &str) -> Result<u32, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}
