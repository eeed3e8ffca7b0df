//! Command grammar: named parameter types with validation predicates, named
//! commands over them, and annotated parsing of tokenized input lines.

use std::collections::HashMap;
use std::fmt;

/// Handle to a registered parameter type. Stays valid across later
/// registrations, including replacement of the type it names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamId(usize);

/// Handle to a registered command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandId(usize);

pub struct ParamType {
    name: String,
    validate: Box<dyn Fn(&str) -> bool>,
}

impl ParamType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validate(&self, token: &str) -> bool {
        (self.validate)(token)
    }
}

pub struct CommandDef {
    name: String,
    params: Vec<ParamId>,
}

impl CommandDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamId] {
        &self.params
    }
}

/// Registry of parameter types and commands. All registration happens up
/// front; parsing never mutates the registry.
#[derive(Default)]
pub struct Grammar {
    params: Vec<ParamType>,
    param_ids: HashMap<String, ParamId>,
    commands: Vec<CommandDef>,
    command_ids: HashMap<String, CommandId>,
}

impl Grammar {
    /// Register a parameter type. Registering an existing name replaces its
    /// predicate in place, so commands already referring to it pick up the
    /// new validation.
    pub fn add_param(
        &mut self,
        name: impl Into<String>,
        validate: impl Fn(&str) -> bool + 'static,
    ) -> ParamId {
        let name = name.into();
        match self.param_ids.get(&name) {
            Some(&id) => {
                self.params[id.0] = ParamType {
                    name,
                    validate: Box::new(validate),
                };
                id
            }
            None => {
                let id = ParamId(self.params.len());
                self.params.push(ParamType {
                    name: name.clone(),
                    validate: Box::new(validate),
                });
                self.param_ids.insert(name, id);
                id
            }
        }
    }

    /// Register a command over already-registered parameter type names.
    ///
    /// An unknown parameter name is a configuration error and panics; this
    /// must surface at registration, never at parse time. Registering a name
    /// twice keeps the first definition.
    pub fn add_command(&mut self, name: impl Into<String>, param_names: &[&str]) -> CommandId {
        let name = name.into();
        let mut params = Vec::with_capacity(param_names.len());
        for param_name in param_names {
            match self.param_ids.get(*param_name) {
                Some(&id) => params.push(id),
                None => panic!("invalid param id {param_name}"),
            }
        }
        match self.command_ids.get(&name) {
            Some(&id) => id,
            None => {
                let id = CommandId(self.commands.len());
                self.commands.push(CommandDef {
                    name: name.clone(),
                    params,
                });
                self.command_ids.insert(name, id);
                id
            }
        }
    }

    pub fn param(&self, id: ParamId) -> &ParamType {
        &self.params[id.0]
    }

    pub fn command(&self, id: CommandId) -> &CommandDef {
        &self.commands[id.0]
    }

    /// Interpret tokens as a command line: the first token names the
    /// command (unknown names still parse, without a definition), the rest
    /// are its arguments. Empty input parses to nothing.
    pub fn parse<'a>(&'a self, tokens: &[String]) -> Option<ParseResult<'a>> {
        let (name, args) = tokens.split_first()?;
        Some(ParseResult {
            grammar: self,
            name: name.clone(),
            command: self.command_ids.get(name).copied(),
            args: args.to_vec(),
        })
    }
}

/// One parsed line, annotated against the grammar it was parsed with.
pub struct ParseResult<'a> {
    grammar: &'a Grammar,
    name: String,
    command: Option<CommandId>,
    args: Vec<String>,
}

impl ParseResult<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> Option<CommandId> {
        self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Effective argument count: the larger of tokens supplied and
    /// parameters declared, so both missing and extraneous arguments are
    /// visible.
    pub fn num_args(&self) -> usize {
        match self.command {
            Some(id) => self.args.len().max(self.grammar.command(id).params.len()),
            None => self.args.len(),
        }
    }

    /// Whether argument `i` validates; `None` when either the token or the
    /// declared parameter at that position is missing.
    pub fn arg_valid(&self, i: usize) -> Option<bool> {
        let command = self.command?;
        let token = self.args.get(i)?;
        let param = self.grammar.command(command).params.get(i)?;
        Some(self.grammar.param(*param).validate(token))
    }
}

impl fmt::Display for ParseResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            return f.write_str("No command");
        }
        write!(f, "[{}]", self.name)?;
        f.write_str(if self.command.is_some() { "CMD" } else { "?" })?;
        let params = self.command.map(|id| self.grammar.command(id).params());
        for i in 0..self.num_args() {
            f.write_str(" ")?;
            let token = self.args.get(i);
            match token {
                Some(t) => write!(f, "[{t}]")?,
                None => f.write_str("(?):")?,
            }
            let param = params
                .and_then(|ps| ps.get(i))
                .map(|id| self.grammar.param(*id));
            match param {
                Some(p) => f.write_str(p.name())?,
                None => f.write_str("?")?,
            }
            if let (Some(t), Some(p)) = (token, param) {
                f.write_str(if p.validate(t) { "<Valid>" } else { "<Invalid>" })?;
            }
        }
        Ok(())
    }
}
