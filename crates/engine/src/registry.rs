use std::collections::{HashMap, HashSet};

use shared::{
    domain::{CommandBinding, HoldClass, Mode, MAX_BUTTONS},
    error::ControlError,
};

/// Separator between the tokens of a plan ballot.
pub const PLAN_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub button: u8,
    pub hold: HoldClass,
}

/// Immutable token table. Iteration order is registration order, which is
/// also the tie-break order for single-command rounds.
#[derive(Debug)]
pub struct CommandRegistry {
    buttons: u8,
    commands: Vec<(String, CommandSpec)>,
    positions: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new(buttons: u8, bindings: &[CommandBinding]) -> Result<Self, ControlError> {
        if buttons == 0 || buttons > MAX_BUTTONS {
            return Err(ControlError::invalid_config(format!(
                "button count must be within 1..={MAX_BUTTONS}, got {buttons}"
            )));
        }
        if bindings.is_empty() {
            return Err(ControlError::invalid_config("no commands configured"));
        }

        let mut commands = Vec::with_capacity(bindings.len());
        let mut positions = HashMap::with_capacity(bindings.len());
        let mut used_buttons = HashSet::new();
        for binding in bindings {
            let token = binding.token.trim().to_lowercase();
            if token.is_empty() {
                return Err(ControlError::invalid_config("command token is empty"));
            }
            if token.contains(PLAN_SEPARATOR) || token.contains(char::is_whitespace) {
                return Err(ControlError::invalid_config(format!(
                    "command token '{token}' contains whitespace or '{PLAN_SEPARATOR}'"
                )));
            }
            if Mode::from_token(&token).is_some() {
                return Err(ControlError::invalid_config(format!(
                    "command token '{token}' collides with a mode vote"
                )));
            }
            if binding.button >= buttons {
                return Err(ControlError::invalid_config(format!(
                    "command '{token}' maps to button {} but only {buttons} buttons exist",
                    binding.button
                )));
            }
            if !used_buttons.insert(binding.button) {
                return Err(ControlError::invalid_config(format!(
                    "button {} is bound to more than one command",
                    binding.button
                )));
            }
            if positions.insert(token.clone(), commands.len()).is_some() {
                return Err(ControlError::invalid_config(format!(
                    "command '{token}' is defined twice"
                )));
            }
            let hold = HoldClass::for_token(&token);
            commands.push((
                token,
                CommandSpec {
                    button: binding.button,
                    hold,
                },
            ));
        }

        Ok(Self {
            buttons,
            commands,
            positions,
        })
    }

    pub fn lookup(&self, token: &str) -> Result<CommandSpec, ControlError> {
        self.position(token)
            .map(|index| self.commands[index].1)
            .ok_or_else(|| ControlError::unknown_command(token))
    }

    pub fn position(&self, token: &str) -> Option<usize> {
        self.positions.get(token).copied()
    }

    pub fn token_at(&self, position: usize) -> Option<&str> {
        self.commands.get(position).map(|(token, _)| token.as_str())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|(token, _)| token.as_str())
    }

    pub fn button_count(&self) -> u8 {
        self.buttons
    }

    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
