//! Commands and helpers.
//!
//! A command is a named function over `(state, transaction, dispatch)`. It returns `true` when it
//! applies. With `dispatch` set it performs its change on the transaction; with `dispatch` unset
//! it only reports whether it *could* apply, which is how
//! [`Manager::command_enabled`](crate::Manager::command_enabled) works.
//!
//! Helpers are pure accessors of the current state (`is_bold`, `active_heading_level`).
//!
//! Command and helper names are unique across all extensions; the tables here are built once
//! per composition in sorted extension order.

use crate::error::{CommandError, ConfigurationError};
use crate::surface::Surface;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// What a command sees when it runs.
pub struct CommandProps<'a, S: Surface> {
    /// Current state.
    pub state: &'a S::State,
    /// Transaction to record changes in.
    pub tr: &'a mut S::Transaction,
    /// `false` for a dry run: report applicability only, change nothing.
    pub dispatch: bool,
}

/// A command implementation. Returns `true` if it applies.
pub type CommandFn<S> = Rc<dyn Fn(&mut CommandProps<'_, S>, &Value) -> bool>;

/// Whether a command's effect is currently present (bold at the cursor, heading level 2 active).
pub type ActiveFn<S> = Rc<dyn Fn(&<S as Surface>::State, &Value) -> bool>;

/// A helper implementation.
pub type HelperFn<S> = Rc<dyn Fn(&<S as Surface>::State, &Value) -> Value>;

/// A command contributed by an extension.
pub struct CommandSpec<S: Surface> {
    name: String,
    run: CommandFn<S>,
    active: Option<ActiveFn<S>>,
}

impl<S: Surface> CommandSpec<S> {
    /// Create a command.
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&mut CommandProps<'_, S>, &Value) -> bool + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Rc::new(run),
            active: None,
        }
    }

    /// Builder: attach an active-state query.
    pub fn with_active(mut self, active: impl Fn(&S::State, &Value) -> bool + 'static) -> Self {
        self.active = Some(Rc::new(active));
        self
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A helper contributed by an extension.
pub struct HelperSpec<S: Surface> {
    name: String,
    run: HelperFn<S>,
}

impl<S: Surface> HelperSpec<S> {
    /// Create a helper.
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&S::State, &Value) -> Value + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Rc::new(run),
        }
    }

    /// Helper name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A registered command.
pub struct Command<S: Surface> {
    owner: String,
    run: CommandFn<S>,
    active: Option<ActiveFn<S>>,
}

impl<S: Surface> Clone for Command<S> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            run: Rc::clone(&self.run),
            active: self.active.clone(),
        }
    }
}

impl<S: Surface> Command<S> {
    /// Contributing extension.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Run against explicit props.
    pub fn call(&self, props: &mut CommandProps<'_, S>, args: &Value) -> bool {
        (self.run)(props, args)
    }

    /// Query the active state. `None` if the command has no active query.
    pub fn is_active(&self, state: &S::State, args: &Value) -> Option<bool> {
        self.active.as_ref().map(|f| f(state, args))
    }

    /// Run with `dispatch = true` against a fresh transaction. Returns the transaction if the
    /// command applied.
    pub(crate) fn execute(&self, surface: &S, args: &Value) -> Option<S::Transaction> {
        let mut tr = surface.transaction();
        let applied = self.call(
            &mut CommandProps {
                state: surface.state(),
                tr: &mut tr,
                dispatch: true,
            },
            args,
        );
        applied.then_some(tr)
    }

    /// Dry run: `dispatch = false`, transaction discarded.
    pub(crate) fn can_execute(&self, surface: &S, args: &Value) -> bool {
        let mut tr = surface.transaction();
        self.call(
            &mut CommandProps {
                state: surface.state(),
                tr: &mut tr,
                dispatch: false,
            },
            args,
        )
    }
}

/// All commands of a composition, keyed by name.
pub struct CommandTable<S: Surface> {
    commands: BTreeMap<String, Command<S>>,
}

impl<S: Surface> Default for CommandTable<S> {
    fn default() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }
}

impl<S: Surface> fmt::Debug for CommandTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.commands.iter().map(|(k, v)| (k, &v.owner)))
            .finish()
    }
}

impl<S: Surface> CommandTable<S> {
    /// Build from `(owner, specs)` pairs given in sorted extension order.
    pub fn build(
        contributions: impl IntoIterator<Item = (String, Vec<CommandSpec<S>>)>,
    ) -> Result<Self, ConfigurationError> {
        let mut commands: BTreeMap<String, Command<S>> = BTreeMap::new();
        for (owner, specs) in contributions {
            for spec in specs {
                if let Some(existing) = commands.get(&spec.name) {
                    return Err(ConfigurationError::DuplicateCommand {
                        name: spec.name,
                        first: existing.owner.clone(),
                        second: owner,
                    });
                }
                commands.insert(
                    spec.name,
                    Command {
                        owner: owner.clone(),
                        run: spec.run,
                        active: spec.active,
                    },
                );
            }
        }
        Ok(Self { commands })
    }

    /// Look up a command.
    pub fn get(&self, name: &str) -> Result<&Command<S>, CommandError> {
        self.commands
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    /// Returns `true` if `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// The extension that contributed `name`.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(Command::owner)
    }

    /// Command names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if there are no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

struct Helper<S: Surface> {
    owner: String,
    run: HelperFn<S>,
}

/// All helpers of a composition, keyed by name.
pub struct HelperTable<S: Surface> {
    helpers: BTreeMap<String, Helper<S>>,
}

impl<S: Surface> Default for HelperTable<S> {
    fn default() -> Self {
        Self {
            helpers: BTreeMap::new(),
        }
    }
}

impl<S: Surface> fmt::Debug for HelperTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.helpers.iter().map(|(k, v)| (k, &v.owner)))
            .finish()
    }
}

impl<S: Surface> HelperTable<S> {
    /// Build from `(owner, specs)` pairs given in sorted extension order.
    pub fn build(
        contributions: impl IntoIterator<Item = (String, Vec<HelperSpec<S>>)>,
    ) -> Result<Self, ConfigurationError> {
        let mut helpers: BTreeMap<String, Helper<S>> = BTreeMap::new();
        for (owner, specs) in contributions {
            for spec in specs {
                if let Some(existing) = helpers.get(&spec.name) {
                    return Err(ConfigurationError::DuplicateHelper {
                        name: spec.name,
                        first: existing.owner.clone(),
                        second: owner,
                    });
                }
                helpers.insert(
                    spec.name,
                    Helper {
                        owner: owner.clone(),
                        run: spec.run,
                    },
                );
            }
        }
        Ok(Self { helpers })
    }

    /// Evaluate a helper.
    pub fn call(&self, name: &str, state: &S::State, args: &Value) -> Result<Value, CommandError> {
        let helper = self
            .helpers
            .get(name)
            .ok_or_else(|| CommandError::UnknownHelper(name.to_string()))?;
        Ok((helper.run)(state, args))
    }

    /// Returns `true` if `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    /// The extension that contributed `name`.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.helpers.get(name).map(|h| h.owner.as_str())
    }

    /// Helper names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }

    /// Number of helpers.
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Returns `true` if there are no helpers.
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}
