//! Keymap resolution.
//!
//! Every extension may bind handlers to shortcuts. Bindings that normalize to the same shortcut
//! form one chain, ordered by binding priority (the owner's effective priority unless the binding
//! sets its own), then by owner sort position, then by declaration order.
//!
//! A handler decides what happens next:
//!
//! - return `true`: handled, stop.
//! - return `false`: not handled, stop. Later handlers never run.
//! - call [`Next::call`] and return its result: defer to the rest of the chain. At the end of the
//!   chain `next` yields `false`.
//!
//! `Next` is consumed by `call`, so a handler defers at most once.

use crate::commands::{CommandProps, CommandTable};
use crate::error::{CommandError, ConfigurationError};
use crate::priority::Priority;
use crate::surface::Surface;
use quire_keys::Platform;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// What a key handler sees.
pub struct KeyBindingProps<'a, S: Surface> {
    /// Current state.
    pub state: &'a S::State,
    /// Transaction shared by the whole chain. Dispatched once if the chain reports handled.
    pub tr: &'a mut S::Transaction,
    /// Canonical shortcut being resolved.
    pub shortcut: &'a str,
    commands: &'a CommandTable<S>,
}

impl<'a, S: Surface> KeyBindingProps<'a, S> {
    pub(crate) fn new(
        state: &'a S::State,
        tr: &'a mut S::Transaction,
        shortcut: &'a str,
        commands: &'a CommandTable<S>,
    ) -> Self {
        Self {
            state,
            tr,
            shortcut,
            commands,
        }
    }

    /// Run a named command against this chain's transaction.
    pub fn command(&mut self, name: &str, args: &Value) -> Result<bool, CommandError> {
        let command = self.commands.get(name)?;
        Ok(command.call(
            &mut CommandProps {
                state: self.state,
                tr: &mut *self.tr,
                dispatch: true,
            },
            args,
        ))
    }
}

/// A key handler.
pub type KeyHandler<S> = Rc<dyn Fn(&mut KeyBindingProps<'_, S>, Next<'_, S>) -> bool>;

/// A binding as contributed by an extension.
pub struct KeyBinding<S: Surface> {
    shortcut: String,
    priority: Option<Priority>,
    command: Option<String>,
    handler: KeyHandler<S>,
}

impl<S: Surface> KeyBinding<S> {
    /// Bind `handler` to `shortcut` (e.g. `Mod-b`, `Shift-Enter`).
    pub fn new(
        shortcut: impl Into<String>,
        handler: impl Fn(&mut KeyBindingProps<'_, S>, Next<'_, S>) -> bool + 'static,
    ) -> Self {
        Self {
            shortcut: shortcut.into(),
            priority: None,
            command: None,
            handler: Rc::new(handler),
        }
    }

    /// Bind a shortcut straight to a command.
    ///
    /// The command must exist once the keymap is composed, otherwise composition fails with
    /// [`ConfigurationError::UnknownBindingCommand`].
    pub fn command(shortcut: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        let target = command.clone();
        let mut binding = Self::new(shortcut, move |props, next| {
            match props.command(&target, &Value::Null) {
                Ok(handled) => handled,
                Err(err) => {
                    tracing::warn!(shortcut = props.shortcut, %err, "key command failed");
                    next.call(props)
                }
            }
        });
        binding.command = Some(command);
        binding
    }

    /// Builder: order this binding independently of its extension.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Shortcut as written.
    pub fn shortcut(&self) -> &str {
        &self.shortcut
    }

    /// Command run by a binding made with [`KeyBinding::command`].
    pub fn bound_command(&self) -> Option<&str> {
        self.command.as_deref()
    }
}

/// A binding placed in a chain.
pub struct KeyBindingEntry<S: Surface> {
    shortcut: String,
    owner: String,
    priority: Priority,
    handler: KeyHandler<S>,
}

impl<S: Surface> KeyBindingEntry<S> {
    /// Canonical shortcut.
    pub fn shortcut(&self) -> &str {
        &self.shortcut
    }

    /// Contributing extension.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Resolved priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl<S: Surface> fmt::Debug for KeyBindingEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBindingEntry")
            .field("shortcut", &self.shortcut)
            .field("owner", &self.owner)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// The remainder of a chain.
pub struct Next<'c, S: Surface> {
    rest: &'c [KeyBindingEntry<S>],
}

impl<'c, S: Surface> Next<'c, S> {
    /// Run the rest of the chain. Returns `false` at the end of the chain.
    pub fn call(self, props: &mut KeyBindingProps<'_, S>) -> bool {
        let Some((first, rest)) = self.rest.split_first() else {
            return false;
        };
        tracing::trace!(shortcut = props.shortcut, owner = %first.owner, "key handler");
        (first.handler)(props, Next { rest })
    }

    /// Number of handlers left.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// Contribution of one extension to the keymap.
pub(crate) struct KeymapContribution<S: Surface> {
    pub(crate) owner: String,
    pub(crate) priority: Priority,
    pub(crate) bindings: Vec<KeyBinding<S>>,
}

/// All chains of a composition, keyed by canonical shortcut.
pub struct Keymap<S: Surface> {
    chains: HashMap<String, Vec<KeyBindingEntry<S>>>,
}

impl<S: Surface> Default for Keymap<S> {
    fn default() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }
}

impl<S: Surface> fmt::Debug for Keymap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.chains.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

impl<S: Surface> Keymap<S> {
    /// Build chains from contributions given in sorted extension order.
    ///
    /// Bindings made with [`KeyBinding::command`] are checked against `commands`.
    pub(crate) fn build(
        contributions: Vec<KeymapContribution<S>>,
        platform: Platform,
        commands: &CommandTable<S>,
    ) -> Result<Self, ConfigurationError> {
        // (priority, owner position, declaration index)
        let mut staged: HashMap<String, Vec<((Priority, usize, usize), KeyBindingEntry<S>)>> =
            HashMap::new();
        let mut seq = 0;
        for (position, contribution) in contributions.into_iter().enumerate() {
            for binding in contribution.bindings {
                if let Some(command) = binding.command
                    && !commands.contains(&command)
                {
                    return Err(ConfigurationError::UnknownBindingCommand {
                        extension: contribution.owner.clone(),
                        shortcut: binding.shortcut,
                        command,
                    });
                }
                let shortcut = quire_keys::normalize(&binding.shortcut, platform).map_err(
                    |source| ConfigurationError::InvalidShortcut {
                        extension: contribution.owner.clone(),
                        source,
                    },
                )?;
                let priority = binding.priority.unwrap_or(contribution.priority);
                staged.entry(shortcut.clone()).or_default().push((
                    (priority, position, seq),
                    KeyBindingEntry {
                        shortcut,
                        owner: contribution.owner.clone(),
                        priority,
                        handler: binding.handler,
                    },
                ));
                seq += 1;
            }
        }

        let chains = staged
            .into_iter()
            .map(|(shortcut, mut entries)| {
                entries.sort_by_key(|(key, _)| *key);
                (shortcut, entries.into_iter().map(|(_, e)| e).collect())
            })
            .collect();
        Ok(Self { chains })
    }

    /// The chain bound to a canonical shortcut.
    pub fn chain(&self, shortcut: &str) -> &[KeyBindingEntry<S>] {
        self.chains.get(shortcut).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bound shortcuts, sorted.
    pub fn shortcuts(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    /// Returns `true` if something is bound to `shortcut`.
    pub fn contains(&self, shortcut: &str) -> bool {
        self.chains.contains_key(shortcut)
    }

    /// Number of bound shortcuts.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Run the chain for `props.shortcut`. Returns `true` if a handler reported handled.
    pub fn resolve(&self, props: &mut KeyBindingProps<'_, S>) -> bool {
        let chain = self.chain(props.shortcut);
        if chain.is_empty() {
            tracing::trace!(shortcut = props.shortcut, "no key chain");
            return false;
        }
        Next { rest: chain }.call(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NullSurface;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn logging(
        name: &'static str,
        log: &Log,
        body: fn(&mut KeyBindingProps<'_, NullSurface>, Next<'_, NullSurface>) -> bool,
    ) -> KeyBinding<NullSurface> {
        let log = Rc::clone(log);
        KeyBinding::new("Enter", move |props, next| {
            log.borrow_mut().push(name);
            body(props, next)
        })
    }

    fn contribution(
        owner: &str,
        priority: Priority,
        bindings: Vec<KeyBinding<NullSurface>>,
    ) -> KeymapContribution<NullSurface> {
        KeymapContribution {
            owner: owner.to_string(),
            priority,
            bindings,
        }
    }

    fn run(keymap: &Keymap<NullSurface>, shortcut: &str) -> bool {
        let commands = CommandTable::default();
        let mut tr = Vec::new();
        let mut props = KeyBindingProps::new(&(), &mut tr, shortcut, &commands);
        keymap.resolve(&mut props)
    }

    #[test]
    fn test_chain_order_uses_priority_then_position() {
        let log: Log = Rc::default();
        let keymap = Keymap::build(
            vec![
                contribution("a", Priority(0), vec![logging("a", &log, |p, n| n.call(p))]),
                contribution("b", Priority(1), vec![logging("b", &log, |p, n| n.call(p))]),
                contribution(
                    "c",
                    Priority(1),
                    vec![
                        logging("c1", &log, |p, n| n.call(p)),
                        logging("c0", &log, |p, n| n.call(p)).with_priority(Priority(0)),
                    ],
                ),
            ],
            Platform::Other,
            &CommandTable::default(),
        )
        .unwrap();

        let owners: Vec<&str> = keymap.chain("Enter").iter().map(|e| e.owner()).collect();
        assert_eq!(owners, vec!["a", "c", "b", "c"]);
        assert!(!run(&keymap, "Enter"));
        assert_eq!(*log.borrow(), vec!["a", "c0", "b", "c1"]);
    }

    #[test]
    fn test_shortcuts_are_normalized_into_one_chain() {
        let keymap = Keymap::<NullSurface>::build(
            vec![
                contribution("a", Priority(0), vec![KeyBinding::new("Mod-Shift-z", |_, _| true)]),
                contribution("b", Priority(1), vec![KeyBinding::new("shift-ctrl-z", |_, _| true)]),
            ],
            Platform::Other,
            &CommandTable::default(),
        )
        .unwrap();
        assert_eq!(keymap.shortcuts(), vec!["Ctrl-Shift-Z"]);
        assert_eq!(keymap.chain("Ctrl-Shift-Z").len(), 2);
    }

    #[test]
    fn test_invalid_shortcut() {
        let err = Keymap::<NullSurface>::build(
            vec![contribution("a", Priority(0), vec![KeyBinding::new("Hyper-x", |_, _| true)])],
            Platform::Other,
            &CommandTable::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidShortcut { ref extension, .. } if extension == "a"
        ));
    }

    #[test]
    fn test_command_binding_needs_a_known_command() {
        let err = Keymap::<NullSurface>::build(
            vec![contribution("a", Priority(0), vec![KeyBinding::command("Mod-b", "toggleBold")])],
            Platform::Other,
            &CommandTable::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownBindingCommand { ref extension, ref shortcut, ref command }
                if extension == "a" && shortcut == "Mod-b" && command == "toggleBold"
        ));
    }

    #[test]
    fn test_unbound_shortcut_is_unhandled() {
        let keymap = Keymap::<NullSurface>::default();
        assert!(!run(&keymap, "Enter"));
    }

    #[test]
    fn test_next_at_end_of_chain_is_false() {
        let keymap = Keymap::<NullSurface>::build(
            vec![contribution(
                "a",
                Priority(0),
                vec![KeyBinding::new("Enter", |props, next| {
                    assert_eq!(next.remaining(), 0);
                    assert_eq!(props.shortcut, "Enter");
                    next.call(props)
                })],
            )],
            Platform::Other,
            &CommandTable::default(),
        )
        .unwrap();
        assert!(!run(&keymap, "Enter"));
    }
}
