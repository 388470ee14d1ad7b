//! Error types.
//!
//! Construction-time problems are [`ConfigurationError`]s and abort manager creation entirely.
//! Runtime misuse surfaces as [`CommandError`]. Errors raised by user callbacks pass through as
//! [`HandlerError`], and teardown failures are collected into a [`DisposalError`].

use thiserror::Error;

/// A boxed error produced by user code (handlers, disposers).
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Fatal, construction-time configuration problems.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("duplicate extension name '{0}'")]
    /// Two distinct extension instances share a name.
    DuplicateExtension(String),

    #[error("node type '{name}' is declared by both '{first}' and '{second}'")]
    /// Two extensions contribute the same node type.
    DuplicateNode {
        /// Node type name.
        name: String,
        /// Extension that declared it first (in sorted order).
        first: String,
        /// Extension that declared it again.
        second: String,
    },

    #[error("mark type '{name}' is declared by both '{first}' and '{second}'")]
    /// Two extensions contribute the same mark type.
    DuplicateMark {
        /// Mark type name.
        name: String,
        /// Extension that declared it first (in sorted order).
        first: String,
        /// Extension that declared it again.
        second: String,
    },

    #[error("command '{name}' is declared by both '{first}' and '{second}'")]
    /// Two extensions contribute the same command.
    DuplicateCommand {
        /// Command name.
        name: String,
        /// Extension that declared it first (in sorted order).
        first: String,
        /// Extension that declared it again.
        second: String,
    },

    #[error("helper '{name}' is declared by both '{first}' and '{second}'")]
    /// Two extensions contribute the same helper.
    DuplicateHelper {
        /// Helper name.
        name: String,
        /// Extension that declared it first (in sorted order).
        first: String,
        /// Extension that declared it again.
        second: String,
    },

    #[error("extension '{extension}' is a {declared} extension but returned a {returned} schema")]
    /// The declared extension kind does not match the schema fragment it returned.
    KindMismatch {
        /// Extension name.
        extension: String,
        /// Declared kind.
        declared: &'static str,
        /// Kind of the fragment actually returned (`none` if nothing was returned).
        returned: &'static str,
    },

    #[error("priority override references unknown extension '{0}'")]
    /// A priority override names an extension that is not part of the manager.
    UnknownPriorityOverride(String),

    #[error("extension '{extension}' requires missing extension '{required}'")]
    /// A required extension is missing.
    MissingRequirement {
        /// The extension declaring the requirement.
        extension: String,
        /// The missing extension name.
        required: String,
    },

    #[error("unknown extension '{0}'")]
    /// An extension name lookup failed.
    UnknownExtension(String),

    #[error("extension '{extension}' declares no event '{event}'")]
    /// A handler was registered for an event the extension never declared.
    UnknownEvent {
        /// Extension name (empty for a free-standing handler table).
        extension: String,
        /// Event name.
        event: String,
    },

    #[error("option '{key}' of extension '{extension}' is static and cannot change after construction")]
    /// Attempt to set a static option at runtime.
    StaticOption {
        /// Extension name.
        extension: String,
        /// Option key.
        key: String,
    },

    #[error("extension '{extension}' has no option '{key}'")]
    /// Attempt to set an option that is not declared.
    UnknownOption {
        /// Extension name.
        extension: String,
        /// Option key.
        key: String,
    },

    #[error("option '{key}' is declared both static and dynamic")]
    /// The same key appears in the static and the dynamic option set.
    AmbiguousOption {
        /// Option key.
        key: String,
    },

    #[error("options must serialize to a JSON object, got {0}")]
    /// Option structs must be maps.
    OptionsNotAnObject(&'static str),

    #[error("option (de)serialization failed: {0}")]
    /// Typed option conversion failed.
    OptionSerde(#[from] serde_json::Error),

    #[error("invalid manager settings: {0}")]
    /// [`ManagerSettings`](crate::ManagerSettings) could not be deserialized.
    InvalidSettings(#[source] serde_json::Error),

    #[error("the manager was not created from a factory")]
    /// [`Manager::renew`](crate::Manager::renew) needs a list factory.
    NoFactory,

    #[error("invalid shortcut in extension '{extension}': {source}")]
    /// A key binding name could not be parsed.
    InvalidShortcut {
        /// Extension name.
        extension: String,
        /// Parser error.
        #[source]
        source: quire_keys::ShortcutError,
    },

    #[error("shortcut '{shortcut}' of extension '{extension}' runs unknown command '{command}'")]
    /// A key binding targets a command that is not in the command table.
    UnknownBindingCommand {
        /// Extension contributing the binding.
        extension: String,
        /// Shortcut as written.
        shortcut: String,
        /// Missing command name.
        command: String,
    },
}

/// Recoverable runtime errors for commands and helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("'{0}' requires an attached editor surface")]
    /// A command, helper or key binding was used before [`Manager::add_view`](crate::Manager::add_view).
    NotAttached(String),

    #[error("unknown command '{0}'")]
    /// No command with that name exists.
    UnknownCommand(String),

    #[error("unknown helper '{0}'")]
    /// No helper with that name exists.
    UnknownHelper(String),
}

/// An error raised by a subscribed handler, passed through unchanged.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct HandlerError(pub BoxError);

impl HandlerError {
    /// Unwrap the original error.
    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

/// Errors collected while running disposers.
///
/// Every disposer runs even when an earlier one fails; the first failure is kept.
#[derive(Debug, Error)]
#[error("{failures} disposer(s) failed; first error: {first}")]
pub struct DisposalError {
    /// The first error encountered.
    #[source]
    pub first: BoxError,
    /// Total number of failing disposers.
    pub failures: usize,
}

/// Any error returned by [`Manager`](crate::Manager) operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    /// Configuration problem.
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    /// Runtime command/helper misuse.
    Command(#[from] CommandError),

    #[error(transparent)]
    /// A lifecycle hook or handler failed.
    Handler(#[from] HandlerError),

    #[error(transparent)]
    /// A shortcut name passed at runtime could not be parsed.
    Shortcut(#[from] quire_keys::ShortcutError),

    #[error(transparent)]
    /// Teardown failure.
    Disposal(#[from] DisposalError),

    #[error("the manager has been destroyed")]
    /// The operation is not available after [`Manager::destroy`](crate::Manager::destroy).
    Destroyed,
}
