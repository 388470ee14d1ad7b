//! Shared fixtures: an in-memory surface and a configurable extension.

#![allow(dead_code)]

use quire_core::{
    CommandSpec, Disposer, Extension, ExtensionKind, HelperSpec, LifecycleResult,
    NodeSpec, OptionChanges, Options, Priority, SchemaFragment, StateUpdate, StoreView, Surface,
    Tag,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared event log.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::default()
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Document state: the list of applied steps.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Doc {
    pub steps: Vec<String>,
}

/// An editing surface that appends transaction steps to its document.
#[derive(Debug, Default)]
pub struct FakeSurface {
    pub doc: Doc,
    pub dispatched: usize,
    pub plugins: Vec<String>,
    pub plugin_updates: usize,
}

impl Surface for FakeSurface {
    type State = Doc;
    type Transaction = Vec<String>;
    type Plugin = String;

    fn state(&self) -> &Doc {
        &self.doc
    }

    fn transaction(&self) -> Vec<String> {
        Vec::new()
    }

    fn dispatch(&mut self, tr: Vec<String>) {
        self.doc.steps.extend(tr);
        self.dispatched += 1;
    }

    fn update_plugins(&mut self, plugins: &[String]) {
        self.plugins = plugins.to_vec();
        self.plugin_updates += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticOptions {
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicOptions {
    pub placeholder: String,
}

/// A configurable extension recording its lifecycle into a shared log.
pub struct Recorder {
    pub name: String,
    pub priority: Priority,
    pub log: Log,
    pub node: Option<(String, NodeSpec)>,
    pub tags: Vec<Tag>,
    pub commands: Vec<String>,
    pub plugins: Vec<String>,
    pub options: Options,
    pub fail_on_create: bool,
    pub fail_on_view: bool,
    pub updates: usize,
    pub plugin_generation: Rc<RefCell<usize>>,
}

impl Recorder {
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            priority: Priority::DEFAULT,
            log: Rc::clone(log),
            node: None,
            tags: Vec::new(),
            commands: Vec::new(),
            plugins: Vec::new(),
            options: Options::new(
                &StaticOptions {
                    label: name.to_string(),
                },
                &DynamicOptions {
                    placeholder: String::new(),
                },
            )
            .unwrap(),
            fail_on_create: false,
            fail_on_view: false,
            updates: 0,
            plugin_generation: Rc::default(),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn node(mut self, name: &str, spec: NodeSpec) -> Self {
        self.node = Some((name.to_string(), spec));
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// A command that appends `"<command>"` to the transaction.
    pub fn command(mut self, name: &str) -> Self {
        self.commands.push(name.to_string());
        self
    }

    pub fn plugin(mut self, plugin: &str) -> Self {
        self.plugins.push(plugin.to_string());
        self
    }

    pub fn failing_on_create(mut self) -> Self {
        self.fail_on_create = true;
        self
    }

    pub fn failing_on_view(mut self) -> Self {
        self.fail_on_view = true;
        self
    }

    fn push(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    fn disposer(&self, phase: &str) -> Disposer {
        let log = Rc::clone(&self.log);
        let entry = format!("dispose-{phase}:{}", self.name);
        Disposer::new(move || log.borrow_mut().push(entry))
    }
}

impl Extension<FakeSurface> for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn kind(&self) -> ExtensionKind {
        if self.node.is_some() {
            ExtensionKind::Node
        } else {
            ExtensionKind::Plain
        }
    }

    fn tags(&self) -> Vec<Tag> {
        self.tags.clone()
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }

    fn create_schema(&self) -> Option<SchemaFragment> {
        self.node
            .as_ref()
            .map(|(name, spec)| SchemaFragment::node(name.clone(), spec.clone()))
    }

    fn create_commands(&self) -> Vec<CommandSpec<FakeSurface>> {
        self.commands
            .iter()
            .map(|name| {
                let step = name.clone();
                CommandSpec::<FakeSurface>::new(name.clone(), move |props, _args| {
                    if props.dispatch {
                        props.tr.push(step.clone());
                    }
                    true
                })
                .with_active({
                    let step = name.clone();
                    move |state: &Doc, _| state.steps.last() == Some(&step)
                })
            })
            .collect()
    }

    fn create_helpers(&self) -> Vec<HelperSpec<FakeSurface>> {
        vec![HelperSpec::<FakeSurface>::new(
            format!("{}StepCount", self.name),
            |state: &Doc, _| serde_json::json!(state.steps.len()),
        )]
    }

    fn create_plugins(&self) -> Vec<String> {
        let generation = *self.plugin_generation.borrow();
        self.plugins
            .iter()
            .map(|p| format!("{p}#{generation}"))
            .collect()
    }

    fn on_create(&mut self, store: &StoreView<'_, FakeSurface>) -> LifecycleResult {
        self.push(format!(
            "create:{} ({} extensions)",
            self.name,
            store.extension_names().len()
        ));
        if self.fail_on_create {
            return Err(format!("{} failed to create", self.name).into());
        }
        Ok(Some(self.disposer("create")))
    }

    fn on_view(&mut self, store: &StoreView<'_, FakeSurface>) -> LifecycleResult {
        assert!(store.surface().is_some());
        self.push(format!("view:{}", self.name));
        if self.fail_on_view {
            return Err(format!("{} failed to view", self.name).into());
        }
        Ok(Some(self.disposer("view")))
    }

    fn on_state_update(&mut self, update: &StateUpdate<'_, FakeSurface>) {
        self.updates += 1;
        self.push(format!(
            "update:{}:{}",
            self.name,
            update.state.steps.len()
        ));
    }

    fn on_set_options(&mut self, changes: &OptionChanges) {
        for change in &changes.changes {
            self.push(format!("options:{}:{}", self.name, change.key));
        }
    }

    fn on_destroy(&mut self) {
        self.push(format!("destroy:{}", self.name));
    }
}
