//! Composition example
//!
//! Builds a small editor out of a document, paragraph, text and bold extension, attaches an
//! in-memory surface and drives it through commands, chains and shortcuts.
//!
//! Run with `RUST_LOG=quire_core=trace` to see composition and key resolution events.

use quire_core::{
    AttributeSpec, CommandSpec, Extension, ExtensionKind, ExtensionList, Identifiers, KeyBinding,
    Manager, ManagerSettings, MarkSpec, NodeSpec, ParseRule, Platform, Preset, Priority,
    SchemaFragment, SharedAttribute, Surface, Tag,
};
use serde_json::{Value, json};

/// The document is a flat list of text runs; a transaction appends runs.
#[derive(Default)]
struct Buffer {
    runs: Vec<String>,
}

impl Surface for Buffer {
    type State = Vec<String>;
    type Transaction = Vec<String>;
    type Plugin = &'static str;

    fn state(&self) -> &Vec<String> {
        &self.runs
    }

    fn transaction(&self) -> Vec<String> {
        Vec::new()
    }

    fn dispatch(&mut self, tr: Vec<String>) {
        self.runs.extend(tr);
    }

    fn update_plugins(&mut self, plugins: &[&'static str]) {
        println!("   plugins: {plugins:?}");
    }
}

struct Doc;

impl Extension<Buffer> for Doc {
    fn name(&self) -> &str {
        "doc"
    }

    fn priority(&self) -> Priority {
        Priority::HIGHEST
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Node
    }

    fn create_schema(&self) -> Option<SchemaFragment> {
        Some(SchemaFragment::node("doc", NodeSpec::new().content("block+")))
    }
}

struct Paragraph;

impl Extension<Buffer> for Paragraph {
    fn name(&self) -> &str {
        "paragraph"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Node
    }

    fn tags(&self) -> Vec<Tag> {
        vec![Tag::Block, Tag::LastNodeCompatible]
    }

    fn create_schema(&self) -> Option<SchemaFragment> {
        Some(SchemaFragment::node(
            "paragraph",
            NodeSpec::new().content("inline*").parse(ParseRule::tag("p")),
        ))
    }

    fn create_keymap(&self) -> Vec<KeyBinding<Buffer>> {
        vec![KeyBinding::<Buffer>::new("Enter", |props, _next| {
            props.tr.push("\n".to_string());
            true
        })]
    }
}

struct Text;

impl Extension<Buffer> for Text {
    fn name(&self) -> &str {
        "text"
    }

    fn priority(&self) -> Priority {
        Priority::LOW
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Node
    }

    fn create_schema(&self) -> Option<SchemaFragment> {
        Some(SchemaFragment::node("text", NodeSpec::new().group("inline")))
    }

    fn create_commands(&self) -> Vec<CommandSpec<Buffer>> {
        vec![CommandSpec::<Buffer>::new("insertText", |props, args| {
            let Some(text) = args.as_str() else {
                return false;
            };
            if props.dispatch {
                props.tr.push(text.to_string());
            }
            true
        })]
    }
}

struct Bold;

impl Extension<Buffer> for Bold {
    fn name(&self) -> &str {
        "bold"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Mark
    }

    fn tags(&self) -> Vec<Tag> {
        vec![Tag::FormattingMark]
    }

    fn create_schema(&self) -> Option<SchemaFragment> {
        Some(SchemaFragment::mark(
            "bold",
            MarkSpec::new().parse(ParseRule::tag("strong")),
        ))
    }

    fn create_commands(&self) -> Vec<CommandSpec<Buffer>> {
        vec![
            CommandSpec::<Buffer>::new("toggleBold", |props, _| {
                if props.dispatch {
                    props.tr.push("**".to_string());
                }
                true
            })
            .with_active(|runs: &Vec<String>, _| {
                runs.iter().filter(|r| r.as_str() == "**").count() % 2 == 1
            }),
        ]
    }

    fn create_keymap(&self) -> Vec<KeyBinding<Buffer>> {
        vec![KeyBinding::command("Mod-b", "toggleBold")]
    }

    fn create_plugins(&self) -> Vec<&'static str> {
        vec!["bold-input-rule"]
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quire_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    println!("=== Composition example ===\n");

    let core = Preset::new("core").with(Doc).with(Paragraph).with(Text);
    let mut settings = ManagerSettings::default().with_platform(Platform::Other);
    settings.shared_attributes.push(SharedAttribute::new(
        Identifiers::Tags(vec![Tag::Block]),
        "align",
        AttributeSpec::with_default("left"),
    ));
    let mut manager = Manager::create(ExtensionList::new().preset(core).with(Bold), settings)?;

    println!("1. Sorted extensions: {:?}", manager.extension_names());
    println!(
        "2. Schema:\n{}",
        serde_json::to_string_pretty(&**manager.schema())?
    );

    println!("3. Attaching the surface");
    manager.add_view(Buffer::default())?;

    println!("4. Commands");
    manager.run_command("insertText", &json!("Hello, "))?;
    manager
        .chain()
        .add("toggleBold", Value::Null)
        .add("insertText", json!("world"))
        .run()?;
    println!(
        "   bold active: {:?}",
        manager.command_active("toggleBold", &Value::Null)?
    );

    println!("5. Shortcuts");
    manager.run_shortcut("Ctrl-b")?;
    manager.run_shortcut("Enter")?;
    println!(
        "   bold active: {:?}",
        manager.command_active("toggleBold", &Value::Null)?
    );

    if let Some(surface) = manager.surface() {
        println!("6. Document: {:?}", surface.state());
    }
    println!("   version: {}", manager.version());

    manager.destroy()?;
    println!("7. Destroyed, phase {:?}", manager.phase());
    Ok(())
}
