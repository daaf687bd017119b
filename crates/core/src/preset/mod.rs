//! Versioned, explicit preset documents.
//!
//! A preset describes a renderer as data: a tagged-union document with an
//! explicit version field, loaded from JSON and bound to callbacks through
//! an [`ActionRegistry`]. Unknown actions, unsupported versions, and
//! invalid times fail fast at load time with descriptive errors.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::render::{NullRenderer, Renderable};
use crate::timeline::{TimedCallback, TimelineBuilder, TimedProgram};
use crate::{Result, WaveSceneError};

/// The document version this crate reads and writes.
pub const PRESET_VERSION: u32 = 1;

/// Top-level preset document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetDoc {
    pub version: u32,
    pub renderer: RendererDoc,
}

/// Renderer description as a tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererDoc {
    /// Renders nothing.
    Null,
    /// A timed program built from the listed timeline entries.
    Timed { events: Vec<EventDoc> },
}

/// One timeline declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDoc {
    pub time: f64,
    pub kind: EventKindDoc,
    /// Name of a registered action supplying the callback.
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKindDoc {
    Scene,
    Event,
}

type ActionFactory = Box<dyn Fn() -> TimedCallback>;

/// Maps action names in preset documents to callback factories.
///
/// The host registers every action its presets may reference before
/// loading; binding a document against the registry is the only place
/// names are resolved, so typos surface as load errors instead of silent
/// no-ops at render time.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: impl Fn() -> TimedCallback + 'static) {
        self.actions.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    fn resolve(&self, name: &str) -> Result<TimedCallback> {
        self.actions
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| WaveSceneError::Preset(format!("unknown action `{name}`")))
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl PresetDoc {
    /// Parses a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serializes the document as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Binds the document to callbacks and produces the described
    /// renderer.
    pub fn into_renderer(self, registry: &ActionRegistry) -> Result<Box<dyn Renderable>> {
        if self.version != PRESET_VERSION {
            return Err(WaveSceneError::Preset(format!(
                "unsupported preset version {} (expected {PRESET_VERSION})",
                self.version
            )));
        }

        match self.renderer {
            RendererDoc::Null => Ok(Box::new(NullRenderer)),
            RendererDoc::Timed { events } => {
                let mut builder = TimelineBuilder::new();
                for event in &events {
                    let callback = registry.resolve(&event.action)?;
                    builder = match event.kind {
                        EventKindDoc::Scene => builder.scene(event.time, callback),
                        EventKindDoc::Event => builder.event(event.time, callback),
                    };
                }
                let timeline = builder.build()?;
                tracing::debug!(events = events.len(), "bound timed preset");
                Ok(Box::new(TimedProgram::new(timeline)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn registry_with(name: &str) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(name, || Box::new(|_| {}));
        registry
    }

    #[test]
    fn round_trips_through_json() {
        let doc = PresetDoc {
            version: PRESET_VERSION,
            renderer: RendererDoc::Timed {
                events: vec![EventDoc {
                    time: 1.5,
                    kind: EventKindDoc::Scene,
                    action: "pulse".to_string(),
                }],
            },
        };

        let text = doc.to_json().unwrap();
        let parsed = PresetDoc::from_json(&text).unwrap();

        match parsed.renderer {
            RendererDoc::Timed { events } => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].time, 1.5);
                assert_eq!(events[0].kind, EventKindDoc::Scene);
                assert_eq!(events[0].action, "pulse");
            }
            other => panic!("unexpected renderer: {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_versions() {
        let doc = PresetDoc {
            version: 99,
            renderer: RendererDoc::Null,
        };

        let err = doc.into_renderer(&ActionRegistry::new()).err().unwrap();
        assert!(format!("{err}").contains("version"));
    }

    #[test]
    fn rejects_unknown_actions() {
        let doc = PresetDoc {
            version: PRESET_VERSION,
            renderer: RendererDoc::Timed {
                events: vec![EventDoc {
                    time: 0.0,
                    kind: EventKindDoc::Event,
                    action: "missing".to_string(),
                }],
            },
        };

        let err = doc.into_renderer(&registry_with("pulse")).err().unwrap();
        assert!(format!("{err}").contains("missing"));
    }

    #[test]
    fn rejects_negative_event_times() {
        let doc = PresetDoc {
            version: PRESET_VERSION,
            renderer: RendererDoc::Timed {
                events: vec![EventDoc {
                    time: -2.0,
                    kind: EventKindDoc::Event,
                    action: "pulse".to_string(),
                }],
            },
        };

        let result = doc.into_renderer(&registry_with("pulse"));
        assert!(matches!(result, Err(WaveSceneError::Timeline(_))));
    }

    #[test]
    fn bound_actions_execute_when_the_program_runs() {
        use crate::render::Controller;

        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);

        let mut registry = ActionRegistry::new();
        registry.register("mark", move || {
            let seen = Rc::clone(&seen);
            Box::new(move |_| seen.set(true))
        });

        let doc = PresetDoc {
            version: PRESET_VERSION,
            renderer: RendererDoc::Timed {
                events: vec![EventDoc {
                    time: 0.0,
                    kind: EventKindDoc::Event,
                    action: "mark".to_string(),
                }],
            },
        };

        let mut renderer = doc.into_renderer(&registry).unwrap();
        let mut controller = Controller::offscreen(10, 10);
        renderer.render(&mut controller).unwrap();

        assert!(fired.get());
    }

    #[test]
    fn null_renderer_documents_bind_without_actions() {
        let doc = PresetDoc {
            version: PRESET_VERSION,
            renderer: RendererDoc::Null,
        };

        assert!(doc.into_renderer(&ActionRegistry::new()).is_ok());
    }
}
