//! Generación de tablas.
//!
//! Esta fase no produce texto directamente. Primero deriva, a partir
//! de la máquina ya numerada, un conjunto de registros por estado y por
//! evento ([`Tables`]) con todos los nombres de símbolos C resueltos.
//! Los renderizadores de [`c`] y [`puml`] solo recorren esos registros.

use thiserror::Error;
use tracing::{debug, warn};

use crate::{alloc::Allocation, ir::Machine};

pub mod c;
pub mod puml;

/// Valor del campo padre de un estado de nivel superior.
pub const FATHER_NONE: &str = "BFX_STATUS_FATHER_NONE";

/// Nombre de proyecto cuando no hay uno explícito ni título.
pub const DEFAULT_PROJECT: &str = "fsm";

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("State diagram defines no states")]
    NoStates,

    #[error("Project name `{0}` is not a valid C identifier")]
    BadProject(String),

    #[error("No identifier was allocated for `{0}`")]
    Unallocated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub full_name: String,
    pub id: i64,
    pub macro_name: String,
    pub description: String,

    /// Macro del subestado por defecto, o el propio.
    pub default_id: String,

    /// Macro del padre, o [`FATHER_NONE`].
    pub parent_id: String,

    /// Tabla de transiciones, si el estado tiene al menos una.
    pub table: Option<String>,
    pub callback: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub macro_name: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub event: String,
    pub target: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    pub name: String,
    pub state: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    pub macro_name: String,
    pub id: i64,
}

/// Registros completos para emitir un proyecto.
#[derive(Debug, Clone)]
pub struct Tables {
    pub project: String,
    pub states: Vec<StateRecord>,
    pub events: Vec<EventRecord>,

    /// Solo tablas no vacías, en el orden de los estados.
    pub transitions: Vec<TransitionTable>,
    pub initial: InitialState,
}

impl Tables {
    pub fn derive(allocation: &Allocation, project: &str) -> Result<Self, CodegenError> {
        if !is_c_identifier(project) {
            return Err(CodegenError::BadProject(project.to_owned()));
        }

        let machine = &allocation.machine;
        let names = Names { project };

        let mut states = Vec::with_capacity(machine.states.len());
        let mut transitions = Vec::new();

        for state in machine.states.values() {
            let id = state
                .id
                .ok_or_else(|| CodegenError::Unallocated(state.full_name.clone()))?;

            let macro_name = names.state(&state.full_name);

            let default_id = state
                .initial_substate
                .as_ref()
                .map(|child| format!("{}_{}", state.full_name, child))
                .filter(|child| machine.states.contains_key(child))
                .map(|child| names.state(&child))
                .unwrap_or_else(|| macro_name.clone());

            let parent_id = match &state.parent {
                Some(parent) => names.state(parent),
                None => FATHER_NONE.to_owned(),
            };

            let rows: Vec<_> = machine
                .transitions_from(&state.full_name)
                .map(|transition| Row {
                    event: names.event(&transition.event),
                    target: names.state(&transition.target),
                    comment: transition.comment.clone(),
                })
                .collect();

            let table = if rows.is_empty() {
                None
            } else {
                let name = names.table(&state.full_name);
                transitions.push(TransitionTable {
                    name: name.clone(),
                    state: state.full_name.clone(),
                    rows,
                });

                Some(name)
            };

            states.push(StateRecord {
                full_name: state.full_name.clone(),
                id,
                macro_name,
                description: state.description.clone(),
                default_id,
                parent_id,
                table,
                callback: names.callback(&machine.ancestry(&state.full_name)),
            });
        }

        let events = machine
            .events
            .values()
            .map(|event| {
                let id = event
                    .id
                    .ok_or_else(|| CodegenError::Unallocated(event.name.clone()))?;

                Ok(EventRecord {
                    macro_name: names.event(&event.name),
                    id,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let initial = initial_state(machine)
            .and_then(|name| states.iter().find(|state| state.full_name == name))
            .map(|state| InitialState {
                macro_name: names.initial(),
                id: state.id,
            })
            .ok_or(CodegenError::NoStates)?;

        debug!(
            project,
            states = states.len(),
            tables = transitions.len(),
            initial = initial.id,
            "derived state tables"
        );

        Ok(Tables {
            project: project.to_owned(),
            states,
            events,
            transitions,
            initial,
        })
    }
}

/// Elige el nombre de proyecto.
///
/// Un nombre explícito debe ser un identificador C válido. En su
/// ausencia se toma la primera palabra del título del diagrama, y si
/// esta no sirve como identificador se recurre a [`DEFAULT_PROJECT`].
pub fn project_name(explicit: Option<&str>, machine: &Machine) -> Result<String, CodegenError> {
    if let Some(explicit) = explicit {
        if !is_c_identifier(explicit) {
            return Err(CodegenError::BadProject(explicit.to_owned()));
        }

        return Ok(explicit.to_owned());
    }

    let word = machine
        .title
        .as_deref()
        .and_then(|title| title.split_whitespace().next());

    match word {
        Some(word) if is_c_identifier(word) => Ok(word.to_owned()),
        Some(word) => {
            warn!(title = word, fallback = DEFAULT_PROJECT, "diagram title is not a C identifier");
            Ok(DEFAULT_PROJECT.to_owned())
        }

        None => Ok(DEFAULT_PROJECT.to_owned()),
    }
}

/// Estado en el que arranca el handle.
fn initial_state(machine: &Machine) -> Option<&str> {
    if let Some(initial) = &machine.initial {
        return Some(initial);
    }

    if let Some(state) = machine.states.values().find(|state| state.is_initial) {
        return Some(&state.full_name);
    }

    let first = machine.states.keys().next()?;
    warn!(state = %first, "no initial state marked, starting from the first state");

    Some(first)
}

/// Convenciones de nombres de símbolos generados.
struct Names<'a> {
    project: &'a str,
}

impl Names<'_> {
    fn state(&self, full_name: &str) -> String {
        format!("{}_{}", self.project.to_uppercase(), full_name.to_uppercase())
    }

    fn event(&self, event: &str) -> String {
        format!("{}_{}", self.project.to_uppercase(), event.to_uppercase())
    }

    fn initial(&self) -> String {
        format!("{}_INITIAL_STATE", self.project.to_uppercase())
    }

    fn table(&self, full_name: &str) -> String {
        format!("g_{}_{}_TransTbl", self.project, full_name.to_lowercase())
    }

    fn callback(&self, ancestry: &[&str]) -> String {
        let segments: Vec<_> = ancestry.iter().map(|segment| capitalize(segment)).collect();
        format!("BFX_{}_{}_ActionCb", self.project, segments.join("_"))
    }
}

/// `wait_ACK` → `WaitAck`
fn capitalize(segment: &str) -> String {
    segment
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alloc::Allocator, lex::Lexer, parse, semantic, source::Source};

    fn tables(body: &str, project: &str) -> Result<Tables, CodegenError> {
        let source = Source::new("test.puml", &format!("@startuml door\n{}\n@enduml", body));
        let tokens = Lexer::new(source.lines()).try_exhaustive().unwrap();
        let diagrams = parse::parse(tokens).unwrap();
        let machine = semantic::resolve(&diagrams, &source, &["initial state".to_owned()]).unwrap();

        Tables::derive(&Allocator::default().allocate(machine).unwrap(), project)
    }

    const SCENARIO: &str = "Idle: initial state\n\
                            state Active {\n  Running: r\n  [*] --> Running\n}\n\
                            Idle --> Active : Start";

    #[test]
    fn scenario_records() {
        let tables = tables(SCENARIO, "door").unwrap();
        let ids: Vec<_> = tables.states.iter().map(|s| (s.full_name.as_str(), s.id)).collect();
        assert_eq!(ids, vec![("Idle", 2), ("Active", 0), ("Active_Running", 1)]);

        let active = &tables.states[1];
        assert_eq!(active.default_id, "DOOR_ACTIVE_RUNNING");
        assert_eq!(active.parent_id, FATHER_NONE);
        assert_eq!(active.callback, "BFX_door_Active_ActionCb");

        let running = &tables.states[2];
        assert_eq!(running.default_id, "DOOR_ACTIVE_RUNNING");
        assert_eq!(running.parent_id, "DOOR_ACTIVE");
        assert_eq!(running.callback, "BFX_door_Active_Running_ActionCb");

        assert_eq!(tables.events, vec![EventRecord { macro_name: "DOOR_START".into(), id: 0 }]);
        assert_eq!(tables.initial, InitialState { macro_name: "DOOR_INITIAL_STATE".into(), id: 2 });
    }

    #[test]
    fn empty_tables_have_no_name() {
        let tables = tables(SCENARIO, "door").unwrap();

        assert_eq!(tables.states[0].table.as_deref(), Some("g_door_idle_TransTbl"));
        assert_eq!(tables.states[1].table, None);
        assert_eq!(tables.states[2].table, None);

        assert_eq!(tables.transitions.len(), 1);
        assert_eq!(
            tables.transitions[0].rows,
            vec![Row {
                event: "DOOR_START".into(),
                target: "DOOR_ACTIVE".into(),
                comment: None,
            }]
        );
    }

    #[test]
    fn callback_segments_are_capitalized() {
        assert_eq!(capitalize("wait_ACK"), "WaitAck");
        assert_eq!(capitalize("idle"), "Idle");
        assert_eq!(capitalize("a__b"), "AB");

        let names = Names { project: "io" };
        assert_eq!(names.callback(&["top", "mid_level", "leaf"]), "BFX_io_Top_MidLevel_Leaf_ActionCb");
    }

    #[test]
    fn initial_state_fallbacks() {
        let explicit = tables("A: initial state\nB: b\n[*] --> B", "x").unwrap();
        assert_eq!(explicit.initial.id, 1);

        let marked = tables("A: a\nB: initial state", "x").unwrap();
        assert_eq!(marked.initial.id, 1);

        let first = tables("B: b\nA: a", "x").unwrap();
        assert_eq!(first.initial.id, 1);
    }

    #[test]
    fn rejects_bad_projects_and_empty_machines() {
        assert!(matches!(tables(SCENARIO, "my door"), Err(CodegenError::BadProject(_))));
        assert!(matches!(tables(SCENARIO, "9lives"), Err(CodegenError::BadProject(_))));
        assert!(matches!(tables("}", "x"), Err(CodegenError::NoStates)));
    }

    #[test]
    fn project_name_precedence() {
        let mut machine = Machine::default();
        assert_eq!(project_name(None, &machine).unwrap(), DEFAULT_PROJECT);

        machine.title = Some("door".into());
        assert_eq!(project_name(None, &machine).unwrap(), "door");
        assert_eq!(project_name(Some("lift"), &machine).unwrap(), "lift");
    }

    #[test]
    fn project_name_from_title_words() {
        let mut machine = Machine::default();

        machine.title = Some("Door Controller".into());
        assert_eq!(project_name(None, &machine).unwrap(), "Door");

        machine.title = Some("door-ctl v2".into());
        assert_eq!(project_name(None, &machine).unwrap(), DEFAULT_PROJECT);

        let error = project_name(Some("my door"), &machine).unwrap_err();
        assert!(matches!(error, CodegenError::BadProject(name) if name == "my door"));
    }
}
