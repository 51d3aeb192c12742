//! Análisis semántico.
//!
//! Resuelve los nombres de un diagrama fuente a su forma completamente
//! calificada y construye el grafo de [`crate::ir::Machine`]. Esta fase
//! mantiene una pila de estados compuestos abiertos, la cual determina
//! el ámbito en el que se declaran y buscan los nombres.
//!
//! # Resolución de nombres
//! Para una referencia (extremo de transición o marcador inicial):
//! 1. Si la referencia incluye `.`, se toma tal cual con `.` → `_`.
//!    Los segmentos que aún no existen se crean como provisionales,
//!    cada uno hijo del anterior.
//! 2. Dentro de un ámbito, se buscan primero los hijos de ese ámbito.
//! 3. Luego se busca en todo el grafo, en orden de inserción, un estado
//!    con ese nombre local. Gana la primera coincidencia.
//! 4. De lo contrario el nombre es de nivel superior y, si no existe,
//!    se crea como estado provisional.
//!
//! Las declaraciones nunca pasan por esta búsqueda: siempre ligan el
//! nombre en el ámbito actual.

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    ir::{Event, Machine, State, Transition, PSEUDO_STATE},
    lex::{Identifier, Name, Statement},
    parse::{Diagram, SourceDiagram},
    source::{Located, Location, Source},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("No state diagram found, only identifier maps or empty blocks")]
    NoSourceDiagram,

    #[error("Transitions cannot target the initial pseudo state")]
    PseudoTarget,

    #[error("The initial pseudo state cannot be declared outside of an identifier map")]
    PseudoDeclaration,

    #[error("Declarations bind in the current scope and cannot be qualified: `{0}`")]
    QualifiedDeclaration(Identifier),

    #[error("Path `{0}` names a state that already exists outside of that path")]
    PathConflict(Identifier),
}

/// Construye la máquina de estados del primer diagrama fuente.
///
/// Diagramas fuente adicionales no se compilan.
pub fn resolve(diagrams: &[Diagram], source: &Rc<Source>, markers: &[String]) -> Semantic<Machine> {
    let mut sources = diagrams.iter().filter_map(|diagram| match diagram {
        Diagram::Source(source) => Some(source),
        _ => None,
    });

    let first = sources
        .next()
        .ok_or_else(|| Located::at(SemanticError::NoSourceDiagram, Location::eof(source)))?;

    for ignored in sources {
        warn!(
            title = ignored.block.title().unwrap_or(""),
            at = %ignored.block.location(),
            "only the first state diagram is compiled, ignoring this one"
        );
    }

    first.resolve(markers)
}

impl SourceDiagram {
    pub fn resolve(&self, markers: &[String]) -> Semantic<Machine> {
        let mut builder = Builder {
            machine: Machine {
                title: self.block.title().map(String::from),
                ..Default::default()
            },
            scopes: Vec::new(),
            markers: markers.iter().map(|marker| marker.to_lowercase()).collect(),
        };

        for statement in &self.body {
            builder.scan(statement)?;
        }

        if !builder.scopes.is_empty() {
            debug!(open = ?builder.scopes, "composite states left open at end of diagram");
        }

        let machine = builder.machine;
        debug!(
            states = machine.states.len(),
            events = machine.events.len(),
            transitions = machine.transitions.len(),
            "resolved state machine"
        );

        Ok(machine)
    }
}

struct Builder {
    machine: Machine,

    /// Nombres completos de los estados compuestos abiertos.
    scopes: Vec<String>,
    markers: Vec<String>,
}

impl Builder {
    fn scan(&mut self, statement: &Located<Statement>) -> Semantic<()> {
        let location = statement.location();

        match statement.as_ref() {
            Statement::Open(name) => {
                let full_name = self.bind(name, location)?;
                self.scopes.push(full_name);
            }

            Statement::Close => {
                if self.scopes.pop().is_none() {
                    debug!(at = %location, "ignoring `}}` without an open composite state");
                }
            }

            Statement::Declare { name, text } => {
                let name = match name {
                    Name::Id(name) => name,
                    Name::Pseudo => return Err(Located::at(SemanticError::PseudoDeclaration, location.clone())),
                };

                let full_name = self.bind(name, location)?;
                if let Some(text) = text {
                    self.describe(&full_name, text);
                }
            }

            Statement::Transition {
                source,
                target,
                event,
                comment,
            } => {
                let target = match target {
                    Name::Id(target) => target,
                    Name::Pseudo => return Err(Located::at(SemanticError::PseudoTarget, location.clone())),
                };

                let source = match source {
                    Name::Id(source) => self.lookup(source, location)?,
                    Name::Pseudo => PSEUDO_STATE.to_owned(),
                };

                let target = self.lookup(target, location)?;

                self.transition(source, target, event, comment.clone());
            }

            Statement::Initial(target) => self.initial(target, location)?,
        }

        Ok(())
    }

    /// Liga un nombre declarado en el ámbito actual, creándolo si hace falta.
    fn bind(&mut self, name: &Identifier, location: &Location) -> Semantic<String> {
        if name.is_qualified() {
            let error = SemanticError::QualifiedDeclaration(name.clone());
            return Err(Located::at(error, location.clone()));
        }

        let parent = self.scopes.last().cloned();
        Ok(self.ensure(name.as_ref(), parent.as_deref()))
    }

    fn ensure(&mut self, name: &str, parent: Option<&str>) -> String {
        let state = State::new(name, parent);
        let full_name = state.full_name.clone();

        if !self.machine.states.contains_key(&full_name) {
            if let Some(parent) = parent.and_then(|parent| self.machine.states.get_mut(parent)) {
                parent.children.push(full_name.clone());
            }

            self.machine.states.insert(full_name.clone(), state);
        }

        full_name
    }

    fn describe(&mut self, full_name: &str, text: &str) {
        let markers = &self.markers;
        if let Some(state) = self.machine.states.get_mut(full_name) {
            let lower = text.to_lowercase();

            state.description = text.to_owned();
            state.is_initial = markers.iter().any(|marker| lower.contains(marker.as_str()));
        }
    }

    /// Resuelve una referencia a un estado.
    fn lookup(&mut self, name: &Identifier, location: &Location) -> Semantic<String> {
        if name.is_qualified() {
            return self.path(name, location);
        }

        let states = &self.machine.states;

        let local = name.as_ref();
        let scoped = self
            .scopes
            .last()
            .and_then(|scope| states.get(scope))
            .and_then(|scope| {
                scope
                    .children
                    .iter()
                    .find(|child| states.get(*child).map_or(false, |child| child.name == local))
            });

        if let Some(full_name) = scoped {
            return Ok(full_name.clone());
        }

        let mut matches = states.values().filter(|state| state.name == local);
        if let Some(first) = matches.next() {
            let others: Vec<_> = matches.map(|state| state.full_name.as_str()).collect();
            if !others.is_empty() {
                debug!(
                    name = local,
                    chosen = %first.full_name,
                    ?others,
                    "ambiguous state reference, first match wins"
                );
            }

            return Ok(first.full_name.clone());
        }

        if states.contains_key(local) {
            return Ok(local.to_owned());
        }

        debug!(name = local, at = %location, "creating stub for undeclared state");
        Ok(self.ensure(local, None))
    }

    /// Resuelve una ruta explícita, creando los segmentos faltantes.
    fn path(&mut self, name: &Identifier, location: &Location) -> Semantic<String> {
        let mut parent: Option<String> = None;

        for segment in name.as_ref().split('.') {
            let expected = State::new(segment, parent.as_deref()).full_name;
            let existing = self.machine.states.get(&expected).map(|state| state.parent.clone());

            match existing {
                Some(actual) if actual != parent => {
                    let error = SemanticError::PathConflict(name.clone());
                    return Err(Located::at(error, location.clone()));
                }

                Some(_) => (),
                None => {
                    debug!(state = %expected, at = %location, "creating stub for undeclared path segment");
                    self.ensure(segment, parent.as_deref());
                }
            }

            parent = Some(expected);
        }

        // Los identificadores nunca tienen segmentos vacíos
        Ok(parent.unwrap_or_else(|| name.normalized()))
    }

    fn transition(&mut self, source: String, target: String, event: &Identifier, comment: Option<String>) {
        let event = event.as_ref();
        if !self.machine.events.contains_key(event) {
            let new = Event {
                name: event.to_owned(),
                id: None,
            };

            self.machine.events.insert(event.to_owned(), new);
        }

        let transitions = &mut self.machine.transitions;
        let previous = transitions
            .iter()
            .position(|transition| transition.source == source && transition.event == event);

        if let Some(index) = previous {
            let overridden = transitions.remove(index);
            warn!(
                source = %source,
                event,
                old = %overridden.target,
                new = %target,
                "transition declared twice for the same event, keeping the last one"
            );
        }

        debug!(%source, %target, event, "resolved transition");
        transitions.push(Transition {
            source,
            target,
            event: event.to_owned(),
            comment,
            id: None,
        });
    }

    fn initial(&mut self, target: &Identifier, location: &Location) -> Semantic<()> {
        let scope = match self.scopes.last().cloned() {
            Some(scope) => scope,
            None => {
                let target = self.lookup(target, location)?;
                if let Some(previous) = self.machine.initial.replace(target) {
                    debug!(%previous, "top-level initial state redefined");
                }

                return Ok(());
            }
        };

        let child = if target.is_qualified() {
            let full_name = self.lookup(target, location)?;
            match self.machine.states.get(&full_name) {
                Some(state) if state.parent.as_deref() == Some(scope.as_str()) => state.name.clone(),
                _ => {
                    debug!(%scope, target = %full_name, "initial marker does not target a child, ignoring");
                    return Ok(());
                }
            }
        } else {
            self.ensure(target.as_ref(), Some(scope.as_str()));
            target.to_string()
        };

        if let Some(state) = self.machine.states.get_mut(&scope) {
            state.initial_substate = Some(child);
        }

        Ok(())
    }
}
