//! Representación intermedia de una máquina de estados.
//!
//! Este es el grafo que produce [`crate::semantic`] a partir de un
//! diagrama fuente, con todos los nombres ya resueltos a su forma
//! completamente calificada. Los campos `id` permanecen vacíos hasta
//! que [`crate::alloc`] los asigna.

use indexmap::IndexMap;

pub use crate::lex::PSEUDO_STATE;

/// Separador entre segmentos de un nombre completamente calificado.
pub const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// Nombre local, único entre hermanos.
    pub name: String,
    pub full_name: String,

    /// Nombre completo del estado compuesto que lo contiene.
    pub parent: Option<String>,
    pub description: String,
    pub is_initial: bool,

    /// Nombres completos de los hijos, en orden de declaración.
    pub children: Vec<String>,

    /// Nombre local del hijo al que se entra por defecto.
    pub initial_substate: Option<String>,
    pub id: Option<i64>,
}

impl State {
    pub fn new(name: &str, parent: Option<&str>) -> Self {
        let full_name = match parent {
            Some(parent) => format!("{}{}{}", parent, SEPARATOR, name),
            None => name.to_owned(),
        };

        State {
            name: name.to_owned(),
            full_name,
            parent: parent.map(String::from),
            description: String::new(),
            is_initial: false,
            children: Vec::new(),
            initial_substate: None,
            id: None,
        }
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Nombre completo del origen, o [`PSEUDO_STATE`].
    pub source: String,
    pub target: String,
    pub event: String,
    pub comment: Option<String>,

    /// Identificador del evento, no de la transición.
    pub id: Option<i64>,
}

impl Transition {
    pub fn is_pseudo(&self) -> bool {
        self.source == PSEUDO_STATE
    }
}

/// Grafo completo de un diagrama fuente.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub title: Option<String>,
    pub states: IndexMap<String, State>,
    pub transitions: Vec<Transition>,
    pub events: IndexMap<String, Event>,

    /// Estado inicial de nivel superior (`[*] --> X` fuera de todo bloque).
    pub initial: Option<String>,
}

impl Machine {
    /// Transiciones salientes de un estado, en orden de declaración.
    pub fn transitions_from<'a>(&'a self, full_name: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions
            .iter()
            .filter(move |transition| !transition.is_pseudo() && transition.source == full_name)
    }

    /// Cadena de nombres locales desde la raíz hasta el estado dado.
    pub fn ancestry(&self, full_name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut next = self.states.get(full_name);

        while let Some(state) = next {
            chain.push(state.name.as_str());
            next = state.parent.as_deref().and_then(|parent| self.states.get(parent));
        }

        chain.reverse();
        chain
    }
}
