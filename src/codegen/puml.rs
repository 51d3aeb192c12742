//! Regeneración del documento de diagramas.
//!
//! El documento actualizado conserva textualmente todos los bloques
//! escritos por el usuario y reemplaza los mapas de identificadores
//! por los recién asignados. El diagrama compilado va primero, seguido
//! de los demás bloques en el orden del documento.

use std::fmt::{self, Display};

use crate::{
    alloc::{IdMap, MapKind},
    ir::PSEUDO_STATE,
    parse::{Diagram, EVENT_ID_PREFIX, STATE_ID_PREFIX},
};

impl MapKind {
    fn prefix(self) -> &'static str {
        match self {
            MapKind::States => STATE_ID_PREFIX,
            MapKind::Events => EVENT_ID_PREFIX,
        }
    }

    fn caption(self) -> &'static str {
        match self {
            MapKind::States => "State ID map",
            MapKind::Events => "Event ID map",
        }
    }
}

/// Un bloque `@startuml` con un mapa de identificadores.
pub struct IdMapBlock<'a> {
    pub kind: MapKind,
    pub title: &'a str,
    pub map: &'a IdMap,
}

impl Display for IdMapBlock<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "@startuml {}{}", self.kind.prefix(), self.title)?;
        writeln!(fmt, "title {}", self.kind.caption())?;

        for (name, id) in self.map.sorted() {
            emit!(fmt, "{}: {}", name, id)?;
        }

        if let Some(watermark) = self.map.watermark() {
            emit!(fmt, "{}: {}", PSEUDO_STATE, watermark)?;
        }

        write!(fmt, "@enduml")
    }
}

/// Documento completo: diagrama compilado, resto de bloques originales
/// y ambos mapas.
pub struct Document<'a> {
    pub diagrams: &'a [Diagram],
    pub title: &'a str,
    pub states: &'a IdMap,
    pub events: &'a IdMap,
}

impl Display for Document<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compiled = self
            .diagrams
            .iter()
            .position(|diagram| matches!(diagram, Diagram::Source(_)));

        let rest = self.diagrams.iter().enumerate().filter(|(index, diagram)| {
            Some(*index) != compiled && !matches!(diagram, Diagram::StateIdMap(_) | Diagram::EventIdMap(_))
        });

        let kept = compiled
            .and_then(|index| self.diagrams.get(index))
            .into_iter()
            .chain(rest.map(|(_, diagram)| diagram));

        for diagram in kept {
            writeln!(fmt, "{}", diagram.block().text())?;
            writeln!(fmt)?;
        }

        let states = IdMapBlock {
            kind: MapKind::States,
            title: self.title,
            map: self.states,
        };

        let events = IdMapBlock {
            kind: MapKind::Events,
            title: self.title,
            map: self.events,
        };

        writeln!(fmt, "{}", states)?;
        writeln!(fmt)?;
        writeln!(fmt, "{}", events)
    }
}
