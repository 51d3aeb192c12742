//! Asignación de identificadores.
//!
//! Los identificadores numéricos de estados y eventos terminan
//! compilados en el firmware, por lo cual deben permanecer estables
//! entre compilaciones. Cada compilación parte del mapa producido por
//! la anterior y solo asigna identificadores nuevos a nombres que no
//! aparecen en él, en orden lexicográfico y a partir del siguiente
//! identificador libre. Ningún identificador se reutiliza.
//!
//! Los nombres que desaparecen del diagrama se retiran del mapa
//! emitido. Para que su identificador no sea entregado a otro nombre,
//! el mapa registra además una marca `[*]: N` con el siguiente
//! identificador libre.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    ir::Machine,
    parse::{Diagram, IdMapDiagram},
};

/// Clase de nombres de un mapa.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MapKind {
    States,
    Events,
}

impl MapKind {
    pub fn noun(self) -> &'static str {
        match self {
            MapKind::States => "state",
            MapKind::Events => "event",
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AllocError {
    #[error("No {} identifier is left after {last}", .kind.noun())]
    Exhausted { kind: MapKind, last: i64 },
}

impl AllocError {
    pub fn kind(&self) -> MapKind {
        match self {
            AllocError::Exhausted { kind, .. } => *kind,
        }
    }
}

/// Relación nombre → identificador de una sola clase de nombres.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    entries: IndexMap<String, i64>,
    watermark: Option<i64>,
}

impl IdMap {
    pub fn from_diagram(diagram: &IdMapDiagram) -> Self {
        let mut entries = IndexMap::new();
        for (name, id) in &diagram.entries {
            let (name, id) = (name.as_ref().to_string(), *id);
            if let Some(previous) = entries.insert(name.clone(), id) {
                warn!(%name, previous, id, "name repeated in identifier map, keeping the last id");
            }
        }

        IdMap {
            entries,
            watermark: diagram.watermark,
        }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries.get(name).copied()
    }

    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    /// Siguiente identificador libre.
    ///
    /// Es el máximo entre `max + 1` y la marca registrada, o cero
    /// para un mapa vacío. `None` si `max + 1` no es representable.
    pub fn next_id(&self) -> Option<i64> {
        let after_max = match self.entries.values().max() {
            Some(max) => Some(max.checked_add(1)?),
            None => None,
        };

        let next = match (after_max, self.watermark) {
            (Some(after_max), Some(watermark)) => after_max.max(watermark),
            (Some(next), None) | (None, Some(next)) => next,
            (None, None) => 0,
        };

        Some(next)
    }

    /// Entradas ordenadas por identificador y, en empate, por nombre.
    pub fn sorted(&self) -> Vec<(&str, i64)> {
        let mut sorted: Vec<_> = self
            .entries
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
            .collect();

        sorted.sort_by(|(a, a_id), (b, b_id)| a_id.cmp(b_id).then_with(|| a.cmp(b)));
        sorted
    }
}

/// Contadores de una clase de nombres tras una asignación.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub existing: usize,
    pub new: usize,
    pub retired: usize,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub states: Tally,
    pub events: Tally,
}

/// Resultado de asignar identificadores a una máquina.
#[derive(Debug)]
pub struct Allocation {
    /// Máquina con todos sus campos `id` asignados.
    pub machine: Machine,

    /// Mapas a emitir, solo con nombres vivos.
    pub states: IdMap,
    pub events: IdMap,
    pub stats: Stats,
}

/// Asignador de una única compilación.
///
/// Cada archivo construye su propia instancia a partir de sus propios
/// mapas previos, por lo que no existe estado compartido entre archivos.
#[derive(Debug, Default)]
pub struct Allocator {
    states: IdMap,
    events: IdMap,
}

impl Allocator {
    pub fn new(states: IdMap, events: IdMap) -> Self {
        Allocator { states, events }
    }

    /// Toma los mapas previos de un documento ya analizado.
    ///
    /// Si hay más de un mapa de la misma clase, el último prevalece.
    pub fn from_diagrams(diagrams: &[Diagram]) -> Self {
        let mut allocator = Allocator::default();
        let (mut seen_states, mut seen_events) = (0, 0);

        for diagram in diagrams {
            match diagram {
                Diagram::StateIdMap(map) => {
                    allocator.states = IdMap::from_diagram(map);
                    seen_states += 1;
                }

                Diagram::EventIdMap(map) => {
                    allocator.events = IdMap::from_diagram(map);
                    seen_events += 1;
                }

                _ => (),
            }
        }

        if seen_states > 1 || seen_events > 1 {
            warn!(
                state_maps = seen_states,
                event_maps = seen_events,
                "several identifier maps of the same kind, using the last one"
            );
        }

        allocator
    }

    pub fn allocate(self, mut machine: Machine) -> Result<Allocation, AllocError> {
        let (states, state_tally) = assign(MapKind::States, machine.states.keys(), &self.states)?;
        let (events, event_tally) = assign(MapKind::Events, machine.events.keys(), &self.events)?;

        for state in machine.states.values_mut() {
            state.id = states.get(&state.full_name);
        }

        for event in machine.events.values_mut() {
            event.id = events.get(&event.name);
        }

        for transition in &mut machine.transitions {
            transition.id = events.get(&transition.event);
        }

        let stats = Stats {
            states: state_tally,
            events: event_tally,
        };

        info!(
            states = stats.states.total,
            existing_states = stats.states.existing,
            new_states = stats.states.new,
            retired_states = stats.states.retired,
            events = stats.events.total,
            existing_events = stats.events.existing,
            new_events = stats.events.new,
            retired_events = stats.events.retired,
            "identifiers allocated"
        );

        Ok(Allocation {
            machine,
            states,
            events,
            stats,
        })
    }
}

fn assign<'a, I>(kind: MapKind, names: I, previous: &IdMap) -> Result<(IdMap, Tally), AllocError>
where
    I: Iterator<Item = &'a String>,
{
    let exhausted = |last| AllocError::Exhausted { kind, last };
    let kind_name = kind.noun();

    let mut names: Vec<&str> = names.map(String::as_str).collect();
    names.sort_unstable();

    let mut next = match previous.next_id() {
        Some(next) => next,
        None => return Err(exhausted(i64::MAX)),
    };
    let mut tally = Tally {
        total: names.len(),
        ..Default::default()
    };

    let mut entries = IndexMap::with_capacity(names.len());
    for name in names {
        let id = match previous.get(name) {
            Some(id) => {
                tally.existing += 1;
                id
            }

            None => {
                let id = next;
                next = next.checked_add(1).ok_or_else(|| exhausted(id))?;
                tally.new += 1;

                debug!(kind = kind_name, name, id, "assigned new identifier");
                id
            }
        };

        entries.insert(name.to_owned(), id);
    }

    tally.retired = previous
        .entries
        .keys()
        .filter(|name| !entries.contains_key(name.as_str()))
        .inspect(|name| debug!(kind = kind_name, name = name.as_str(), "retiring identifier"))
        .count();

    let map = IdMap {
        entries,
        watermark: Some(next),
    };

    Ok((map, tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Event, State};

    fn map(entries: &[(&str, i64)], watermark: Option<i64>) -> IdMap {
        IdMap {
            entries: entries.iter().map(|(name, id)| (name.to_string(), *id)).collect(),
            watermark,
        }
    }

    fn machine(states: &[&str], events: &[&str]) -> Machine {
        let mut machine = Machine::default();
        for name in states {
            machine.states.insert(name.to_string(), State::new(name, None));
        }

        for name in events {
            let event = Event {
                name: name.to_string(),
                id: None,
            };

            machine.events.insert(name.to_string(), event);
        }

        machine
    }

    fn state_ids(allocation: &Allocation) -> Vec<(&str, i64)> {
        allocation.states.sorted()
    }

    #[test]
    fn fresh_names_in_lexicographic_order() {
        let allocation = Allocator::default().allocate(machine(&["Idle", "Active_Running", "Active"], &["Start"])).unwrap();

        assert_eq!(
            state_ids(&allocation),
            vec![("Active", 0), ("Active_Running", 1), ("Idle", 2)]
        );

        assert_eq!(allocation.events.get("Start"), Some(0));
        assert_eq!(allocation.machine.states["Idle"].id, Some(2));
        assert_eq!(allocation.states.watermark(), Some(3));
    }

    #[test]
    fn append_only() {
        let previous = map(&[("A", 0), ("B", 1)], None);
        let allocation = Allocator::new(previous, IdMap::default()).allocate(machine(&["C", "B", "A"], &[])).unwrap();

        assert_eq!(state_ids(&allocation), vec![("A", 0), ("B", 1), ("C", 2)]);
        assert_eq!(allocation.stats.states, Tally { total: 3, existing: 2, new: 1, retired: 0 });
    }

    #[test]
    fn declaration_order_is_irrelevant() {
        let forward = Allocator::default().allocate(machine(&["X", "M", "B"], &["z", "a"])).unwrap();
        let backward = Allocator::default().allocate(machine(&["B", "M", "X"], &["a", "z"])).unwrap();

        assert_eq!(forward.states, backward.states);
        assert_eq!(forward.events, backward.events);
    }

    #[test]
    fn stable_across_runs() {
        let first = Allocator::default().allocate(machine(&["A", "B"], &["go"])).unwrap();
        let second = Allocator::new(first.states.clone(), first.events.clone()).allocate(machine(&["A", "B"], &["go"])).unwrap();

        assert_eq!(first.states, second.states);
        assert_eq!(first.events, second.events);
        assert_eq!(second.stats.states.new, 0);
    }

    #[test]
    fn retired_names_never_reuse_ids() {
        let first = Allocator::default().allocate(machine(&["A", "B", "C"], &[])).unwrap();

        let second = Allocator::new(first.states, IdMap::default()).allocate(machine(&["A", "B"], &[])).unwrap();
        assert_eq!(state_ids(&second), vec![("A", 0), ("B", 1)]);
        assert_eq!(second.states.watermark(), Some(3));
        assert_eq!(second.stats.states.retired, 1);

        let third = Allocator::new(second.states, IdMap::default()).allocate(machine(&["A", "B", "C", "D"], &[])).unwrap();
        assert_eq!(third.states.get("C"), Some(3));
        assert_eq!(third.states.get("D"), Some(4));
    }

    #[test]
    fn maps_without_watermark_continue_after_max() {
        let previous = map(&[("A", 4), ("B", 9)], None);
        assert_eq!(previous.next_id(), Some(10));

        let previous = map(&[("A", 4)], Some(2));
        assert_eq!(previous.next_id(), Some(5));

        assert_eq!(map(&[], Some(7)).next_id(), Some(7));
        assert_eq!(IdMap::default().next_id(), Some(0));
    }

    #[test]
    fn negative_ids_are_kept() {
        let previous = map(&[("A", -5)], None);
        let allocation = Allocator::new(previous, IdMap::default()).allocate(machine(&["A", "B"], &[])).unwrap();

        assert_eq!(state_ids(&allocation), vec![("A", -5), ("B", -4)]);
    }

    #[test]
    fn transitions_take_event_ids() {
        let mut machine = machine(&["A", "B"], &["go"]);
        machine.transitions.push(crate::ir::Transition {
            source: "A".into(),
            target: "B".into(),
            event: "go".into(),
            comment: None,
            id: None,
        });

        let previous = map(&[("go", 6)], None);
        let allocation = Allocator::new(IdMap::default(), previous).allocate(machine).unwrap();
        assert_eq!(allocation.machine.transitions[0].id, Some(6));
        assert_eq!(allocation.machine.events["go"].id, Some(6));
    }

    #[test]
    fn exhausted_identifier_space() {
        let previous = map(&[("A", i64::MAX)], None);
        assert_eq!(previous.next_id(), None);

        let error = Allocator::new(previous, IdMap::default())
            .allocate(machine(&["A", "B"], &[]))
            .unwrap_err();

        assert!(matches!(error, AllocError::Exhausted { kind: MapKind::States, last } if last == i64::MAX));

        // El último identificador representable se entrega, pero no deja marca
        let previous = map(&[("go", i64::MAX - 1)], None);
        let error = Allocator::new(IdMap::default(), previous)
            .allocate(machine(&[], &["go", "stop"]))
            .unwrap_err();

        assert_eq!(error.kind(), MapKind::Events);
        assert_eq!(error.to_string(), format!("No event identifier is left after {}", i64::MAX));
    }

    #[test]
    fn sorted_breaks_ties_by_name() {
        let entries = map(&[("b", 1), ("a", 1), ("c", 0)], None);
        assert_eq!(entries.sorted(), vec![("c", 0), ("a", 1), ("b", 1)]);
    }
}
