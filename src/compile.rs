//! Compilación completa de un documento.
//!
//! Ejecuta todas las fases sobre un único texto de entrada y devuelve
//! los artefactos ya renderizados en memoria. Nada se escribe a disco
//! aquí; de eso se encarga [`crate::output`].

use std::rc::Rc;

use tracing::info;

use crate::{
    alloc::{Allocator, MapKind, Stats},
    codegen::{
        self,
        c::{self, Header, Implementation},
        puml::Document,
        Tables,
    },
    error::Diagnostics,
    lex::Lexer,
    parse::{self, Diagram},
    semantic,
    source::{Located, Location, Source},
};

/// Marcadores que identifican al estado inicial en su descripción.
pub const DEFAULT_INITIAL_MARKERS: &[&str] = &["初始状态", "initial state"];

#[derive(Debug, Clone)]
pub struct Options {
    /// Reemplaza al título del diagrama como nombre de proyecto.
    pub project: Option<String>,
    pub initial_markers: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            project: None,
            initial_markers: DEFAULT_INITIAL_MARKERS.iter().map(|marker| marker.to_string()).collect(),
        }
    }
}

/// Artefactos de una compilación exitosa.
#[derive(Debug)]
pub struct Compilation {
    pub project: String,

    /// Documento de diagramas con los mapas actualizados.
    pub diagram: String,
    pub header: String,
    pub source: String,
    pub stats: Stats,
}

impl Compilation {
    pub fn header_name(&self) -> String {
        c::header_name(&self.project)
    }

    pub fn source_name(&self) -> String {
        c::source_name(&self.project)
    }
}

/// Compila el texto de un documento.
pub fn compile(text: &str, name: &str, options: &Options) -> Result<Compilation, Diagnostics> {
    let source = Source::new(name, text);

    let tokens = Lexer::new(source.lines())
        .try_exhaustive()
        .map_err(|errors| Diagnostics::from(errors).kind("Lexical error"))?;

    let diagrams = parse::parse(tokens).map_err(|error| Diagnostics::from(error).kind("Syntax error"))?;

    let machine = semantic::resolve(&diagrams, &source, &options.initial_markers)
        .map_err(|error| Diagnostics::from(error).kind("Semantic error"))?;

    // Los errores de generación se refieren al diagrama compilado completo
    let compiled = block_location(&diagrams, &source, |diagram| matches!(diagram, Diagram::Source(_)));
    let codegen_error = |error: codegen::CodegenError| {
        Diagnostics::from(Located::at(error, compiled.clone())).kind("Codegen error")
    };

    let title = machine.title.clone().unwrap_or_default();
    let project = codegen::project_name(options.project.as_deref(), &machine).map_err(codegen_error)?;

    let allocation = Allocator::from_diagrams(&diagrams).allocate(machine).map_err(|error| {
        // Se señala el mapa del cual proviene el identificador agotado
        let kind = error.kind();
        let location = block_location(diagrams.iter().rev(), &source, |diagram| match diagram {
            Diagram::StateIdMap(_) => kind == MapKind::States,
            Diagram::EventIdMap(_) => kind == MapKind::Events,
            _ => false,
        });

        Diagnostics::from(Located::at(error, location)).kind("Allocation error")
    })?;

    let tables = Tables::derive(&allocation, &project).map_err(codegen_error)?;

    let diagram = Document {
        diagrams: &diagrams,
        title: &title,
        states: &allocation.states,
        events: &allocation.events,
    }
    .to_string();

    info!(%project, file = name, "compiled state machine");

    Ok(Compilation {
        project,
        diagram,
        header: Header(&tables).to_string(),
        source: Implementation(&tables).to_string(),
        stats: allocation.stats,
    })
}

/// Ubicación del primer bloque que cumple `filter`, o el final del archivo.
fn block_location<'a, I, F>(diagrams: I, source: &Rc<Source>, filter: F) -> Location
where
    I: IntoIterator<Item = &'a Diagram>,
    F: Fn(&Diagram) -> bool,
{
    diagrams
        .into_iter()
        .find(|diagram| filter(diagram))
        .map(|diagram| diagram.block().location().clone())
        .unwrap_or_else(|| Location::eof(source))
}
