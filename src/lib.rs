//! Compilador de máquinas de estados jerárquicas.
//!
//! Traduce diagramas de estados en PlantUML a tablas en C para el
//! runtime `bfx_fsm`, manteniendo estables los identificadores
//! numéricos de estados y eventos entre compilaciones.
//!
//! # Front end
//! Cada documento deriva de un único archivo `*_build.puml`, del cual
//! ya se removieron los comentarios. Este archivo se somete primero a
//! análisis léxico en [`lex`], de lo cual se obtiene un flujo de
//! tokens, uno por línea. El flujo de tokens se agrupa en bloques y
//! cada bloque se clasifica como [`parse::Diagram`] por medio de
//! análisis sintáctico en [`parse`]. El diagrama fuente es procesado
//! por análisis semántico en [`semantic`], de lo cual se obtiene el
//! grafo de estados descrito en [`ir`].
//!
//! # Back end
//! El grafo se numera en [`alloc`] a partir de los mapas de
//! identificadores de la compilación anterior. Luego [`codegen`]
//! deriva los registros por estado y los renderiza como encabezado C,
//! implementación C y documento de diagramas actualizado. La
//! orquestación de todas las fases vive en [`compile`] y la escritura
//! atómica a disco en [`output`].

#[macro_use]
mod macros;

pub mod alloc;
pub mod codegen;
pub mod compile;
pub mod error;
pub mod ir;
pub mod lex;
pub mod output;
pub mod parse;
pub mod semantic;
pub mod source;
