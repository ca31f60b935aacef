//! Compilador para controladores lógicos programables (PLC).
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente, escrito ya
//! sea como ecuaciones booleanas o como un listado de mnemónicos (AWL).
//! El archivo se somete primero a análisis léxico en [`lex`], de lo cual
//! se obtiene un flujo de tokens. Las secciones de declaración son comunes
//! a ambos lenguajes; el cuerpo se dispone en un AST por medio de análisis
//! sintáctico en [`parse`] o en una lista plana en [`awl`]. El árbol
//! sintáctico puede además someterse a resolución de dependencias en
//! [`resolve`], la cual sustituye cada señal por la ecuación que la define.
//!
//! # Back end
//! Ambos front ends se reducen a la representación intermedia de [`ir`],
//! una secuencia postfija de operaciones para una máquina de pila de bits,
//! por medio de [`compile`]. La secuencia se ejecuta en el simulador de
//! [`sim`], el cual sirve también como referencia ejecutable, o se
//! codifica al formato binario del controlador en [`encode`].

pub mod ast;
pub mod awl;
pub mod compile;
pub mod encode;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod resolve;
pub mod sim;
pub mod source;
