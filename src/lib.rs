//! Toolkit for launching external programs with controllable output capture
//! (pipes, a pseudo-terminal, or in-place process replacement) and for driving
//! an interactive raw-mode terminal session with its own command grammar.

pub mod command;
pub mod editor;
pub mod interp;
pub mod module;
pub mod terminal;
pub mod util;
