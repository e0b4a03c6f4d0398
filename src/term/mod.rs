//! Screen model and VT parser.

pub mod parser;
pub mod screen;

pub use parser::VtParser;
pub use screen::{AttrFlags, Cell, Color, Pen, Row, ScreenBuffer, DEFAULT_SCROLLBACK};

#[cfg(test)]
#[path = "../tests/screen_tests.rs"]
mod screen_tests;
