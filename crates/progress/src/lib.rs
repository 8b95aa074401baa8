// crates/progress/src/lib.rs
//! Progress presentation for tracked jobs.
//!
//! [`panel`] decides *what* to show for a job's state; [`terminal`] draws
//! it with `indicatif`.

pub mod panel;
pub mod terminal;

pub use panel::{render, PanelAction, PanelProps, PanelView, ProgressPanel};
pub use terminal::{TerminalBoard, TerminalPanel};
