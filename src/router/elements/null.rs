use crate::router::element::Element;

/// Passes packets through unchanged, in either mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Null;

impl Element for Null {
    fn class_name(&self) -> &'static str {
        "Null"
    }
}
