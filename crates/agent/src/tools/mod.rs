//! Built-in tools.
//!
//! | Tool | Prefix | Terminal |
//! |------|--------|----------|
//! | [`EditTool`] | `1. I'll only edit` | no |
//! | [`ConfirmTool`] | `1. I want to confirm` | yes |

pub mod confirm;
pub mod edit;

pub use confirm::ConfirmTool;
pub use edit::{EditParams, EditTool, PreviewFn};
