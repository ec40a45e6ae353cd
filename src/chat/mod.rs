//! Generative-UI chat: the tool catalog and the tool-augmented
//! completion loop.

pub mod tools;
pub mod turn;

pub use tools::{
    DestinationInfoTool, SavePreferencesTool, SearchArticlesTool, Tool, ToolCatalog, ToolContext,
};
pub use turn::{ChatEngine, GenUiEvent, TurnRequest};
