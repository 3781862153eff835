// Data models for the MCP wire format and LevelPlay tool arguments

pub mod levelplay;
pub mod mcp;
