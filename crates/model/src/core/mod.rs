pub mod identifiers;
pub mod table;
