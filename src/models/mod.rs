pub mod document;
pub mod knowledge;
pub mod master;

pub use document::*;
pub use knowledge::*;
pub use master::*;
