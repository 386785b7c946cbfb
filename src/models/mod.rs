pub mod plan;
pub mod run;
pub mod update;

pub use plan::*;
pub use run::*;
pub use update::*;
