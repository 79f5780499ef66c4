pub mod check;
pub mod grade;
pub mod history;
pub mod languages;
pub mod merge;

pub use check::*;
pub use grade::*;
pub use history::*;
pub use languages::*;
pub use merge::*;
