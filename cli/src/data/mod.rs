pub mod backend;
pub mod history;

pub use backend::Backend;
pub use history::History;
