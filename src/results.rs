pub mod result_set;
pub mod row;

pub use result_set::{PagedResult, ResultSet};
pub use row::CustomDbRow;
