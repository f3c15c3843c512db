pub mod utils;
pub mod verdict;
