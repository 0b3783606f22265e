pub mod backend;
pub mod chars;
pub mod cmap;
pub mod words;
