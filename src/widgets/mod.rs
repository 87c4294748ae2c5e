pub mod controls;
pub mod grid;
pub mod picker;
pub mod summary;
pub mod text_input;
