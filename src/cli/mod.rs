pub mod convert;
pub mod list;
pub mod selection;
pub mod setup;
pub mod ui;
