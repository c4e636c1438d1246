pub mod plugins;
pub mod simulate;
pub mod validate;
