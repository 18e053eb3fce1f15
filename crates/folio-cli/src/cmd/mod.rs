pub mod gen;
pub mod run;
pub mod validate;
