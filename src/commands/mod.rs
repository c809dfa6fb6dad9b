pub mod backup;
pub mod compile;
pub mod run;
pub mod status;
pub mod template;
pub mod validate;
