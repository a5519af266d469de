pub mod add;
pub mod list;
pub mod posts;
pub mod refresh;
pub mod run;
