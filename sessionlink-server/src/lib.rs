pub mod http;
pub mod run;
pub mod runner;
